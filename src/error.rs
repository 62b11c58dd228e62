// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

use crate::finality::FinalityError;
use thiserror::Error;

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    // Transient transport failure talking to an EVM provider
    #[error("provider error: {0}")]
    Provider(String),

    // Transient transport failure talking to the hub
    #[error("hub rpc error: {0}")]
    HubRpc(String),

    // A hub broadcast was rejected; the raw response message is preserved so
    // callers can classify it (sequence conflicts, decode mismatches)
    #[error("hub broadcast failed: {0}")]
    Broadcast(String),

    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    // The hub responded to a sign request with a failure in its raw log
    #[error("sign commands rejected by hub: {0}")]
    SignRejected(String),

    // A sign request produced no response at all (after retries)
    #[error("no response to sign commands request")]
    MissingSignResponse,

    #[error("sign response carried no batched commands id")]
    BatchIdMissing,

    #[error("unrecognized hub message status: {0}")]
    UnrecognizedMessageStatus(String),

    // The hub reports the message in a state the relayer must not retry
    #[error("message {id} is in status {status:?} and cannot be handled")]
    MessageUnrecoverable { id: String, status: String },

    #[error(transparent)]
    Finality(#[from] FinalityError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("status service error: {0}")]
    StatusApi(String),

    // Event or payload failed to parse; dropped at the point of detection
    #[error("parse error: {0}")]
    Parse(String),

    #[error("no client registered for chain {0}")]
    MissingClient(String),

    #[error("{0}")]
    Generic(String),
}

impl RelayError {
    /// Short stable string for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Provider(_) => "provider",
            RelayError::HubRpc(_) => "hub_rpc",
            RelayError::Broadcast(_) => "broadcast",
            RelayError::MaxRetriesExceeded { .. } => "max_retries",
            RelayError::SignRejected(_) => "sign_rejected",
            RelayError::MissingSignResponse => "missing_sign_response",
            RelayError::BatchIdMissing => "batch_id_missing",
            RelayError::UnrecognizedMessageStatus(_) => "unrecognized_message_status",
            RelayError::MessageUnrecoverable { .. } => "message_unrecoverable",
            RelayError::Finality(_) => "finality",
            RelayError::Storage(_) => "storage",
            RelayError::StatusApi(_) => "status_api",
            RelayError::Parse(_) => "parse",
            RelayError::MissingClient(_) => "missing_client",
            RelayError::Generic(_) => "generic",
        }
    }

    /// Errors that require a human to look at the transfer; surfaced through
    /// the operator notifier rather than retried.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            RelayError::MessageUnrecoverable { .. }
                | RelayError::UnrecognizedMessageStatus(_)
                | RelayError::SignRejected(_)
        )
    }
}
