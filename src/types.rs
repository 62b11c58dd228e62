// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Relay records and the typed slices of hub state the pipeline reads.

use crate::error::{RelayError, RelayResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Direction of a cross-chain transfer, as seen from the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// EVM source chain -> hub (and on to the Cosmos chain)
    Inbound,
    /// Hub / Cosmos chain -> EVM destination chain
    Outbound,
}

impl Direction {
    /// Mapping used by the external status service (`flow_type`).
    pub fn from_flow_type(flow_type: &str) -> RelayResult<Self> {
        match flow_type {
            "in" => Ok(Direction::Inbound),
            "out" => Ok(Direction::Outbound),
            other => Err(RelayError::Parse(format!("unknown flow_type: {}", other))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Lifecycle of one transfer. The derived ordering is load-bearing: relay
/// records may only move forward through these states, and `Failed` is a
/// terminal state reachable from anything that is not already `Completed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RelayStatus {
    Detected,
    Finalized,
    ConfirmedOnHub,
    Routed,
    PendingSign,
    Signed,
    Batched,
    Executed,
    Completed,
    Failed,
}

impl RelayStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayStatus::Completed | RelayStatus::Failed)
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayStatus::Detected => "detected",
            RelayStatus::Finalized => "finalized",
            RelayStatus::ConfirmedOnHub => "confirmed_on_hub",
            RelayStatus::Routed => "routed",
            RelayStatus::PendingSign => "pending_sign",
            RelayStatus::Signed => "signed",
            RelayStatus::Batched => "batched",
            RelayStatus::Executed => "executed",
            RelayStatus::Completed => "completed",
            RelayStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Persisted view of one transfer attempt. Owned exclusively by the pipeline
/// and the reconciliation engine; the external status service is only ever a
/// read-only mirror of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRecord {
    /// Derived from the originating event id (`{tx_hash}-{log_index}` for
    /// EVM-origin transfers, the hub message id for hub-origin transfers).
    pub id: String,
    pub direction: Direction,
    pub source_chain: String,
    pub destination_chain: String,
    /// Opaque call payload, when the originating event carried one.
    pub payload: Option<Vec<u8>>,
    pub payload_hash: Option<String>,
    pub status: RelayStatus,
    pub source_tx: Option<String>,
    pub hub_tx: Option<String>,
    pub destination_tx: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelayRecord {
    pub fn new(
        id: impl Into<String>,
        direction: Direction,
        source_chain: impl Into<String>,
        destination_chain: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            direction,
            source_chain: source_chain.into(),
            destination_chain: destination_chain.into(),
            payload: None,
            payload_hash: None,
            status: RelayStatus::Detected,
            source_tx: None,
            hub_tx: None,
            destination_tx: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>, payload_hash: impl Into<String>) -> Self {
        self.payload = Some(payload);
        self.payload_hash = Some(payload_hash.into());
        self
    }

    pub fn with_source_tx(mut self, tx: impl Into<String>) -> Self {
        self.source_tx = Some(tx.into());
        self
    }
}

/// Hub general-message status. Raw integers on the wire; anything we do not
/// recognize is a hard error, never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Unspecified,
    Approved,
    Processing,
    Executed,
    Failed,
}

impl MessageStatus {
    pub fn proto_name(&self) -> &'static str {
        match self {
            MessageStatus::Unspecified => "STATUS_UNSPECIFIED",
            MessageStatus::Approved => "STATUS_APPROVED",
            MessageStatus::Processing => "STATUS_PROCESSING",
            MessageStatus::Executed => "STATUS_EXECUTED",
            MessageStatus::Failed => "STATUS_FAILED",
        }
    }

    pub fn from_proto_name(name: &str) -> RelayResult<Self> {
        match name {
            "STATUS_UNSPECIFIED" => Ok(MessageStatus::Unspecified),
            "STATUS_APPROVED" => Ok(MessageStatus::Approved),
            "STATUS_PROCESSING" => Ok(MessageStatus::Processing),
            "STATUS_EXECUTED" => Ok(MessageStatus::Executed),
            "STATUS_FAILED" => Ok(MessageStatus::Failed),
            other => Err(RelayError::UnrecognizedMessageStatus(other.to_string())),
        }
    }
}

impl TryFrom<i32> for MessageStatus {
    type Error = RelayError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageStatus::Unspecified),
            1 => Ok(MessageStatus::Approved),
            2 => Ok(MessageStatus::Processing),
            3 => Ok(MessageStatus::Executed),
            4 => Ok(MessageStatus::Failed),
            other => Err(RelayError::UnrecognizedMessageStatus(other.to_string())),
        }
    }
}

/// A general message as reported by the hub's nexus module.
#[derive(Debug, Clone)]
pub struct HubMessage {
    pub id: String,
    pub status: MessageStatus,
}

/// Status of a signed command batch on the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Unspecified,
    Signing,
    Aborted,
    Signed,
}

impl BatchStatus {
    /// A batch is ready for execution once the validator set finished signing.
    pub fn is_ready(&self) -> bool {
        matches!(self, BatchStatus::Signed)
    }

    pub fn from_proto_name(name: &str) -> RelayResult<Self> {
        match name {
            "BATCHED_COMMANDS_STATUS_UNSPECIFIED" => Ok(BatchStatus::Unspecified),
            "BATCHED_COMMANDS_STATUS_SIGNING" => Ok(BatchStatus::Signing),
            "BATCHED_COMMANDS_STATUS_ABORTED" => Ok(BatchStatus::Aborted),
            "BATCHED_COMMANDS_STATUS_SIGNED" => Ok(BatchStatus::Signed),
            other => Err(RelayError::Parse(format!("unknown batch status: {}", other))),
        }
    }
}

/// One command awaiting signing for a destination chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl PendingCommand {
    pub fn source_tx_hash(&self) -> Option<&str> {
        self.params.get("sourceTxHash").map(|s| s.as_str())
    }

    pub fn source_event_index(&self) -> Option<&str> {
        self.params.get("sourceEventIndex").map(|s| s.as_str())
    }

    /// Whether this command was produced by the message with the given
    /// `{tx_hash}-{event_index}` id.
    pub fn matches_message_id(&self, message_id: &str) -> bool {
        let Some((hash, index)) = message_id.rsplit_once('-') else {
            return false;
        };
        self.source_tx_hash() == Some(hash) && self.source_event_index() == Some(index)
    }
}

/// Result of a hub transaction broadcast, reduced to the fields the pipeline
/// reads. The raw log is kept verbatim: "already executed" / "failed" markers
/// in it drive control flow.
#[derive(Debug, Clone, Default)]
pub struct HubTxResponse {
    pub tx_hash: String,
    pub raw_log: String,
    /// Set on sign-commands responses.
    pub batched_commands_id: Option<String>,
}

impl HubTxResponse {
    pub fn already_executed(&self) -> bool {
        self.raw_log.contains("already executed")
    }

    pub fn already_confirmed(&self) -> bool {
        self.raw_log.contains("already confirmed")
    }

    pub fn sign_failed(&self) -> bool {
        self.raw_log.contains("failed")
    }
}

/// Certain older chains were registered on the hub with a capitalized id
/// before the naming convention changed; connection ids still carry the
/// lowercase form.
pub fn normalize_legacy_chain_id(chain_id: &str) -> &str {
    match chain_id {
        "ethereum" => "Ethereum",
        "polygon" => "Polygon",
        "avalanche" => "Avalanche",
        "fantom" => "Fantom",
        "moonbeam" => "Moonbeam",
        other => other,
    }
}

/// Parsed `{bridge_id}/{chain_id}/{token}` connection identifier from the
/// status service, with the chain id normalized for hub queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionId {
    pub bridge_id: u64,
    pub chain_id: String,
}

impl ConnectionId {
    pub fn parse(connection_id: &str) -> RelayResult<Self> {
        let mut parts = connection_id.split('/');
        let bridge_id = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| {
                RelayError::Parse(format!("invalid connection id: {}", connection_id))
            })?;
        let chain_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| {
            RelayError::Parse(format!("connection id has no chain: {}", connection_id))
        })?;
        Ok(Self {
            bridge_id,
            chain_id: normalize_legacy_chain_id(chain_id).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_is_pipeline_order() {
        use RelayStatus::*;
        let order = [
            Detected,
            Finalized,
            ConfirmedOnHub,
            Routed,
            PendingSign,
            Signed,
            Batched,
            Executed,
            Completed,
            Failed,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should precede {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_message_status_decoding() {
        assert_eq!(MessageStatus::try_from(1).unwrap(), MessageStatus::Approved);
        assert_eq!(MessageStatus::try_from(3).unwrap(), MessageStatus::Executed);
        assert_eq!(MessageStatus::try_from(4).unwrap(), MessageStatus::Failed);

        // Unknown values are a hard error, not a default
        assert!(matches!(
            MessageStatus::try_from(7),
            Err(RelayError::UnrecognizedMessageStatus(_))
        ));
        assert!(matches!(
            MessageStatus::from_proto_name("STATUS_SHINY_NEW"),
            Err(RelayError::UnrecognizedMessageStatus(_))
        ));
    }

    #[test]
    fn test_connection_id_parsing() {
        let conn = ConnectionId::parse("3/avalanche/0xabc").unwrap();
        assert_eq!(conn.bridge_id, 3);
        assert_eq!(conn.chain_id, "Avalanche");

        // Chains minted after the convention change pass through untouched
        let conn = ConnectionId::parse("12/arbitrum/0xdef").unwrap();
        assert_eq!(conn.chain_id, "arbitrum");

        assert!(ConnectionId::parse("not-a-connection").is_err());
        assert!(ConnectionId::parse("5/").is_err());
    }

    #[test]
    fn test_pending_command_message_id_match() {
        let mut params = HashMap::new();
        params.insert("sourceTxHash".to_string(), "0xabc".to_string());
        params.insert("sourceEventIndex".to_string(), "7".to_string());
        let command = PendingCommand {
            id: "cmd1".to_string(),
            command_type: "approveContractCall".to_string(),
            params,
        };

        assert!(command.matches_message_id("0xabc-7"));
        assert!(!command.matches_message_id("0xabc-8"));
        assert!(!command.matches_message_id("0xdef-7"));
        assert!(!command.matches_message_id("garbage"));
    }

    #[test]
    fn test_raw_log_markers() {
        let resp = HubTxResponse {
            tx_hash: "ABC".to_string(),
            raw_log: "message already executed".to_string(),
            batched_commands_id: None,
        };
        assert!(resp.already_executed());
        assert!(!resp.sign_failed());

        let resp = HubTxResponse {
            raw_log: "command signing failed: threshold not met".to_string(),
            ..Default::default()
        };
        assert!(resp.sign_failed());
    }

    #[test]
    fn test_direction_from_flow_type() {
        assert_eq!(Direction::from_flow_type("in").unwrap(), Direction::Inbound);
        assert_eq!(Direction::from_flow_type("out").unwrap(), Direction::Outbound);
        assert!(Direction::from_flow_type("sideways").is_err());
    }
}
