// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Hub client: capability traits for signing/broadcasting and state queries,
//! plus the high-level operations the pipeline drives.
//!
//! Transaction signing is an external capability behind [`HubBroadcaster`];
//! this module only decides *what* to submit and how to interpret the
//! responses. Queries go through [`HubQuerier`], implemented here over the
//! hub's REST (LCD) endpoint.

use crate::clients::broadcast::BroadcastClient;
use crate::error::{RelayError, RelayResult};
use crate::types::{BatchStatus, HubMessage, HubTxResponse, MessageStatus, PendingCommand};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A typed request to the hub. Payloads are opaque bytes; only the fields
/// the hub needs to identify the action are modeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCommand {
    /// Ask the hub to confirm a gateway transaction observed on a source chain.
    ConfirmGatewayTx { chain: String, tx_hash: String },
    /// Ask the hub to route a confirmed message onward.
    /// `id` is `{tx_hash}-{log_index}` for EVM-origin messages and the hub
    /// message id for hub-origin ones.
    RouteMessage { id: String, payload: Vec<u8> },
    /// Ask the validator set to sign all pending commands for a chain.
    SignCommands { chain: String },
}

/// Sign-and-broadcast capability, provided by the embedder.
#[async_trait]
pub trait HubBroadcaster: Send + Sync {
    async fn sign_and_broadcast(&self, commands: Vec<HubCommand>) -> RelayResult<HubTxResponse>;
}

/// Status of an EVM-origin event as tracked by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEventStatus {
    Unspecified,
    Confirmed,
    Completed,
}

impl GatewayEventStatus {
    pub fn from_proto_name(name: &str) -> RelayResult<Self> {
        match name {
            "STATUS_UNSPECIFIED" => Ok(GatewayEventStatus::Unspecified),
            "STATUS_CONFIRMED" => Ok(GatewayEventStatus::Confirmed),
            "STATUS_COMPLETED" => Ok(GatewayEventStatus::Completed),
            other => Err(RelayError::Parse(format!(
                "unknown gateway event status: {}",
                other
            ))),
        }
    }
}

/// A command batch as reported by the hub.
#[derive(Debug, Clone)]
pub struct BatchedCommands {
    pub status: BatchStatus,
    pub execute_data: Option<Vec<u8>>,
}

/// Read-only hub state queries.
#[async_trait]
pub trait HubQuerier: Send + Sync {
    /// General message by id; `None` when the hub does not know the message.
    async fn message(&self, id: &str) -> RelayResult<Option<HubMessage>>;

    /// Commands awaiting signing for a destination chain.
    async fn pending_commands(&self, chain: &str) -> RelayResult<Vec<PendingCommand>>;

    async fn batched_commands(&self, chain: &str, id: &str) -> RelayResult<BatchedCommands>;

    /// Hub's view of an EVM-origin event; `None` when the hub has never seen
    /// it ("no event with ID" is not an error).
    async fn gateway_event(
        &self,
        chain: &str,
        event_id: &str,
    ) -> RelayResult<Option<GatewayEventStatus>>;
}

/// High-level hub operations shared by the live pipeline and the
/// reconciliation engine. Every operation is idempotent from the hub's point
/// of view: "already confirmed" / "already executed" responses are success.
pub struct HubClient {
    chain_id: String,
    broadcast: BroadcastClient,
    querier: Arc<dyn HubQuerier>,
    batch_poll_interval: Duration,
}

impl HubClient {
    pub fn new(
        chain_id: impl Into<String>,
        broadcast: BroadcastClient,
        querier: Arc<dyn HubQuerier>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            broadcast,
            querier,
            batch_poll_interval: Duration::from_secs(3),
        }
    }

    pub fn with_batch_poll_interval(mut self, interval: Duration) -> Self {
        self.batch_poll_interval = interval;
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn querier(&self) -> &Arc<dyn HubQuerier> {
        &self.querier
    }

    /// Submit a confirm request for a source-chain gateway transaction.
    /// Returns `None` when the broadcast went out but could not be decoded
    /// (fire-and-forget).
    pub async fn confirm_gateway_tx(
        &self,
        chain: &str,
        tx_hash: &str,
    ) -> RelayResult<Option<HubTxResponse>> {
        let resp = self
            .broadcast
            .broadcast(vec![HubCommand::ConfirmGatewayTx {
                chain: chain.to_string(),
                tx_hash: tx_hash.to_string(),
            }])
            .await?;
        if let Some(ref tx) = resp {
            if tx.already_confirmed() {
                info!("[hub] {} already confirmed, treating as success", tx_hash);
            }
        }
        Ok(resp)
    }

    /// Submit a route-message request. An "already executed" response means
    /// some other relayer won the race; that is terminal success, not
    /// failure.
    pub async fn route_message(
        &self,
        id: &str,
        payload: &[u8],
    ) -> RelayResult<Option<HubTxResponse>> {
        let result = self
            .broadcast
            .broadcast(vec![HubCommand::RouteMessage {
                id: id.to_string(),
                payload: payload.to_vec(),
            }])
            .await;

        match result {
            Ok(Some(tx)) if tx.already_executed() => {
                info!("[hub] message {} already executed, treating as success", id);
                Ok(Some(tx))
            }
            Ok(resp) => Ok(resp),
            Err(RelayError::Broadcast(msg)) if msg.contains("already executed") => {
                info!("[hub] message {} already executed, treating as success", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the validator set to sign the outstanding commands for a chain.
    /// A response carrying a failure indicator is a hard error, and so is
    /// getting no response at all.
    pub async fn sign_commands(&self, chain: &str) -> RelayResult<HubTxResponse> {
        let resp = self
            .broadcast
            .broadcast(vec![HubCommand::SignCommands {
                chain: chain.to_string(),
            }])
            .await?;

        match resp {
            Some(tx) if tx.sign_failed() => Err(RelayError::SignRejected(tx.raw_log)),
            Some(tx) => Ok(tx),
            None => Err(RelayError::MissingSignResponse),
        }
    }

    /// Poll the hub until the batch is fully signed and return its execute
    /// data. An aborted batch is a hard error.
    pub async fn execute_data_for_batch(
        &self,
        chain: &str,
        batch_id: &str,
    ) -> RelayResult<Vec<u8>> {
        loop {
            let batch = self.querier.batched_commands(chain, batch_id).await?;
            match batch.status {
                BatchStatus::Signed => {
                    return batch.execute_data.ok_or_else(|| {
                        RelayError::Parse(format!("batch {} is signed but has no execute data", batch_id))
                    });
                }
                BatchStatus::Aborted => {
                    return Err(RelayError::Generic(format!("batch {} was aborted", batch_id)));
                }
                status => {
                    debug!(
                        "[hub] batch {} not ready yet ({:?}), polling again",
                        batch_id, status
                    );
                    tokio::time::sleep(self.batch_poll_interval).await;
                }
            }
        }
    }

    /// Whether the hub has fully processed an EVM-origin event.
    pub async fn is_event_completed(&self, chain: &str, event_id: &str) -> RelayResult<bool> {
        let status = self.querier.gateway_event(chain, event_id).await?;
        Ok(matches!(status, Some(GatewayEventStatus::Completed)))
    }
}

/// `HubQuerier` over the hub's REST (LCD) endpoint.
pub struct LcdHubQuerier {
    base_url: String,
    client: reqwest::Client,
}

impl LcdHubQuerier {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    async fn get_text(&self, path: &str) -> RelayResult<(reqwest::StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::HubRpc(format!("{}: {}", url, e)))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RelayError::HubRpc(format!("{}: {}", url, e)))?;
        Ok((status, body))
    }

    fn parse<T: serde::de::DeserializeOwned>(path: &str, body: &str) -> RelayResult<T> {
        serde_json::from_str(body)
            .map_err(|e| RelayError::HubRpc(format!("{} returned unparseable body: {}", path, e)))
    }
}

#[derive(Deserialize)]
struct MessageResponse {
    message: MessageJson,
}

#[derive(Deserialize)]
struct MessageJson {
    #[serde(default)]
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct PendingCommandsResponse {
    #[serde(default)]
    commands: Vec<PendingCommand>,
}

#[derive(Deserialize)]
struct BatchedCommandsResponse {
    status: String,
    #[serde(default)]
    execute_data: Option<String>,
}

#[derive(Deserialize)]
struct GatewayEventResponse {
    event: GatewayEventJson,
}

#[derive(Deserialize)]
struct GatewayEventJson {
    status: String,
}

#[async_trait]
impl HubQuerier for LcdHubQuerier {
    async fn message(&self, id: &str) -> RelayResult<Option<HubMessage>> {
        let path = format!("/axelar/nexus/v1beta1/message/{}", id);
        let (status, body) = self.get_text(&path).await?;
        if !status.is_success() {
            if body.contains("not found") {
                return Ok(None);
            }
            return Err(RelayError::HubRpc(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }
        let resp: MessageResponse = Self::parse(&path, &body)?;
        let message_status = MessageStatus::from_proto_name(&resp.message.status)?;
        Ok(Some(HubMessage {
            id: if resp.message.id.is_empty() {
                id.to_string()
            } else {
                resp.message.id
            },
            status: message_status,
        }))
    }

    async fn pending_commands(&self, chain: &str) -> RelayResult<Vec<PendingCommand>> {
        let path = format!("/axelar/evm/v1beta1/pending_commands/{}", chain);
        let (status, body) = self.get_text(&path).await?;
        if !status.is_success() {
            return Err(RelayError::HubRpc(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }
        let resp: PendingCommandsResponse = Self::parse(&path, &body)?;
        Ok(resp.commands)
    }

    async fn batched_commands(&self, chain: &str, id: &str) -> RelayResult<BatchedCommands> {
        let path = format!("/axelar/evm/v1beta1/batched_commands/{}/{}", chain, id);
        let (status, body) = self.get_text(&path).await?;
        if !status.is_success() {
            return Err(RelayError::HubRpc(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }
        let resp: BatchedCommandsResponse = Self::parse(&path, &body)?;
        let batch_status = BatchStatus::from_proto_name(&resp.status)?;
        let execute_data = match resp.execute_data {
            Some(data) if !data.is_empty() => Some(crate::events::decode_hex(&data)?),
            _ => None,
        };
        Ok(BatchedCommands {
            status: batch_status,
            execute_data,
        })
    }

    async fn gateway_event(
        &self,
        chain: &str,
        event_id: &str,
    ) -> RelayResult<Option<GatewayEventStatus>> {
        let path = format!("/axelar/evm/v1beta1/event/{}/{}", chain, event_id);
        let (status, body) = self.get_text(&path).await?;
        if !status.is_success() {
            if body.contains("no event with ID") {
                return Ok(None);
            }
            return Err(RelayError::HubRpc(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }
        let resp: GatewayEventResponse = Self::parse(&path, &body)?;
        match GatewayEventStatus::from_proto_name(&resp.event.status) {
            Ok(event_status) => Ok(Some(event_status)),
            Err(e) => {
                warn!("[hub] unparseable gateway event status: {}", e);
                Err(e)
            }
        }
    }
}
