// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Read-only client for the external relay-status index.
//!
//! The status service tracks transfer lifecycles independently of this
//! relayer. The reconciliation engine uses it only to *select and diagnose*
//! stalled transfers; completion decisions always come from hub and chain
//! state directly, since the index can lag behind either.

use crate::error::{RelayError, RelayResult};
use crate::types::Direction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Summary row from the in-transit listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySummary {
    pub id: String,
    pub flow_type: String,
    pub connection_id: String,
    pub source_tx_hash: String,
    pub created_at: DateTime<Utc>,
}

impl RelaySummary {
    pub fn direction(&self) -> RelayResult<Direction> {
        Direction::from_flow_type(&self.flow_type)
    }
}

/// One constituent event of a relay, as indexed by the status service.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayEvent {
    pub name: String,
    pub tx_hash: String,
    #[serde(default)]
    pub tx_index: u64,
    #[serde(default)]
    pub block_height: u64,
    #[serde(default)]
    pub event_params: HashMap<String, String>,
}

/// Full transfer detail including constituent events.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayDetail {
    pub id: String,
    pub flow_type: String,
    pub source_tx_hash: String,
    pub bridging_tx_hash: Option<String>,
    pub destination_tx_hash: Option<String>,
    #[serde(default)]
    pub source_event_index: u64,
    #[serde(default)]
    pub events: Vec<RelayEvent>,
}

impl RelayDetail {
    pub fn direction(&self) -> RelayResult<Direction> {
        Direction::from_flow_type(&self.flow_type)
    }

    pub fn event_named(&self, name: &str) -> Option<&RelayEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.event_named(name).is_some()
    }

    /// Id of the originating source-chain event (`{tx_hash}-{index}`).
    pub fn source_event_id(&self) -> String {
        format!("{}-{}", self.source_tx_hash, self.source_event_index)
    }
}

/// Event names the reconciliation engine keys its diagnosis on.
pub mod event_names {
    pub const CONTRACT_CALL: &str = "ContractCall";
    pub const CONTRACT_CALL_SUBMITTED: &str = "ContractCallSubmitted";
    pub const CONTRACT_CALL_APPROVED: &str = "ContractCallApproved";
}

#[async_trait]
pub trait StatusApi: Send + Sync {
    /// Transfers the index currently considers in transit.
    async fn in_transit_relays(&self) -> RelayResult<Vec<RelaySummary>>;

    async fn relay_detail(&self, id: &str) -> RelayResult<RelayDetail>;
}

pub struct HttpStatusApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStatusApi {
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

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> RelayResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::StatusApi(format!("{}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(RelayError::StatusApi(format!(
                "{} response is not 200: {}",
                url,
                resp.status()
            )));
        }
        resp.json::<T>()
            .await
            .map_err(|e| RelayError::StatusApi(format!("{}: {}", url, e)))
    }
}

#[derive(Deserialize)]
struct RelayListResponse {
    #[serde(default)]
    data: Vec<RelaySummary>,
}

#[async_trait]
impl StatusApi for HttpStatusApi {
    async fn in_transit_relays(&self) -> RelayResult<Vec<RelaySummary>> {
        let resp: RelayListResponse = self
            .fetch_json("/relays?bridge=axelar&status=in_transit")
            .await?;
        Ok(resp.data)
    }

    async fn relay_detail(&self, id: &str) -> RelayResult<RelayDetail> {
        self.fetch_json(&format!("/relays/{}", id)).await
    }
}
