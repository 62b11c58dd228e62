// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Relay record store capability.
//!
//! The store is the only mutable state shared between the live pipeline and
//! the reconciliation engine. All writes are keyed by relay id, and status
//! writes are monotone: a write that would move a record backwards is not
//! applied. Persistence itself is external; the in-memory implementation
//! here backs tests and single-process deployments.

use crate::error::{RelayError, RelayResult};
use crate::types::{RelayRecord, RelayStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait RelayStore: Send + Sync {
    /// Insert the record unless one with the same id already exists.
    /// Returns `true` if the record was created. Re-observing the same
    /// originating event must never produce a second record.
    async fn create_if_absent(&self, record: RelayRecord) -> RelayResult<bool>;

    async fn get(&self, id: &str) -> RelayResult<Option<RelayRecord>>;

    /// Move a record forward to `status`. Returns `true` if the status was
    /// applied, `false` if the record was already at or past it. Regressions
    /// are never applied; `Failed` is reachable from any non-completed state.
    async fn advance_status(&self, id: &str, status: RelayStatus) -> RelayResult<bool>;

    async fn record_hub_tx(&self, id: &str, tx_hash: &str) -> RelayResult<()>;
    async fn record_destination_tx(&self, id: &str, tx_hash: &str) -> RelayResult<()>;

    /// Records whose originating event committed to the given payload hash.
    async fn find_by_payload_hash(&self, payload_hash: &str) -> RelayResult<Vec<RelayRecord>>;
}

/// In-memory store keyed by relay id.
pub struct MemoryRelayStore {
    records: RwLock<HashMap<String, RelayRecord>>,
}

impl MemoryRelayStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryRelayStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayStore for MemoryRelayStore {
    async fn create_if_absent(&self, record: RelayRecord) -> RelayResult<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            debug!("relay {} already recorded, skipping create", record.id);
            return Ok(false);
        }
        records.insert(record.id.clone(), record);
        Ok(true)
    }

    async fn get(&self, id: &str) -> RelayResult<Option<RelayRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn advance_status(&self, id: &str, status: RelayStatus) -> RelayResult<bool> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| RelayError::Storage(format!("unknown relay id {}", id)))?;

        if status == RelayStatus::Failed {
            // Completed transfers stay completed; anything else can fail.
            if record.status == RelayStatus::Completed {
                warn!(
                    "relay {} is completed, refusing to mark failed",
                    record.id
                );
                return Ok(false);
            }
            record.status = RelayStatus::Failed;
            record.updated_at = Utc::now();
            return Ok(true);
        }

        if status <= record.status {
            debug!(
                "relay {} already at {} (requested {}), not applied",
                record.id, record.status, status
            );
            return Ok(false);
        }

        record.status = status;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_hub_tx(&self, id: &str, tx_hash: &str) -> RelayResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| RelayError::Storage(format!("unknown relay id {}", id)))?;
        record.hub_tx = Some(tx_hash.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn record_destination_tx(&self, id: &str, tx_hash: &str) -> RelayResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| RelayError::Storage(format!("unknown relay id {}", id)))?;
        record.destination_tx = Some(tx_hash.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_payload_hash(&self, payload_hash: &str) -> RelayResult<Vec<RelayRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.payload_hash.as_deref() == Some(payload_hash))
            .cloned()
            .collect())
    }
}
