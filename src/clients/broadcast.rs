// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Broadcast/retry wrapper around the hub signing capability.
//!
//! Exactly one error class is retried automatically: an account-sequence
//! conflict from concurrent use of the signer. A response-event decode
//! mismatch between client and hub versions means the transaction most
//! likely landed but cannot be confirmed; those resolve to `Ok(None)` so
//! callers treat the submission as fire-and-forget instead of re-sending.
//! Everything else propagates unmodified.

use crate::clients::hub::{HubBroadcaster, HubCommand};
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayerMetrics;
use crate::types::HubTxResponse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Response marker of a sequence conflict caused by concurrent signer reuse.
const ACCOUNT_SEQUENCE_MISMATCH: &str = "account sequence mismatch";

/// Response marker of the client/hub event-decoding mismatch (CometBFT 0.38
/// block results against an older decoder).
const EVENT_DECODE_MISMATCH: &str = "Invalid string. Length must be a multiple of 4";

pub struct BroadcastClient {
    broadcaster: Arc<dyn HubBroadcaster>,
    max_retries: u32,
    retry_delay: Duration,
    metrics: Option<Arc<RelayerMetrics>>,
}

impl BroadcastClient {
    pub fn new(
        broadcaster: Arc<dyn HubBroadcaster>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            broadcaster,
            max_retries,
            retry_delay,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sign and broadcast, retrying sequence conflicts up to the configured
    /// maximum. `Ok(None)` means the submission went out but its result
    /// could not be decoded.
    pub async fn broadcast(
        &self,
        commands: Vec<HubCommand>,
    ) -> RelayResult<Option<HubTxResponse>> {
        let mut attempts = 0u32;
        loop {
            if attempts >= self.max_retries {
                if let Some(ref m) = self.metrics {
                    m.broadcasts_total.with_label_values(&["exhausted"]).inc();
                }
                return Err(RelayError::MaxRetriesExceeded { attempts });
            }

            match self.broadcaster.sign_and_broadcast(commands.clone()).await {
                Ok(resp) => {
                    if let Some(ref m) = self.metrics {
                        m.broadcasts_total.with_label_values(&["ok"]).inc();
                    }
                    return Ok(Some(resp));
                }
                Err(RelayError::Broadcast(msg)) if msg.contains(EVENT_DECODE_MISMATCH) => {
                    warn!(
                        "Tx likely broadcast but response events failed to decode \
                         (client/hub version mismatch); proceeding as fire-and-forget"
                    );
                    if let Some(ref m) = self.metrics {
                        m.broadcasts_total
                            .with_label_values(&["fire_and_forget"])
                            .inc();
                    }
                    return Ok(None);
                }
                Err(RelayError::Broadcast(msg)) if msg.contains(ACCOUNT_SEQUENCE_MISMATCH) => {
                    attempts += 1;
                    info!(
                        "Account sequence mismatch, retrying in {}s (attempt {})",
                        self.retry_delay.as_secs(),
                        attempts
                    );
                    if let Some(ref m) = self.metrics {
                        m.broadcast_retries.inc();
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    if let Some(ref m) = self.metrics {
                        m.broadcasts_total.with_label_values(&["error"]).inc();
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockBroadcaster;
    use std::time::Instant;

    fn ok_response() -> HubTxResponse {
        HubTxResponse {
            tx_hash: "DEADBEEF".to_string(),
            raw_log: "[]".to_string(),
            batched_commands_id: None,
        }
    }

    fn confirm() -> Vec<HubCommand> {
        vec![HubCommand::ConfirmGatewayTx {
            chain: "avalanche".to_string(),
            tx_hash: "0xabc".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_sequence_mismatch_retries_then_succeeds() {
        let broadcaster = Arc::new(MockBroadcaster::default());
        broadcaster
            .push_response(Err(RelayError::Broadcast(
                "account sequence mismatch, expected 42, got 41".to_string(),
            )))
            .await;
        broadcaster.push_response(Ok(ok_response())).await;

        let retry_delay = Duration::from_millis(20);
        let client = BroadcastClient::new(broadcaster.clone(), 3, retry_delay);

        let start = Instant::now();
        let resp = client.broadcast(confirm()).await.unwrap();

        assert_eq!(resp.unwrap().tx_hash, "DEADBEEF");
        assert_eq!(broadcaster.call_count().await, 2);
        // Exactly one retry delay elapsed
        assert!(start.elapsed() >= retry_delay);
        assert!(start.elapsed() < retry_delay * 3);
    }

    #[tokio::test]
    async fn test_decode_mismatch_is_fire_and_forget() {
        let broadcaster = Arc::new(MockBroadcaster::default());
        broadcaster
            .push_response(Err(RelayError::Broadcast(
                "Invalid string. Length must be a multiple of 4".to_string(),
            )))
            .await;

        let client = BroadcastClient::new(broadcaster.clone(), 3, Duration::from_millis(1));
        let resp = client.broadcast(confirm()).await.unwrap();

        assert!(resp.is_none());
        // No retry: the submission probably landed
        assert_eq!(broadcaster.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_unmodified() {
        let broadcaster = Arc::new(MockBroadcaster::default());
        broadcaster
            .push_response(Err(RelayError::Broadcast(
                "insufficient fees".to_string(),
            )))
            .await;

        let client = BroadcastClient::new(broadcaster.clone(), 3, Duration::from_millis(1));
        match client.broadcast(confirm()).await {
            Err(RelayError::Broadcast(msg)) => assert!(msg.contains("insufficient fees")),
            other => panic!("expected broadcast error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(broadcaster.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded_is_hard_failure() {
        let broadcaster = Arc::new(MockBroadcaster::default());
        for _ in 0..5 {
            broadcaster
                .push_response(Err(RelayError::Broadcast(
                    "account sequence mismatch".to_string(),
                )))
                .await;
        }

        let client = BroadcastClient::new(broadcaster.clone(), 3, Duration::from_millis(1));
        match client.broadcast(confirm()).await {
            Err(RelayError::MaxRetriesExceeded { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected max retries error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(broadcaster.call_count().await, 3);
    }
}
