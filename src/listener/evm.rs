// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! EVM gateway event listener.
//!
//! Polls gateway logs against the provider in bounded block ranges, keeping
//! a locally tracked last-seen height so nothing below it is re-delivered
//! after a reconnect. Transport failures are retried indefinitely; parse
//! failures drop the individual log.

use crate::clients::evm::{EvmClient, IAxelarGatewayEvents};
use crate::config::RunMode;
use crate::error::RelayResult;
use crate::events::{CanonicalEvent, EventKind};
use crate::metrics::RelayerMetrics;
use crate::retry_with_max_elapsed_time;
use ethers::contract::LogMeta;
use ethers::providers::JsonRpcClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct EvmListener<P: JsonRpcClient> {
    client: Arc<EvmClient<P>>,
    cosmos_chain_ids: Vec<String>,
    run_mode: RunMode,
    max_retry_duration: Duration,
    metrics: Option<Arc<RelayerMetrics>>,
}

impl<P> EvmListener<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(
        client: Arc<EvmClient<P>>,
        cosmos_chain_ids: Vec<String>,
        run_mode: RunMode,
    ) -> Self {
        Self {
            client,
            cosmos_chain_ids,
            run_mode,
            max_retry_duration: Duration::from_secs(120),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_retry_duration(mut self, duration: Duration) -> Self {
        self.max_retry_duration = duration;
        self
    }

    /// Whether an event should be forwarded at all. Call events destined for
    /// chains outside the accepted set are dropped here to avoid colliding
    /// with relayers serving other destinations; devnet passes everything.
    fn accepts(&self, event: &CanonicalEvent) -> bool {
        match event.kind {
            EventKind::ContractCall | EventKind::ContractCallWithToken => {
                self.run_mode.is_permissive()
                    || self
                        .cosmos_chain_ids
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(&event.destination_chain))
            }
            // Approved events are filtered by source chain in the router
            _ => true,
        }
    }

    pub async fn run(self, tx: mpsc::Sender<CanonicalEvent>, cancel: CancellationToken) {
        let chain = self.client.chain_id().to_string();
        let poll_interval = self.client.config().poll_interval();
        let max_block_range = self.client.config().max_block_range;

        info!("[{}] Listening to gateway events", chain);

        // Events at or below the height we started at are someone else's
        // problem (or were already handled before a restart).
        let mut last_seen = match retry_with_max_elapsed_time!(
            self.client.latest_height(),
            self.max_retry_duration
        ) {
            Ok(Ok(height)) => height,
            _ => {
                error!("[{}] Could not fetch initial height, starting from 0", chain);
                0
            }
        };

        let mut interval = time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[{}] Listener cancelled", chain);
                    break;
                }
                _ = interval.tick() => {}
            }

            let latest = match retry_with_max_elapsed_time!(
                self.client.latest_height(),
                self.max_retry_duration
            ) {
                Ok(Ok(height)) => height,
                _ => {
                    warn!("[{}] Failed to get latest block after retry", chain);
                    continue;
                }
            };

            if latest <= last_seen {
                continue;
            }

            let mut from_block = last_seen + 1;
            while from_block <= latest {
                if cancel.is_cancelled() {
                    return;
                }
                let to_block = std::cmp::min(from_block + max_block_range - 1, latest);

                let logs = match retry_with_max_elapsed_time!(
                    self.client.gateway_logs(from_block, to_block),
                    self.max_retry_duration
                ) {
                    Ok(Ok(logs)) => logs,
                    _ => {
                        error!(
                            "[{}] Failed to fetch logs for blocks {}-{} after retry",
                            chain, from_block, to_block
                        );
                        // Leave last_seen untouched; the next tick re-fetches
                        break;
                    }
                };

                debug!(
                    "[{}] Fetched {} gateway logs (blocks {}-{})",
                    chain,
                    logs.len(),
                    from_block,
                    to_block
                );

                for (gateway_event, meta) in logs {
                    if tx.is_closed() {
                        return;
                    }
                    if let Err(e) = self.emit(&chain, &gateway_event, &meta, &tx).await {
                        warn!("[{}] Dropping log {:?}: {}", chain, meta.transaction_hash, e);
                    }
                }

                last_seen = to_block;
                from_block = to_block + 1;
            }
        }
    }

    async fn emit(
        &self,
        chain: &str,
        gateway_event: &IAxelarGatewayEvents,
        meta: &LogMeta,
        tx: &mpsc::Sender<CanonicalEvent>,
    ) -> RelayResult<()> {
        // The hub keys events by their index within the transaction
        let log_index = self
            .client
            .log_index_in_tx(meta.transaction_hash, meta.log_index)
            .await?;

        let event = CanonicalEvent::from_gateway_event(chain, gateway_event, meta, log_index);

        if !self.accepts(&event) {
            debug!(
                "[{}] Not an accepted destination: {} -> {}",
                chain,
                event.event_id(),
                event.destination_chain
            );
            if let Some(ref m) = self.metrics {
                m.events_dropped.with_label_values(&["destination"]).inc();
            }
            return Ok(());
        }

        if let Some(ref m) = self.metrics {
            m.events_received
                .with_label_values(&[chain, event.kind.as_str()])
                .inc();
        }

        let _ = tx.send(event).await;
        Ok(())
    }
}
