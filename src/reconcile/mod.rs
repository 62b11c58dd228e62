// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation engine.
//!
//! Runs on a fixed interval, pulls the in-transit list from the status
//! service, and re-drives transfers that have sat still past their
//! direction's staleness window. Diagnosis never trusts the cached status:
//! it asks the hub and the chains directly (completion event, then message
//! status, then pending commands, then gateway approval) and resumes
//! the pipeline from the furthest completed step using the same idempotent
//! operations the live path uses. One transfer failing never aborts the
//! pass.

use crate::alert::AlertClass;
use crate::error::{RelayError, RelayResult};
use crate::events::decode_hex;
use crate::listener::parse::{decode_base64, remove_quote};
use crate::node::RelayerContext;
use crate::status::{event_names, RelayDetail, RelaySummary};
use crate::types::{ConnectionId, Direction, MessageStatus, RelayStatus};
use chrono::Utc;
use ethers::providers::JsonRpcClient;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct ReconcileEngine<P: JsonRpcClient> {
    ctx: Arc<RelayerContext<P>>,
}

impl<P> ReconcileEngine<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(ctx: Arc<RelayerContext<P>>) -> Self {
        Self { ctx }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let config = &self.ctx.config.reconcile;
        info!(
            "[Reconcile] started (interval {}s, inbound stale {}s, outbound stale {}s)",
            config.interval_secs, config.inbound_stale_secs, config.outbound_stale_secs
        );

        let mut interval = tokio::time::interval(config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Reconcile] cancelled");
                    break;
                }
                _ = interval.tick() => {}
            }

            if let Err(e) = self.pass().await {
                error!("[Reconcile] pass failed: {}", e);
            }
            self.ctx.metrics.reconcile_passes.inc();
        }
    }

    /// One reconciliation pass over the in-transit set.
    pub async fn pass(&self) -> RelayResult<()> {
        let relays = self.ctx.status.in_transit_relays().await?;
        if relays.is_empty() {
            debug!("[Reconcile] no relays in transit");
            self.ctx.metrics.stale_relays.set(0);
            return Ok(());
        }

        let now = Utc::now();
        let mut stale = Vec::new();
        for relay in relays {
            let direction = match relay.direction() {
                Ok(direction) => direction,
                Err(e) => {
                    error!("[Reconcile] relay {} has bad flow type: {}", relay.id, e);
                    continue;
                }
            };
            let threshold = self.ctx.config.reconcile.stale_threshold(direction);
            if now - relay.created_at >= threshold {
                stale.push((relay, direction));
            }
        }
        self.ctx.metrics.stale_relays.set(stale.len() as i64);
        if stale.is_empty() {
            return Ok(());
        }
        info!("[Reconcile] Found {} stuck relays", stale.len());

        // Sequential on purpose: at most one in-flight broadcast per
        // direction and chain at a time from this engine.
        for (relay, direction) in stale {
            if self.ctx.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.reconcile_relay(&relay, direction).await {
                error!("[Reconcile] Could not fix relay {}: {}", relay.id, e);
                self.ctx.metrics.reconcile_failures.inc();
                self.ctx
                    .alerts
                    .send(
                        AlertClass::Critical,
                        &format!(
                            "reconciliation failed for relay {} ({}): {}",
                            relay.id, relay.connection_id, e
                        ),
                    )
                    .await;
            }
        }
        Ok(())
    }

    async fn reconcile_relay(
        &self,
        summary: &RelaySummary,
        direction: Direction,
    ) -> RelayResult<()> {
        let conn = ConnectionId::parse(&summary.connection_id)?;
        info!(
            "[Reconcile] Fixing relay {} for {}",
            summary.id, summary.connection_id
        );

        let detail = self.ctx.status.relay_detail(&summary.id).await?;
        match direction {
            Direction::Inbound => self.reconcile_inbound(&conn.chain_id, &detail).await,
            Direction::Outbound => self.reconcile_outbound(&conn.chain_id, &detail).await,
        }
    }

    async fn reconcile_inbound(&self, chain_id: &str, detail: &RelayDetail) -> RelayResult<()> {
        // A locally completed record proves there is nothing left to do
        if let Some(record) = self.ctx.store.get(&detail.source_event_id()).await? {
            if record.status == RelayStatus::Completed {
                debug!("[Reconcile] relay {} already completed locally", detail.id);
                return Ok(());
            }
        }

        if detail.bridging_tx_hash.is_none() {
            // Either the confirm never reached the hub, or the status index
            // hasn't caught up. The hub's own event record decides.
            if self
                .ctx
                .hub
                .is_event_completed(chain_id, &detail.source_event_id())
                .await?
            {
                info!(
                    "[Reconcile] hub already processed {}, status index is lagging",
                    detail.source_event_id()
                );
                return Ok(());
            }

            // Re-check finality before re-confirming; a transfer being old
            // never bypasses the finality gate.
            let height = detail
                .event_named(event_names::CONTRACT_CALL)
                .map(|e| e.block_height)
                .unwrap_or(0);
            let client = self
                .ctx
                .router
                .client(chain_id)
                .ok_or_else(|| RelayError::MissingClient(chain_id.to_string()))?;
            if height > 0 && !client.is_final(height).await? {
                info!(
                    "[Reconcile] {} tx {} is not finalized yet, leaving for a later pass",
                    chain_id, detail.source_tx_hash
                );
                return Ok(());
            }

            if let Some(tx) = self
                .ctx
                .hub
                .confirm_gateway_tx(chain_id, &detail.source_tx_hash)
                .await?
            {
                info!("[Reconcile] confirmed: {}", tx.tx_hash);
            }
        } else if detail.destination_tx_hash.is_none() {
            // Confirmed on the hub but never routed onward (or the route
            // failed, e.g. an IBC timeout)
            let event = detail
                .event_named(event_names::CONTRACT_CALL)
                .ok_or_else(|| RelayError::Parse("ContractCall event not found".to_string()))?;
            let payload_hex = event
                .event_params
                .get("payload")
                .ok_or_else(|| RelayError::Parse("ContractCall event has no payload".to_string()))?;
            let payload = decode_hex(&remove_quote(payload_hex))?;
            let id = format!("{}-{}", event.tx_hash, event.tx_index);

            if let Some(tx) = self.ctx.hub.route_message(&id, &payload).await? {
                info!("[Reconcile] routed: {}", tx.tx_hash);
            }
        }
        Ok(())
    }

    async fn reconcile_outbound(&self, chain_id: &str, detail: &RelayDetail) -> RelayResult<()> {
        if detail.bridging_tx_hash.is_none() {
            // The hub never saw the submission: the pending action was not
            // forwarded, or the IBC relay dropped it. Needs a human.
            self.ctx
                .alerts
                .send(
                    AlertClass::Notify,
                    &format!(
                        "relay {}: hub submission missing, pending action was not \
                         forwarded or the IBC relay dropped it; manual investigation required",
                        detail.id
                    ),
                )
                .await;
            return Ok(());
        }
        if detail.destination_tx_hash.is_some() {
            return Ok(());
        }

        // Approved on the destination gateway but never executed downstream:
        // the executor is out of funds or has stopped.
        if detail.has_event(event_names::CONTRACT_CALL_APPROVED) {
            self.ctx
                .alerts
                .send(
                    AlertClass::Critical,
                    &format!(
                        "relay {}: call approved on {} but never executed; \
                         executor may be out of funds or stopped",
                        detail.id, chain_id
                    ),
                )
                .await;
            return Ok(());
        }

        let submitted = detail
            .event_named(event_names::CONTRACT_CALL_SUBMITTED)
            .ok_or_else(|| {
                RelayError::Parse("ContractCallSubmitted event not found".to_string())
            })?;
        let message_id = remove_quote(
            submitted
                .event_params
                .get("message_id")
                .ok_or_else(|| RelayError::Parse("submission has no message_id".to_string()))?,
        );

        // Locally completed records never get re-driven
        if let Some(record) = self.ctx.store.get(&message_id).await? {
            if record.status == RelayStatus::Completed {
                debug!("[Reconcile] relay {} already completed locally", detail.id);
                return Ok(());
            }
        }

        let message = self
            .ctx
            .hub
            .querier()
            .message(&message_id)
            .await?
            .ok_or_else(|| {
                RelayError::Generic(format!("message {} was not found on hub", message_id))
            })?;

        match message.status {
            MessageStatus::Approved => {
                // Never routed. Route it, then sign if a command is pending.
                info!(
                    "[Reconcile] message {} approved but not routed, routing now",
                    message_id
                );
                let payload_b64 = submitted
                    .event_params
                    .get("payload")
                    .ok_or_else(|| RelayError::Parse("submission has no payload".to_string()))?;
                let payload = decode_base64(&remove_quote(payload_b64))?;
                if let Some(tx) = self.ctx.hub.route_message(&message_id, &payload).await? {
                    info!("[Reconcile] RouteMessage: {}", tx.tx_hash);
                }

                let pending = self.ctx.hub.querier().pending_commands(chain_id).await?;
                if pending.is_empty() {
                    self.ctx
                        .alerts
                        .send(
                            AlertClass::Notify,
                            &format!(
                                "relay {}: routed message {} but no command is pending for {}",
                                detail.id, message_id, chain_id
                            ),
                        )
                        .await;
                    return Ok(());
                }
                let sign = self.ctx.hub.sign_commands(chain_id).await?;
                info!("[Reconcile] SignCommands: {}", sign.tx_hash);
            }
            MessageStatus::Executed => {
                // Routed already; was its command ever signed?
                let pending = self.ctx.hub.querier().pending_commands(chain_id).await?;
                if pending.iter().any(|c| c.matches_message_id(&message_id)) {
                    info!(
                        "[Reconcile] message {} routed but command unsigned, signing",
                        message_id
                    );
                    let sign = self.ctx.hub.sign_commands(chain_id).await?;
                    info!("[Reconcile] SignCommands: {}", sign.tx_hash);
                } else {
                    // Signed and batched, but the batch never landed on the
                    // destination chain. The hub should have forwarded it.
                    self.ctx
                        .alerts
                        .send(
                            AlertClass::Critical,
                            &format!(
                                "relay {}: hub batched message {} but the batch never \
                                 reached {}, please investigate",
                                detail.id, message_id, chain_id
                            ),
                        )
                        .await;
                }
            }
            status => {
                // FAILED or any unrecognized state is never silently retried
                return Err(RelayError::MessageUnrecoverable {
                    id: message_id,
                    status: status.proto_name().to_string(),
                });
            }
        }
        Ok(())
    }
}
