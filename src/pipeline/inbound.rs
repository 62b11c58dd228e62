// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Source-chain -> hub pipeline.
//!
//! A gateway call event creates the relay record, waits out source-chain
//! finality, and confirms the transaction on the hub. Once the hub reports
//! the event completed, the message is routed onward to its Cosmos-side
//! destination and the record closes.

use crate::clients::evm::EvmClient;
use crate::error::{RelayError, RelayResult};
use crate::events::CanonicalEvent;
use crate::node::RelayerContext;
use crate::types::{Direction, RelayRecord, RelayStatus};
use ethers::providers::JsonRpcClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often to re-check source finality while a transfer waits. The wait
/// can span the chain's whole finality window, seconds to tens of minutes.
const FINALITY_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Gateway call observed on a source chain: record it, wait for finality,
/// confirm on the hub.
pub async fn handle_call_event<P>(
    ctx: &RelayerContext<P>,
    source: Arc<EvmClient<P>>,
    event: &CanonicalEvent,
) -> RelayResult<()>
where
    P: JsonRpcClient + 'static,
{
    let id = event.event_id();

    let record = RelayRecord::new(
        &id,
        Direction::Inbound,
        &event.chain,
        &event.destination_chain,
    )
    .with_payload(event.payload()?, event.payload_hash()?)
    .with_source_tx(&event.tx_hash);

    if ctx.store.create_if_absent(record).await? {
        ctx.metrics.relays_created.inc();
    } else if let Some(existing) = ctx.store.get(&id).await? {
        // Reconciliation may have raced us past the confirm already
        if existing.status >= RelayStatus::ConfirmedOnHub {
            debug!("[{}] {} already confirmed, nothing to do", event.chain, id);
            return Ok(());
        }
    }

    // The confirm must not reach the hub before the source chain can no
    // longer revert the block.
    loop {
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }
        match source.is_final(event.block_height).await {
            Ok(true) => break,
            Ok(false) => {
                info!(
                    "[{}] tx {} at height {} is not finalized yet",
                    event.chain, event.tx_hash, event.block_height
                );
            }
            Err(e) => {
                warn!("[{}] finality check failed: {}", event.chain, e);
            }
        }
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(FINALITY_POLL_INTERVAL) => {}
        }
    }
    ctx.store.advance_status(&id, RelayStatus::Finalized).await?;

    if let Some(tx) = ctx
        .hub
        .confirm_gateway_tx(&event.chain, &event.tx_hash)
        .await?
    {
        info!("[{}] Confirmed on hub: {}", event.chain, tx.tx_hash);
        ctx.store.record_hub_tx(&id, &tx.tx_hash).await?;
    }
    ctx.store
        .advance_status(&id, RelayStatus::ConfirmedOnHub)
        .await?;
    Ok(())
}

/// The hub finished processing an EVM-origin event: route the message on to
/// its destination and close the record.
pub async fn handle_completed_event<P>(
    ctx: &RelayerContext<P>,
    event: &CanonicalEvent,
) -> RelayResult<()>
where
    P: JsonRpcClient + 'static,
{
    let event_id = event.completed_event_id()?;

    let Some(record) = ctx.store.get(&event_id).await? else {
        // Another relayer's transfer, or a record lost before a restart
        return Err(RelayError::Storage(format!(
            "no relay record for completed event {}, skipping",
            event_id
        )));
    };
    if record.status == RelayStatus::Completed {
        debug!("relay {} already completed", event_id);
        return Ok(());
    }
    let payload = record
        .payload
        .ok_or_else(|| RelayError::Parse(format!("relay {} has no payload", event_id)))?;

    if let Some(tx) = ctx.hub.route_message(&event_id, &payload).await? {
        info!("Routed {}: {}", event_id, tx.tx_hash);
        ctx.store.record_hub_tx(&event_id, &tx.tx_hash).await?;
    }
    ctx.store
        .advance_status(&event_id, RelayStatus::Routed)
        .await?;
    ctx.store
        .advance_status(&event_id, RelayStatus::Completed)
        .await?;
    Ok(())
}

/// IBC packet left the hub; the transfer is complete end to end.
pub async fn handle_packet_delivered<P>(
    _ctx: &RelayerContext<P>,
    event: &CanonicalEvent,
) -> RelayResult<()>
where
    P: JsonRpcClient + 'static,
{
    let memo = event
        .args
        .get("memo")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    info!("packet delivered (memo: {})", memo);
    Ok(())
}
