// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! The relay pipeline: two directional state machines sharing one step
//! vocabulary, both idempotent at every step. Live events and the
//! reconciliation engine invoke the same operations, so each step tolerates
//! being called when a later step already completed: the hub answers
//! "already confirmed" / "already executed" and that is always success.

pub mod inbound;
pub mod outbound;

use crate::alert::AlertClass;
use crate::events::CanonicalEvent;
use crate::node::RelayerContext;
use crate::router::Routed;
use ethers::providers::JsonRpcClient;
use std::sync::Arc;
use tracing::{error, info};

/// Entry point for one live event. Errors are terminal for this attempt
/// only: they are logged (and alerted when operator-actionable), and the
/// reconciliation engine picks the transfer up again later.
pub async fn dispatch_event<P>(ctx: Arc<RelayerContext<P>>, event: CanonicalEvent)
where
    P: JsonRpcClient + 'static,
{
    let kind = event.kind;
    let event_id = event.event_id();
    info!("[{}] EventReceived {} ({})", event.chain, kind, event_id);

    let result = match ctx.router.route(&event) {
        Routed::Inbound { source } => inbound::handle_call_event(&ctx, source, &event).await,
        Routed::Outbound { destination } => {
            outbound::handle_submitted_event(&ctx, destination, &event).await
        }
        Routed::Approved { destination } => {
            outbound::handle_approved_event(&ctx, destination, &event).await
        }
        Routed::Completed => inbound::handle_completed_event(&ctx, &event).await,
        Routed::PacketDelivered => inbound::handle_packet_delivered(&ctx, &event).await,
        Routed::Dropped => Ok(()),
    };

    if let Err(e) = result {
        error!("[{}] handling {} failed: {}", kind, event_id, e);
        ctx.metrics
            .pipeline_failures
            .with_label_values(&[e.error_type()])
            .inc();
        if e.needs_operator() {
            ctx.alerts
                .send(
                    AlertClass::Critical,
                    &format!("relay {} needs attention: {}", event_id, e),
                )
                .await;
        }
    }
}
