// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Relayer wiring: one context object built at startup, one task per
//! subscription, a consumer task per event channel, and the reconciliation
//! loop. Shutdown fans out through a single cancellation token; in-flight
//! broadcasts finish or time out, and the record store stays consistent
//! because every status write is monotonic.

use crate::alert::{AlertDispatcher, Notifier};
use crate::clients::broadcast::BroadcastClient;
use crate::clients::evm::EvmClient;
use crate::clients::hub::{HubBroadcaster, HubClient, HubQuerier};
use crate::config::RelayerConfig;
use crate::listener::{EvmListener, HubListener};
use crate::metrics::RelayerMetrics;
use crate::pipeline;
use crate::reconcile::ReconcileEngine;
use crate::router::DirectionRouter;
use crate::status::StatusApi;
use crate::store::RelayStore;
use ethers::providers::JsonRpcClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything the pipeline and reconciliation engine need, constructed once
/// and passed by reference. No module-level singletons.
pub struct RelayerContext<P: JsonRpcClient> {
    pub config: RelayerConfig,
    pub store: Arc<dyn RelayStore>,
    pub hub: HubClient,
    pub router: DirectionRouter<P>,
    pub status: Arc<dyn StatusApi>,
    pub alerts: AlertDispatcher,
    pub metrics: Arc<RelayerMetrics>,
    pub cancel: CancellationToken,
}

/// External capabilities supplied by the embedder: signing, persistence,
/// alert delivery, the status index, and the per-chain execution clients.
pub struct RelayerDeps<P: JsonRpcClient> {
    pub broadcaster: Arc<dyn HubBroadcaster>,
    pub querier: Arc<dyn HubQuerier>,
    pub store: Arc<dyn RelayStore>,
    pub notifier: Arc<dyn Notifier>,
    pub status: Arc<dyn StatusApi>,
    /// Keyed by chain id as registered on the hub.
    pub evm_clients: HashMap<String, Arc<EvmClient<P>>>,
}

pub fn build_context<P>(
    config: RelayerConfig,
    deps: &RelayerDeps<P>,
    metrics: Arc<RelayerMetrics>,
    cancel: CancellationToken,
) -> RelayerContext<P>
where
    P: JsonRpcClient + 'static,
{
    let broadcast = BroadcastClient::new(
        deps.broadcaster.clone(),
        config.broadcast.max_retries,
        config.broadcast.retry_delay(),
    )
    .with_metrics(metrics.clone());
    let hub = HubClient::new(config.hub.chain_id.clone(), broadcast, deps.querier.clone());

    let expected_contracts = config
        .evm_chains
        .iter()
        .map(|c| (c.id.clone(), c.bridge_contract.clone()))
        .collect();
    let router = DirectionRouter::new(
        deps.evm_clients.clone(),
        config.cosmos_chain_ids(),
        expected_contracts,
        config.run_mode,
    )
    .with_metrics(metrics.clone());

    let alerts = AlertDispatcher::new(deps.notifier.clone()).with_metrics(metrics.clone());

    RelayerContext {
        config,
        store: deps.store.clone(),
        hub,
        router,
        status: deps.status.clone(),
        alerts,
        metrics,
        cancel,
    }
}

/// Start the relayer. Returns the spawned task handles; cancel the token to
/// shut everything down.
pub async fn run_relayer<P>(
    config: RelayerConfig,
    deps: RelayerDeps<P>,
    registry: &prometheus::Registry,
    cancel: CancellationToken,
) -> anyhow::Result<Vec<JoinHandle<()>>>
where
    P: JsonRpcClient + 'static,
{
    config.validate()?;
    let metrics = Arc::new(RelayerMetrics::new(registry));
    let evm_clients = deps.evm_clients.clone();
    let ctx = Arc::new(build_context(config, &deps, metrics.clone(), cancel.clone()));

    let (event_tx, mut event_rx) = mpsc::channel(ctx.config.channel_size);
    let mut handles = Vec::new();

    // One listener task per EVM chain
    for client in evm_clients.into_values() {
        let listener = EvmListener::new(
            client,
            ctx.config.cosmos_chain_ids(),
            ctx.config.run_mode,
        )
        .with_metrics(metrics.clone());
        handles.push(tokio::spawn(listener.run(event_tx.clone(), cancel.clone())));
    }

    // Hub event subscriptions
    let hub_listener = HubListener::new(
        ctx.config.hub.chain_id.clone(),
        ctx.config.hub.ws_url.clone(),
    )
    .with_metrics(metrics.clone());
    handles.push(tokio::spawn(hub_listener.run(event_tx.clone(), cancel.clone())));
    drop(event_tx);

    // Consumer: every event is handled in its own detached task so that a
    // suspended pipeline step (finality waits, batch polls) never blocks
    // delivery of subsequent events on the stream.
    let consumer_ctx = ctx.clone();
    let consumer_cancel = cancel.clone();
    handles.push(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = consumer_cancel.cancelled() => break,
                maybe_event = event_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            let ctx = consumer_ctx.clone();
                            tokio::spawn(pipeline::dispatch_event(ctx, event));
                        }
                        None => break,
                    }
                }
            }
        }
        info!("event consumer stopped");
    }));

    // Periodic reconciliation of stalled transfers
    let engine = ReconcileEngine::new(ctx.clone());
    handles.push(tokio::spawn(engine.run(cancel.clone())));

    info!("relayer started ({} tasks)", handles.len());
    Ok(handles)
}
