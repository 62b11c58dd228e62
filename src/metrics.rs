// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

#[derive(Debug)]
pub struct RelayerMetrics {
    /// Canonical events emitted by the stream layer, by chain and kind.
    pub events_received: IntCounterVec,
    /// Events dropped before reaching the pipeline, by reason.
    pub events_dropped: IntCounterVec,
    pub relays_created: IntCounter,
    /// Hub broadcasts by outcome (ok / fire_and_forget / error / exhausted).
    pub broadcasts_total: IntCounterVec,
    pub broadcast_retries: IntCounter,
    /// Pipeline handler failures by error type.
    pub pipeline_failures: IntCounterVec,
    pub reconcile_passes: IntCounter,
    pub reconcile_failures: IntCounter,
    /// Stale relays found in the last reconcile pass.
    pub stale_relays: IntGauge,
    pub alerts_sent: IntCounterVec,
    pub alerts_snoozed: IntCounter,
}

impl RelayerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            events_received: register_int_counter_vec_with_registry!(
                "relayer_events_received",
                "Canonical events emitted by the event stream layer",
                &["chain", "kind"],
                registry,
            )
            .unwrap(),
            events_dropped: register_int_counter_vec_with_registry!(
                "relayer_events_dropped",
                "Events dropped before reaching the pipeline",
                &["reason"],
                registry,
            )
            .unwrap(),
            relays_created: register_int_counter_with_registry!(
                "relayer_relays_created",
                "Relay records created",
                registry,
            )
            .unwrap(),
            broadcasts_total: register_int_counter_vec_with_registry!(
                "relayer_broadcasts_total",
                "Hub broadcasts by outcome",
                &["result"],
                registry,
            )
            .unwrap(),
            broadcast_retries: register_int_counter_with_registry!(
                "relayer_broadcast_retries",
                "Hub broadcast retries due to sequence conflicts",
                registry,
            )
            .unwrap(),
            pipeline_failures: register_int_counter_vec_with_registry!(
                "relayer_pipeline_failures",
                "Pipeline handler failures by error type",
                &["error_type"],
                registry,
            )
            .unwrap(),
            reconcile_passes: register_int_counter_with_registry!(
                "relayer_reconcile_passes",
                "Completed reconciliation passes",
                registry,
            )
            .unwrap(),
            reconcile_failures: register_int_counter_with_registry!(
                "relayer_reconcile_failures",
                "Per-relay reconciliation failures",
                registry,
            )
            .unwrap(),
            stale_relays: register_int_gauge_with_registry!(
                "relayer_stale_relays",
                "Stale relays found in the last reconciliation pass",
                registry,
            )
            .unwrap(),
            alerts_sent: register_int_counter_vec_with_registry!(
                "relayer_alerts_sent",
                "Operator alerts sent, by class",
                &["class"],
                registry,
            )
            .unwrap(),
            alerts_snoozed: register_int_counter_with_registry!(
                "relayer_alerts_snoozed",
                "Operator alerts suppressed by the snooze window",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
