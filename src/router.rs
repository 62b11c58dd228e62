// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Direction router: filters canonical events by configured chain pairs and
//! resolves the destination-chain client for each. Filtering is a set of
//! early-return guards; a missing client is a configuration gap and drops
//! the event, it is not a retryable error.

use crate::clients::evm::EvmClient;
use crate::config::RunMode;
use crate::events::{CanonicalEvent, EventKind};
use crate::metrics::RelayerMetrics;
use ethers::providers::JsonRpcClient;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where the router decided an event should go.
pub enum Routed<P: JsonRpcClient> {
    /// EVM -> hub call event; the source-chain client is attached for the
    /// finality wait.
    Inbound { source: Arc<EvmClient<P>> },
    /// Hub -> EVM submission; the destination-chain client is attached.
    Outbound { destination: Arc<EvmClient<P>> },
    /// Gateway approval on an EVM chain; the client of the chain the event
    /// was observed on is attached for the execute leg.
    Approved { destination: Arc<EvmClient<P>> },
    /// Hub-side completion of an inbound transfer.
    Completed,
    /// IBC delivery notice; informational.
    PacketDelivered,
    Dropped,
}

pub struct DirectionRouter<P: JsonRpcClient> {
    /// Static registry of execution clients, keyed by lowercase chain id.
    evm_clients: HashMap<String, Arc<EvmClient<P>>>,
    cosmos_chain_ids: Vec<String>,
    /// Expected destination contract per chain for hub->EVM submissions.
    expected_contracts: HashMap<String, String>,
    run_mode: RunMode,
    metrics: Option<Arc<RelayerMetrics>>,
}

impl<P> DirectionRouter<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(
        evm_clients: HashMap<String, Arc<EvmClient<P>>>,
        cosmos_chain_ids: Vec<String>,
        expected_contracts: HashMap<String, String>,
        run_mode: RunMode,
    ) -> Self {
        Self {
            evm_clients: evm_clients
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            cosmos_chain_ids,
            expected_contracts: expected_contracts
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
                .collect(),
            run_mode,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn client(&self, chain: &str) -> Option<Arc<EvmClient<P>>> {
        self.evm_clients.get(&chain.to_lowercase()).cloned()
    }

    fn is_cosmos_chain(&self, chain: &str) -> bool {
        self.cosmos_chain_ids
            .iter()
            .any(|c| c.eq_ignore_ascii_case(chain))
    }

    fn drop_event(&self, event: &CanonicalEvent, reason: &'static str) -> Routed<P> {
        debug!(
            "dropping {} from {}: {}",
            event.event_id(),
            event.chain,
            reason
        );
        if let Some(ref m) = self.metrics {
            m.events_dropped.with_label_values(&[reason]).inc();
        }
        Routed::Dropped
    }

    pub fn route(&self, event: &CanonicalEvent) -> Routed<P> {
        match event.kind {
            EventKind::ContractCall | EventKind::ContractCallWithToken => {
                // Destination must be a chain this relayer serves, to avoid
                // conflicting with relayers that serve EVM destinations.
                if !self.run_mode.is_permissive()
                    && !self.is_cosmos_chain(&event.destination_chain)
                {
                    return self.drop_event(event, "destination");
                }
                let Some(source) = self.client(&event.chain) else {
                    warn!(
                        "no client registered for source chain {}, dropping {}",
                        event.chain,
                        event.event_id()
                    );
                    return self.drop_event(event, "no_client");
                };
                Routed::Inbound { source }
            }

            EventKind::HubContractCall | EventKind::HubContractCallWithToken => {
                let destination_chain = event.destination_chain.to_lowercase();
                let Some(destination) = self.evm_clients.get(&destination_chain).cloned() else {
                    warn!(
                        "no client registered for destination chain {}, dropping {}",
                        event.destination_chain,
                        event.event_id()
                    );
                    return self.drop_event(event, "no_client");
                };
                // Reject spoofed or irrelevant destination contract claims.
                if !self.run_mode.is_permissive() {
                    let expected = self.expected_contracts.get(&destination_chain);
                    let claimed = event
                        .contract_address()
                        .map(|a| a.to_lowercase())
                        .unwrap_or_default();
                    if expected.map(|e| e != &claimed).unwrap_or(true) {
                        return self.drop_event(event, "contract_mismatch");
                    }
                }
                Routed::Outbound { destination }
            }

            EventKind::ContractCallApproved | EventKind::ContractCallApprovedWithMint => {
                // Only approvals for calls that originated on the hub side
                if !self.run_mode.is_permissive() && !self.is_cosmos_chain(&event.source_chain) {
                    return self.drop_event(event, "source");
                }
                let Some(destination) = self.client(&event.chain) else {
                    warn!(
                        "no client registered for chain {}, dropping {}",
                        event.chain,
                        event.event_id()
                    );
                    return self.drop_event(event, "no_client");
                };
                Routed::Approved { destination }
            }

            EventKind::HubEventCompleted => Routed::Completed,
            EventKind::HubPacketDelivered => Routed::PacketDelivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BroadcastConfig, EvmChainConfig};
    use ethers::providers::{MockProvider, Provider};
    use ethers::signers::LocalWallet;
    use ethers::types::U256;
    use serde_json::{Map, Value};

    const BRIDGE_CONTRACT: &str = "0x9f3a2f1f2e8f0dd1e2a6b1e2c3d4e5f607182930";

    fn chain_config(id: &str) -> EvmChainConfig {
        EvmChainConfig {
            id: id.to_string(),
            name: id.to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            gateway: "0x4f4495243837681061c4743b74b3eedf548d56a5".to_string(),
            bridge_contract: BRIDGE_CONTRACT.to_string(),
            finality_blocks: 5,
            native_finality: true,
            poll_interval_secs: 6,
            max_block_range: 1000,
        }
    }

    async fn mock_evm_client(id: &str) -> Arc<EvmClient<MockProvider>> {
        let (provider, mock) = Provider::mocked();
        mock.push(U256::from(1u64)).unwrap();
        let wallet: LocalWallet =
            "0000000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap();
        Arc::new(
            EvmClient::new(chain_config(id), provider, wallet, &BroadcastConfig::default())
                .await
                .unwrap(),
        )
    }

    async fn router(run_mode: RunMode) -> DirectionRouter<MockProvider> {
        let mut clients = HashMap::new();
        clients.insert("avalanche".to_string(), mock_evm_client("avalanche").await);
        let mut contracts = HashMap::new();
        contracts.insert("avalanche".to_string(), BRIDGE_CONTRACT.to_string());
        DirectionRouter::new(
            clients,
            vec!["cosmoshub-1".to_string()],
            contracts,
            run_mode,
        )
    }

    fn event(kind: EventKind, chain: &str, source: &str, destination: &str) -> CanonicalEvent {
        CanonicalEvent {
            kind,
            chain: chain.to_string(),
            tx_hash: "0xabc".to_string(),
            log_index: 0,
            block_height: 1,
            source_chain: source.to_string(),
            destination_chain: destination.to_string(),
            args: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_inbound_call_accepted_for_cosmos_destination() {
        let router = router(RunMode::Testnet).await;
        let ev = event(EventKind::ContractCall, "avalanche", "avalanche", "cosmoshub-1");
        assert!(matches!(router.route(&ev), Routed::Inbound { .. }));
    }

    #[tokio::test]
    async fn test_inbound_call_dropped_for_foreign_destination() {
        let router = router(RunMode::Testnet).await;
        let ev = event(EventKind::ContractCall, "avalanche", "avalanche", "polygon");
        assert!(matches!(router.route(&ev), Routed::Dropped));
    }

    #[tokio::test]
    async fn test_outbound_requires_matching_contract() {
        let router = router(RunMode::Testnet).await;

        let mut ev = event(
            EventKind::HubContractCall,
            "hub",
            "cosmoshub-1",
            "avalanche",
        );
        ev.args.insert(
            "contract_address".into(),
            Value::String(BRIDGE_CONTRACT.to_string()),
        );
        assert!(matches!(router.route(&ev), Routed::Outbound { .. }));

        // Spoofed destination contract claim
        ev.args.insert(
            "contract_address".into(),
            Value::String("0x000000000000000000000000000000000000dead".to_string()),
        );
        assert!(matches!(router.route(&ev), Routed::Dropped));
    }

    #[tokio::test]
    async fn test_outbound_unknown_destination_is_config_gap() {
        let router = router(RunMode::Testnet).await;
        let mut ev = event(EventKind::HubContractCall, "hub", "cosmoshub-1", "fantom");
        ev.args.insert(
            "contract_address".into(),
            Value::String(BRIDGE_CONTRACT.to_string()),
        );
        assert!(matches!(router.route(&ev), Routed::Dropped));
    }

    #[tokio::test]
    async fn test_approved_filters_by_cosmos_source() {
        let router = router(RunMode::Testnet).await;

        let ev = event(
            EventKind::ContractCallApproved,
            "avalanche",
            "cosmoshub-1",
            "avalanche",
        );
        assert!(matches!(router.route(&ev), Routed::Approved { .. }));

        let ev = event(
            EventKind::ContractCallApproved,
            "avalanche",
            "polygon",
            "avalanche",
        );
        assert!(matches!(router.route(&ev), Routed::Dropped));
    }

    #[tokio::test]
    async fn test_devnet_is_permissive() {
        let router = router(RunMode::Devnet).await;
        let ev = event(EventKind::ContractCall, "avalanche", "avalanche", "anywhere");
        assert!(matches!(router.route(&ev), Routed::Inbound { .. }));

        // Contract mismatch also waved through on devnet
        let ev = event(EventKind::HubContractCall, "hub", "cosmoshub-1", "avalanche");
        assert!(matches!(router.route(&ev), Routed::Outbound { .. }));
    }
}
