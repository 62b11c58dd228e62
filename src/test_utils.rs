// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Scriptable mock capabilities for unit tests.

use crate::alert::{AlertClass, Notifier};
use crate::clients::evm::EvmClient;
use crate::clients::hub::{
    BatchedCommands, GatewayEventStatus, HubBroadcaster, HubCommand, HubQuerier,
};
use crate::config::{
    BroadcastConfig, CosmosChainConfig, EvmChainConfig, HubConfig, ReconcileConfig, RelayerConfig,
    RunMode, StatusServiceConfig,
};
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayerMetrics;
use crate::node::{build_context, RelayerContext, RelayerDeps};
use crate::status::{RelayDetail, RelaySummary, StatusApi};
use crate::store::MemoryRelayStore;
use crate::types::{HubMessage, HubTxResponse, PendingCommand};
use async_trait::async_trait;
use ethers::providers::{MockProvider, Provider};
use ethers::signers::LocalWallet;
use ethers::types::U256;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

pub const TEST_BRIDGE_CONTRACT: &str = "0x9f3a2f1f2e8f0dd1e2a6b1e2c3d4e5f607182930";

#[derive(Default)]
pub struct MockBroadcaster {
    responses: Mutex<VecDeque<RelayResult<HubTxResponse>>>,
    calls: Mutex<Vec<Vec<HubCommand>>>,
}

impl MockBroadcaster {
    pub async fn push_response(&self, response: RelayResult<HubTxResponse>) {
        self.responses.lock().await.push_back(response);
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn calls(&self) -> Vec<Vec<HubCommand>> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl HubBroadcaster for MockBroadcaster {
    async fn sign_and_broadcast(&self, commands: Vec<HubCommand>) -> RelayResult<HubTxResponse> {
        self.calls.lock().await.push(commands);
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::Broadcast("no scripted response".to_string())))
    }
}

#[derive(Default)]
pub struct MockQuerier {
    messages: RwLock<HashMap<String, HubMessage>>,
    pending: RwLock<HashMap<String, Vec<PendingCommand>>>,
    batches: Mutex<VecDeque<BatchedCommands>>,
    batch_queries: Mutex<usize>,
    gateway_events: RwLock<HashMap<(String, String), GatewayEventStatus>>,
}

impl MockQuerier {
    pub async fn set_message(&self, message: HubMessage) {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), message);
    }

    pub async fn set_pending_commands(&self, chain: &str, commands: Vec<PendingCommand>) {
        self.pending
            .write()
            .await
            .insert(chain.to_string(), commands);
    }

    pub async fn push_batch(&self, batch: BatchedCommands) {
        self.batches.lock().await.push_back(batch);
    }

    pub async fn batch_queries(&self) -> usize {
        *self.batch_queries.lock().await
    }

    pub async fn set_gateway_event(&self, chain: &str, event_id: &str, status: GatewayEventStatus) {
        self.gateway_events
            .write()
            .await
            .insert((chain.to_string(), event_id.to_string()), status);
    }
}

#[async_trait]
impl HubQuerier for MockQuerier {
    async fn message(&self, id: &str) -> RelayResult<Option<HubMessage>> {
        Ok(self.messages.read().await.get(id).cloned())
    }

    async fn pending_commands(&self, chain: &str) -> RelayResult<Vec<PendingCommand>> {
        Ok(self
            .pending
            .read()
            .await
            .get(chain)
            .cloned()
            .unwrap_or_default())
    }

    async fn batched_commands(&self, _chain: &str, id: &str) -> RelayResult<BatchedCommands> {
        *self.batch_queries.lock().await += 1;
        self.batches
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| RelayError::HubRpc(format!("no scripted batch for {}", id)))
    }

    async fn gateway_event(
        &self,
        chain: &str,
        event_id: &str,
    ) -> RelayResult<Option<GatewayEventStatus>> {
        Ok(self
            .gateway_events
            .read()
            .await
            .get(&(chain.to_string(), event_id.to_string()))
            .copied())
    }
}

#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(AlertClass, String)>>,
}

impl MockNotifier {
    pub async fn sent(&self) -> Vec<(AlertClass, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, class: AlertClass, message: &str) -> RelayResult<()> {
        self.sent.lock().await.push((class, message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockStatusApi {
    relays: RwLock<Vec<RelaySummary>>,
    details: RwLock<HashMap<String, RelayDetail>>,
}

impl MockStatusApi {
    pub async fn set_relays(&self, relays: Vec<RelaySummary>) {
        *self.relays.write().await = relays;
    }

    pub async fn set_detail(&self, detail: RelayDetail) {
        self.details
            .write()
            .await
            .insert(detail.id.clone(), detail);
    }
}

#[async_trait]
impl StatusApi for MockStatusApi {
    async fn in_transit_relays(&self) -> RelayResult<Vec<RelaySummary>> {
        Ok(self.relays.read().await.clone())
    }

    async fn relay_detail(&self, id: &str) -> RelayResult<RelayDetail> {
        self.details
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::StatusApi(format!("no detail for {}", id)))
    }
}

pub struct TestHarness {
    pub ctx: Arc<RelayerContext<MockProvider>>,
    pub broadcaster: Arc<MockBroadcaster>,
    pub querier: Arc<MockQuerier>,
    pub notifier: Arc<MockNotifier>,
    pub status: Arc<MockStatusApi>,
    /// Handle for scripting provider responses of the "avalanche" client.
    pub evm_mock: MockProvider,
}

pub fn test_chain_config() -> EvmChainConfig {
    EvmChainConfig {
        id: "avalanche".to_string(),
        name: "Avalanche".to_string(),
        rpc_url: "http://localhost:8545".to_string(),
        gateway: "0x4f4495243837681061c4743b74b3eedf548d56a5".to_string(),
        bridge_contract: TEST_BRIDGE_CONTRACT.to_string(),
        finality_blocks: 5,
        // Block counting keeps finality scriptable with one mock response
        native_finality: false,
        poll_interval_secs: 1,
        max_block_range: 1000,
    }
}

fn test_config(run_mode: RunMode) -> RelayerConfig {
    RelayerConfig {
        run_mode,
        hub: HubConfig {
            chain_id: "hub-testnet-1".to_string(),
            ws_url: "ws://localhost:26657/websocket".to_string(),
            lcd_url: "http://localhost:1317".to_string(),
        },
        evm_chains: vec![test_chain_config()],
        cosmos_chains: vec![CosmosChainConfig {
            chain_id: "cosmoshub-1".to_string(),
        }],
        broadcast: BroadcastConfig {
            max_retries: 3,
            retry_delay_secs: 0,
        },
        reconcile: ReconcileConfig::default(),
        status_service: StatusServiceConfig {
            base_url: "http://localhost:4000".to_string(),
        },
        telegram: None,
        skip_contracts: vec![],
        channel_size: 64,
    }
}

pub async fn test_context() -> TestHarness {
    test_context_with_mode(RunMode::Testnet).await
}

pub async fn test_context_with_mode(run_mode: RunMode) -> TestHarness {
    let (provider, evm_mock) = Provider::mocked();
    evm_mock.push(U256::from(43114u64)).unwrap();
    let wallet: LocalWallet = "0000000000000000000000000000000000000000000000000000000000000001"
        .parse()
        .unwrap();
    let evm_client = Arc::new(
        EvmClient::new(
            test_chain_config(),
            provider,
            wallet,
            &BroadcastConfig::default(),
        )
        .await
        .unwrap(),
    );

    let broadcaster = Arc::new(MockBroadcaster::default());
    let querier = Arc::new(MockQuerier::default());
    let notifier = Arc::new(MockNotifier::default());
    let status = Arc::new(MockStatusApi::default());

    let mut evm_clients = HashMap::new();
    evm_clients.insert("avalanche".to_string(), evm_client);

    let deps = RelayerDeps {
        broadcaster: broadcaster.clone() as Arc<dyn HubBroadcaster>,
        querier: querier.clone() as Arc<dyn HubQuerier>,
        store: Arc::new(MemoryRelayStore::new()),
        notifier: notifier.clone() as Arc<dyn Notifier>,
        status: status.clone() as Arc<dyn StatusApi>,
        evm_clients,
    };

    let ctx = Arc::new(build_context(
        test_config(run_mode),
        &deps,
        Arc::new(RelayerMetrics::new_for_testing()),
        CancellationToken::new(),
    ));

    TestHarness {
        ctx,
        broadcaster,
        querier,
        notifier,
        status,
        evm_mock,
    }
}
