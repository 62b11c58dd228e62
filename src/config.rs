// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Which deployment the relayer is pointed at. Devnet disables destination
/// filtering entirely; on mainnet the hub's own relayers execute batches, so
/// the gateway-execute leg is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Devnet,
    Testnet,
    Mainnet,
}

impl RunMode {
    pub fn is_permissive(&self) -> bool {
        matches!(self, RunMode::Devnet)
    }

    pub fn hub_executes_batches(&self) -> bool {
        matches!(self, RunMode::Mainnet)
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HubConfig {
    pub chain_id: String,
    // Websocket endpoint for event subscriptions.
    pub ws_url: String,
    // REST (LCD) endpoint used for state queries.
    pub lcd_url: String,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    // Chain id as registered on the hub (lowercased in config; legacy
    // capitalized ids are normalized when parsing connection ids).
    pub id: String,
    pub name: String,
    pub rpc_url: String,
    // The hub gateway contract on this chain.
    pub gateway: String,
    // The contract hub-origin calls to this chain are expected to target;
    // submissions claiming any other address are dropped.
    pub bridge_contract: String,
    // Confirmation buffer for validators on lagging RPC endpoints.
    pub finality_blocks: u64,
    // Chains that predate the `finalized` block tag are auto-detected, but
    // can be pinned to block counting here.
    #[serde(default = "default_native_finality")]
    pub native_finality: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

impl EvmChainConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && !self.rpc_url.is_empty()
            && !self.gateway.is_empty()
            && !self.bridge_contract.is_empty()
    }
}

fn default_native_finality() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    6
}

fn default_max_block_range() -> u64 {
    1000
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CosmosChainConfig {
    pub chain_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BroadcastConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl BroadcastConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconcileConfig {
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,
    // Inbound failures surface faster, so the window is shorter.
    #[serde(default = "default_inbound_stale_secs")]
    pub inbound_stale_secs: u64,
    #[serde(default = "default_outbound_stale_secs")]
    pub outbound_stale_secs: u64,
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_threshold(&self, direction: crate::types::Direction) -> chrono::Duration {
        let secs = match direction {
            crate::types::Direction::Inbound => self.inbound_stale_secs,
            crate::types::Direction::Outbound => self.outbound_stale_secs,
        };
        chrono::Duration::seconds(secs as i64)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval_secs(),
            inbound_stale_secs: default_inbound_stale_secs(),
            outbound_stale_secs: default_outbound_stale_secs(),
        }
    }
}

fn default_reconcile_interval_secs() -> u64 {
    180
}

fn default_inbound_stale_secs() -> u64 {
    30 * 60
}

fn default_outbound_stale_secs() -> u64 {
    90 * 60
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusServiceConfig {
    pub base_url: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub notify_users: Vec<String>,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    pub run_mode: RunMode,
    pub hub: HubConfig,
    pub evm_chains: Vec<EvmChainConfig>,
    pub cosmos_chains: Vec<CosmosChainConfig>,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    pub status_service: StatusServiceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    // Destination contracts to skip when executing on devnet, for testing.
    #[serde(default)]
    pub skip_contracts: Vec<String>,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
}

fn default_channel_size() -> usize {
    1024
}

impl RelayerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Drop invalid chain entries and reject configurations the relayer
    /// cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.evm_chains.is_empty() {
            return Err(anyhow!("no evm chains configured"));
        }
        for chain in &self.evm_chains {
            if !chain.is_valid() {
                return Err(anyhow!("{} config entry is invalid", chain.name));
            }
        }
        if self.cosmos_chains.is_empty() && !self.run_mode.is_permissive() {
            return Err(anyhow!("no accepted cosmos destination chains configured"));
        }
        Ok(())
    }

    pub fn cosmos_chain_ids(&self) -> Vec<String> {
        self.cosmos_chains
            .iter()
            .map(|c| c.chain_id.clone())
            .collect()
    }

    pub fn evm_chain(&self, id: &str) -> Option<&EvmChainConfig> {
        self.evm_chains
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(id))
    }

    pub fn skips_contract(&self, address: &str) -> bool {
        self.skip_contracts
            .iter()
            .any(|c| c.eq_ignore_ascii_case(address))
    }
}

/// Warn-and-drop filter for partially filled chain entries, applied before
/// validation when loading operator-maintained chain lists.
pub fn retain_valid_chains(chains: Vec<EvmChainConfig>) -> Vec<EvmChainConfig> {
    chains
        .into_iter()
        .filter(|chain| {
            let valid = chain.is_valid();
            if !valid {
                warn!("{} config entry is invalid, dropping", chain.name);
            }
            valid
        })
        .collect()
}
