// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! EVM finality checker implementation

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::{Block, TxHash};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::checker::{FinalityChecker, FinalityError, FinalityResult};

/// How the finalized height is obtained.
///
/// Native mode asks the chain for its `finalized` block tag. Chains that
/// predate the tag answer with an invalid-params error; the checker then
/// demotes itself to block counting for the rest of its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityMode {
    Native,
    BlockCounting,
}

/// The provider error signature of a chain that does not support the
/// `finalized` block tag (pre-Merge EVM chains).
pub fn is_finalized_tag_unsupported(message: &str) -> bool {
    message.contains("invalid block tag finalized")
        || message.contains("unsupported block tag")
        || message.contains("-32602") // JSON-RPC invalid params error code
}

#[derive(Debug)]
struct FinalizedHeightCache {
    height: u64,
    cached_at: Instant,
}

/// EVM finality checker
#[derive(Debug)]
pub struct EvmFinalityChecker<P> {
    provider: Arc<Provider<P>>,
    chain_name: String,
    /// Blocks assumed sufficient when the chain has no native finality tag.
    finality_blocks: u64,
    /// Extra confirmations on top of the raw finalized height.
    buffer_blocks: u64,
    mode: RwLock<FinalityMode>,
    /// Cache for the finalized height to reduce RPC calls
    cache: RwLock<Option<FinalizedHeightCache>>,
    cache_duration: Duration,
}

impl<P> EvmFinalityChecker<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(
        provider: Arc<Provider<P>>,
        chain_name: impl Into<String>,
        finality_blocks: u64,
        buffer_blocks: u64,
    ) -> Self {
        Self {
            provider,
            chain_name: chain_name.into(),
            finality_blocks,
            buffer_blocks,
            mode: RwLock::new(FinalityMode::Native),
            cache: RwLock::new(None),
            cache_duration: Duration::from_secs(12),
        }
    }

    /// Skip the native tag entirely. Used for chains known not to support it
    /// and in tests.
    pub fn with_block_counting(self) -> Self {
        Self {
            mode: RwLock::new(FinalityMode::BlockCounting),
            ..self
        }
    }

    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    pub async fn mode(&self) -> FinalityMode {
        *self.mode.read().await
    }

    async fn cached_finalized_height(&self) -> Option<u64> {
        let cache = self.cache.read().await;
        if let Some(entry) = cache.as_ref() {
            if entry.cached_at.elapsed() < self.cache_duration {
                return Some(entry.height);
            }
        }
        None
    }

    async fn update_cache(&self, height: u64) {
        let mut cache = self.cache.write().await;
        *cache = Some(FinalizedHeightCache {
            height,
            cached_at: Instant::now(),
        });
    }

    /// Fetch the finalized height via the native `finalized` tag. An
    /// unsupported-tag error demotes the checker to block counting and
    /// returns the counted height instead; other errors propagate.
    async fn fetch_native_finalized(&self) -> FinalityResult<u64> {
        let result: Result<Option<Block<TxHash>>, _> = self
            .provider
            .request("eth_getBlockByNumber", ("finalized", false))
            .await;

        let block = match result {
            Ok(block) => block,
            Err(e) => {
                let msg = e.to_string();
                if is_finalized_tag_unsupported(&msg) {
                    warn!(
                        "[{}] Chain doesn't support finalized tag, falling back to block counting",
                        self.chain_name
                    );
                    *self.mode.write().await = FinalityMode::BlockCounting;
                    return self.fetch_counting_finalized().await;
                }
                return Err(FinalityError::Rpc(format!(
                    "Failed to get finalized block: {}",
                    msg
                )));
            }
        };

        let block = block.ok_or_else(|| {
            FinalityError::Provider("Provider failed to return finalized block".into())
        })?;
        let height = block
            .number
            .map(|n| n.as_u64())
            .ok_or_else(|| FinalityError::Provider("Finalized block has no number".into()))?;

        debug!("[{}] Native finalized height: {}", self.chain_name, height);
        Ok(height)
    }

    async fn fetch_counting_finalized(&self) -> FinalityResult<u64> {
        let latest = self.latest_height().await?;
        let finalized = latest.saturating_sub(self.finality_blocks);
        debug!(
            "[{}] Block counting finalized: latest={}, finality_blocks={}, finalized={}",
            self.chain_name, latest, self.finality_blocks, finalized
        );
        Ok(finalized)
    }
}

#[async_trait]
impl<P> FinalityChecker for EvmFinalityChecker<P>
where
    P: JsonRpcClient + 'static,
{
    async fn is_final(&self, block_height: u64) -> FinalityResult<bool> {
        let finalized = self.finalized_height().await?;
        // Allow some buffer for hub validators connected to lagging RPC nodes
        let target = block_height.saturating_add(self.buffer_blocks);
        let is_final = finalized >= target;
        debug!(
            "[{}] is_final check: block={}, finalized={}, buffer={}, result={}",
            self.chain_name, block_height, finalized, self.buffer_blocks, is_final
        );
        Ok(is_final)
    }

    async fn finalized_height(&self) -> FinalityResult<u64> {
        if let Some(cached) = self.cached_finalized_height().await {
            debug!(
                "[{}] Using cached finalized height: {}",
                self.chain_name, cached
            );
            return Ok(cached);
        }

        let mode = *self.mode.read().await;
        let height = match mode {
            FinalityMode::Native => self.fetch_native_finalized().await?,
            FinalityMode::BlockCounting => self.fetch_counting_finalized().await?,
        };

        self.update_cache(height).await;
        Ok(height)
    }

    async fn latest_height(&self) -> FinalityResult<u64> {
        let height = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| FinalityError::Rpc(format!("Failed to get latest block: {}", e)))?;
        Ok(height.as_u64())
    }

    fn buffer_blocks(&self) -> u64 {
        self.buffer_blocks
    }

    fn chain_name(&self) -> &str {
        &self.chain_name
    }
}
