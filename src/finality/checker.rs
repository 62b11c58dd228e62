// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Core finality checker trait and types

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Result type for finality operations
pub type FinalityResult<T> = Result<T, FinalityError>;

/// Errors that can occur during finality checking
#[derive(Debug, Error)]
pub enum FinalityError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for FinalityError {
    fn from(e: anyhow::Error) -> Self {
        FinalityError::Internal(e.to_string())
    }
}

/// Core trait for finality checking
///
/// Implementors provide chain-specific logic for determining when a block
/// height is beyond the reach of a reorg. The trait supports both:
/// - Native finality APIs (the `finalized` block tag)
/// - Block counting (`latest - finality_blocks`) for chains without one
#[async_trait]
pub trait FinalityChecker: Send + Sync + Debug {
    /// Whether the given block height is final, including the configured
    /// confirmation buffer on top of the chain-reported finalized height.
    async fn is_final(&self, block_height: u64) -> FinalityResult<bool>;

    /// Current finalized block height as reported by the chain (or derived
    /// by block counting), before the buffer is applied.
    async fn finalized_height(&self) -> FinalityResult<u64>;

    async fn latest_height(&self) -> FinalityResult<u64>;

    /// Extra blocks required beyond the raw finalized height. Tolerates hub
    /// validators reading from lagging RPC endpoints.
    fn buffer_blocks(&self) -> u64;

    /// Chain identifier for logging/metrics
    fn chain_name(&self) -> &str;
}
