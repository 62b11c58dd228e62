// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Source-chain finality checking.

mod checker;
mod evm;

pub use checker::{FinalityChecker, FinalityError, FinalityResult};
pub use evm::{is_finalized_tag_unsupported, EvmFinalityChecker, FinalityMode};
