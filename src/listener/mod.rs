// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Event stream layer: per-chain subscribers that turn chain-native
//! notifications into canonical event records. Each subscriber owns one
//! long-lived task and self-reconnects on transport failure; it never
//! mutates relay records.

pub mod evm;
pub mod hub;
pub mod parse;

pub use evm::EvmListener;
pub use hub::{HubListener, HubTopic};
