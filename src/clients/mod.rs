// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Chain and hub clients.

pub mod broadcast;
pub mod evm;
pub mod hub;
