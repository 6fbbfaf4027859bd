// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain integration.
//!
//! This module provides functionality for:
//! - Chain identity resolution against the mock chain table
//! - JSON-RPC transport and EIP-1193 style wallet providers
//! - Evaluation contract bindings
//! - Wallet signing of decryption authorizations

pub mod client;
pub mod contract;
pub mod provider;
pub mod resolver;
pub mod signing;
pub mod types;

pub use client::RpcClient;
pub use contract::{AlloyEvaluationContract, CheckCall, EvaluationContract, RecordHandles, TxOutcome};
pub use provider::{ChainEndpoint, Eip1193Provider, HttpConnector, RpcConnector};
pub use resolver::{ChainResolver, ResolvedChain};
pub use signing::WalletSigner;
pub use types::*;
