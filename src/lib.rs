// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FHEVM Evaluation Client - encrypted evaluation records on an FHEVM chain
//!
//! This crate bootstraps the encryption capability for an FHEVM-enabled
//! chain, choosing between a local Hardhat mock backend and the production
//! relayer SDK, and drives the encrypted submit, check and decrypt flows of
//! the evaluation contract.
//!
//! ## Modules
//!
//! - `blockchain` - Chain resolution, RPC transport, contract bindings
//! - `fhevm` - SDK bootstrap, instance construction, decryption signatures
//! - `evaluation` - Single-flight, staleness-guarded user flows
//! - `storage` - Persisted decryption signature cache (redb / LRU)

pub mod blockchain;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod fhevm;
pub mod logging;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;
