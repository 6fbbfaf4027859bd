// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! FHEVM client runtime.
//!
//! This module provides functionality for:
//! - Relayer SDK bootstrap, at most once per process
//! - Mock instances against a local Hardhat FHEVM node
//! - Cancellable construction of the encryption instance per session
//! - Cached, wallet-signed user decryption authorizations

pub mod instance;
pub mod mock;
pub mod sdk;
pub mod session;
pub mod signature;

pub use instance::{
    ClearValue, EncryptedInputBuilder, EncryptedInputBundle, EncryptionInstance,
    HandleContractPair, Keypair, PlaintextValue, UserDecryptAuthorization,
};
pub use mock::{MockInstanceBuilder, MockInstanceConfig, MockInstanceFactory, RelayerMetadata};
pub use sdk::{InstanceConfig, NetworkParam, RelayerNetworkDefaults, RelayerSdk, SdkProvider, SdkRuntime};
pub use session::{FhevmSessionManager, FhevmStatus, InstanceSlot, SlotState};
pub use signature::DecryptionSignature;
