// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet signing seam.
//!
//! Decryption authorizations are EIP-712 digests signed by the user's wallet.
//! Local keys sign through alloy's `PrivateKeySigner`; browser or hardware
//! wallets plug in by implementing [`WalletSigner`].

use alloy::{
    network::EthereumWallet,
    primitives::{Address, Signature, B256},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;

use crate::error::{FhevmError, FhevmResult};

/// A wallet able to sign prehashed messages for one account.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign a 32-byte digest. An error means the wallet declined or failed.
    async fn sign_hash(&self, hash: &B256) -> FhevmResult<Signature>;
}

#[async_trait]
impl WalletSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        alloy::signers::Signer::address(self)
    }

    async fn sign_hash(&self, hash: &B256) -> FhevmResult<Signature> {
        alloy::signers::Signer::sign_hash(self, hash)
            .await
            .map_err(|e| FhevmError::Signing(e.to_string()))
    }
}

/// Create a signer from a private key (hex string, `0x` prefix optional).
pub fn signer_from_hex(private_key_hex: &str) -> FhevmResult<PrivateKeySigner> {
    let key_bytes = alloy::hex::decode(private_key_hex.trim())
        .map_err(|e| FhevmError::validation(format!("Invalid private key: {e}")))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| FhevmError::validation(format!("Invalid private key: {e}")))
}

/// Wrap a signer into a transaction-filling wallet.
pub fn wallet_from_signer(signer: PrivateKeySigner) -> EthereumWallet {
    EthereumWallet::from(signer)
}
