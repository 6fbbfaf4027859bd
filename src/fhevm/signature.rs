// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decryption signatures: time-bounded, wallet-signed user decrypt
//! authorizations, cached per (contract set, signer, chain).
//!
//! ## Storage Key
//!
//! ```text
//! fhevm-decsig:{chainId}:{lowercase signer}:{keccak256(sorted contract addresses)}
//! ```
//!
//! A cached entry is reused only when it was issued for exactly that
//! contract set, signer and chain, its window has not elapsed and its
//! signature still recovers to the signer. Anything else triggers a fresh
//! wallet prompt. Rewrites under the same key are idempotent, so concurrent
//! callers need no locking.

use alloy::primitives::{keccak256, Address, Bytes, Signature};
use serde::{Deserialize, Serialize};

use super::instance::EncryptionInstance;
use crate::blockchain::WalletSigner;
use crate::storage::GenericStringStorage;

/// Validity window of a fresh signature.
pub const DEFAULT_DURATION_DAYS: u64 = 365;

const SECONDS_PER_DAY: u64 = 86_400;

const STORAGE_KEY_PREFIX: &str = "fhevm-decsig";

/// Wallet-signed authorization for an ephemeral key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionSignature {
    pub public_key: Bytes,
    pub private_key: Bytes,
    /// 65-byte `r || s || v` signature over the EIP-712 digest.
    pub signature: Bytes,
    /// Sorted, de-duplicated.
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    /// Unix seconds.
    pub start_timestamp: u64,
    pub duration_days: u64,
    pub chain_id: u64,
}

impl DecryptionSignature {
    /// Unix second at which the window closes.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    /// Issued for exactly this (contract set, signer, chain)?
    pub fn authorizes(&self, contracts: &[Address], user: Address, chain_id: u64) -> bool {
        self.user_address == user
            && self.chain_id == chain_id
            && self.contract_addresses == normalize_contracts(contracts)
    }

    /// Does the stored signature recover to the user over the canonical message?
    pub fn verify(&self, instance: &dyn EncryptionInstance) -> bool {
        let Ok(signature) = Signature::from_raw(&self.signature) else {
            return false;
        };
        let digest = instance
            .create_eip712(
                &self.public_key,
                &self.contract_addresses,
                self.start_timestamp,
                self.duration_days,
            )
            .signing_hash();

        signature
            .recover_address_from_prehash(&digest)
            .is_ok_and(|recovered| recovered == self.user_address)
    }

    /// Cached signature if usable, else a freshly signed and persisted one.
    ///
    /// # Arguments
    /// * `instance` - Encryption instance of the active chain
    /// * `contract_addresses` - Contracts whose handles will be decrypted, any order
    /// * `signer` - Wallet of the user the signature is issued for
    /// * `storage` - Cache keyed by (contract set, signer, chain)
    ///
    /// # Returns
    /// `None` when the wallet declines or the result fails validation.
    /// Callers treat that as "authorization unavailable".
    pub async fn load_or_sign(
        instance: &dyn EncryptionInstance,
        contract_addresses: &[Address],
        signer: &dyn WalletSigner,
        storage: &dyn GenericStringStorage,
    ) -> Option<Self> {
        Self::load_or_sign_at(instance, contract_addresses, signer, storage, unix_now()).await
    }

    /// [`Self::load_or_sign`] with an explicit current time.
    pub async fn load_or_sign_at(
        instance: &dyn EncryptionInstance,
        contract_addresses: &[Address],
        signer: &dyn WalletSigner,
        storage: &dyn GenericStringStorage,
        now: u64,
    ) -> Option<Self> {
        let contracts = normalize_contracts(contract_addresses);
        if contracts.is_empty() {
            tracing::warn!("Decryption signature requested for an empty contract set");
            return None;
        }

        let user = signer.address();
        let chain_id = instance.chain_id();
        let key = storage_key(chain_id, user, &contracts);

        if let Some(cached) = Self::load_cached(storage, &key) {
            if cached.authorizes(&contracts, user, chain_id)
                && cached.is_valid_at(now)
                && cached.verify(instance)
            {
                tracing::debug!(%user, chain_id, "Reusing cached decryption signature");
                return Some(cached);
            }
            tracing::debug!(%user, chain_id, "Cached decryption signature unusable, re-signing");
        }

        let keypair = instance.generate_keypair();
        let digest = instance
            .create_eip712(&keypair.public_key, &contracts, now, DEFAULT_DURATION_DAYS)
            .signing_hash();

        let signature = match signer.sign_hash(&digest).await {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!(%user, error = %e, "Wallet declined decryption signature");
                return None;
            }
        };

        let fresh = Self {
            public_key: keypair.public_key,
            private_key: keypair.private_key,
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
            contract_addresses: contracts,
            user_address: user,
            start_timestamp: now,
            duration_days: DEFAULT_DURATION_DAYS,
            chain_id,
        };

        if !fresh.verify(instance) {
            tracing::warn!(%user, "Decryption signature does not recover to the signer");
            return None;
        }

        fresh.save(storage, &key);
        Some(fresh)
    }

    fn load_cached(storage: &dyn GenericStringStorage, key: &str) -> Option<Self> {
        let raw = match storage.get_item(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read cached decryption signature");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding corrupt cached decryption signature");
                None
            }
        }
    }

    // Persistence is best effort: the signature is still usable this session.
    fn save(&self, storage: &dyn GenericStringStorage, key: &str) {
        let result = serde_json::to_string(self)
            .map_err(crate::storage::StorageError::from)
            .and_then(|json| storage.set_item(key, &json));
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Failed to persist decryption signature");
        }
    }
}

/// Sorted, de-duplicated contract set.
pub fn normalize_contracts(contracts: &[Address]) -> Vec<Address> {
    let mut sorted = contracts.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Storage key for a (chain, signer, contract set) triple.
pub fn storage_key(chain_id: u64, user: Address, contracts: &[Address]) -> String {
    let mut packed = Vec::with_capacity(contracts.len() * 20);
    for contract in normalize_contracts(contracts) {
        packed.extend_from_slice(contract.as_slice());
    }
    format!("{STORAGE_KEY_PREFIX}:{chain_id}:{user:#x}:{:x}", keccak256(&packed))
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
