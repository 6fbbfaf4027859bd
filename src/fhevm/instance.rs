// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encryption instance capability.
//!
//! An instance is bound to one chain configuration. It builds encrypted
//! input bundles for a (contract, user) pair and performs user decryption
//! authorized by a [`DecryptionSignature`].

use std::collections::HashMap;

use alloy::{
    primitives::{Address, Bytes, B256, U256},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::{Eip712Domain, SolStruct},
};
use async_trait::async_trait;

use super::signature::DecryptionSignature;
use crate::blockchain::EncryptedHandle;
use crate::error::{FhevmError, FhevmResult};

/// EIP-712 domain name of user decryption requests.
pub const DECRYPTION_DOMAIN_NAME: &str = "Decryption";

/// EIP-712 domain version of user decryption requests.
pub const DECRYPTION_DOMAIN_VERSION: &str = "1";

// The struct name is part of the EIP-712 type hash and must not change.
sol! {
    #[derive(Debug)]
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationDays;
        bytes extraData;
    }
}

/// Typed plaintext fed into an encrypted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaintextValue {
    U32(u32),
    U16(u16),
    Bool(bool),
}

/// One ciphertext bundle: a handle per added value plus a single proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInputBundle {
    pub handles: Vec<EncryptedHandle>,
    pub input_proof: Bytes,
}

/// Decrypted plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearValue {
    Bool(bool),
    Uint(U256),
}

impl ClearValue {
    /// Boolean view: integers are true when non-zero.
    pub fn as_bool(&self) -> bool {
        match self {
            ClearValue::Bool(value) => *value,
            ClearValue::Uint(value) => !value.is_zero(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ClearValue::Bool(value) => Some(u64::from(*value)),
            ClearValue::Uint(value) => u64::try_from(*value).ok(),
        }
    }
}

/// A handle and the contract it was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleContractPair {
    pub handle: EncryptedHandle,
    pub contract_address: Address,
}

/// Ephemeral key pair used to re-encrypt decryption results for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypair {
    pub public_key: Bytes,
    pub private_key: Bytes,
}

/// EIP-712 typed data the wallet signs to authorize user decryption.
#[derive(Debug, Clone)]
pub struct UserDecryptAuthorization {
    pub domain: Eip712Domain,
    pub message: UserDecryptRequestVerification,
}

impl UserDecryptAuthorization {
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }
}

#[async_trait]
pub trait EncryptionInstance: Send + Sync {
    /// Chain the instance is bound to.
    fn chain_id(&self) -> u64;

    /// Chain id of the gateway verifying decryption requests.
    fn gateway_chain_id(&self) -> u64 {
        self.chain_id()
    }

    /// Contract that verifies user decryption signatures.
    fn verifying_contract_decryption(&self) -> Address;

    /// `true` for instances backed by a local development node.
    fn is_mock(&self) -> bool {
        false
    }

    /// Fresh ephemeral key pair (secp256k1 by default).
    fn generate_keypair(&self) -> Keypair {
        let signer = PrivateKeySigner::random();
        let key: &k256::ecdsa::SigningKey = signer.credential();
        Keypair {
            public_key: Bytes::copy_from_slice(
                key.verifying_key().to_encoded_point(false).as_bytes(),
            ),
            private_key: Bytes::copy_from_slice(&key.to_bytes()),
        }
    }

    fn eip712_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(DECRYPTION_DOMAIN_NAME.into()),
            Some(DECRYPTION_DOMAIN_VERSION.into()),
            Some(U256::from(self.gateway_chain_id())),
            Some(self.verifying_contract_decryption()),
            None,
        )
    }

    /// Canonical authorization message for a contract set and validity window.
    fn create_eip712(
        &self,
        public_key: &Bytes,
        contract_addresses: &[Address],
        start_timestamp: u64,
        duration_days: u64,
    ) -> UserDecryptAuthorization {
        UserDecryptAuthorization {
            domain: self.eip712_domain(),
            message: UserDecryptRequestVerification {
                publicKey: public_key.clone(),
                contractAddresses: contract_addresses.to_vec(),
                startTimestamp: U256::from(start_timestamp),
                durationDays: U256::from(duration_days),
                extraData: Bytes::new(),
            },
        }
    }

    /// Encrypt `values` for `contract`, callable by `user`.
    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[PlaintextValue],
    ) -> FhevmResult<EncryptedInputBundle>;

    /// Decrypt all `handles` in one authorized request.
    async fn user_decrypt(
        &self,
        handles: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> FhevmResult<HashMap<EncryptedHandle, ClearValue>>;
}

/// Collects typed values into a single encrypted input.
pub struct EncryptedInputBuilder<'a> {
    instance: &'a dyn EncryptionInstance,
    contract: Address,
    user: Address,
    values: Vec<PlaintextValue>,
}

impl<'a> EncryptedInputBuilder<'a> {
    pub fn new(instance: &'a dyn EncryptionInstance, contract: Address, user: Address) -> Self {
        Self {
            instance,
            contract,
            user,
            values: Vec::new(),
        }
    }

    pub fn add_u32(&mut self, value: u32) -> &mut Self {
        self.values.push(PlaintextValue::U32(value));
        self
    }

    pub fn add_u16(&mut self, value: u16) -> &mut Self {
        self.values.push(PlaintextValue::U16(value));
        self
    }

    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.values.push(PlaintextValue::Bool(value));
        self
    }

    pub fn values(&self) -> &[PlaintextValue] {
        &self.values
    }

    /// Encrypt every added value into one bundle with one proof.
    pub async fn encrypt(self) -> FhevmResult<EncryptedInputBundle> {
        if self.values.is_empty() {
            return Err(FhevmError::validation("Encrypted input has no values"));
        }

        let bundle = self
            .instance
            .encrypt(self.contract, self.user, &self.values)
            .await?;

        if bundle.handles.len() != self.values.len() {
            return Err(FhevmError::Sdk(format!(
                "Expected {} handles, got {}",
                self.values.len(),
                bundle.handles.len()
            )));
        }
        Ok(bundle)
    }
}
