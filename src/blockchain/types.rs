// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FhevmError, FhevmResult};

/// EVM network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Default RPC endpoint URL
    pub rpc_url: &'static str,
}

/// Local Hardhat development node with the FHEVM plugin.
pub const HARDHAT_LOCAL: NetworkConfig = NetworkConfig {
    name: "Hardhat",
    chain_id: 31337,
    rpc_url: "http://localhost:8545",
};

/// Sepolia testnet, the public network served by the production relayer.
pub const SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Sepolia",
    chain_id: 11155111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
};

/// Encrypted handle: 32-byte reference to an on-chain ciphertext.
pub type EncryptedHandle = B256;

/// Reserved handle value meaning "no ciphertext".
pub const ZERO_HANDLE: EncryptedHandle = B256::ZERO;

/// `true` when the handle references an actual ciphertext.
pub fn is_decryptable(handle: &EncryptedHandle) -> bool {
    *handle != ZERO_HANDLE
}

/// Chain id → RPC URL of chains served by a local mock node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockChains(BTreeMap<u64, Url>);

impl MockChains {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{31337: http://localhost:8545}`.
    pub fn local_default() -> Self {
        let mut chains = Self::new();
        if let Ok(url) = Url::parse(HARDHAT_LOCAL.rpc_url) {
            chains.insert(HARDHAT_LOCAL.chain_id, url);
        }
        chains
    }

    pub fn with(mut self, chain_id: u64, rpc_url: Url) -> Self {
        self.insert(chain_id, rpc_url);
        self
    }

    pub fn insert(&mut self, chain_id: u64, rpc_url: Url) {
        self.0.insert(chain_id, rpc_url);
    }

    /// Add every entry of `other`, replacing URLs of chains already listed.
    pub fn extend(&mut self, other: MockChains) {
        self.0.extend(other.0);
    }

    pub fn get(&self, chain_id: u64) -> Option<&Url> {
        self.0.get(&chain_id)
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.0.contains_key(&chain_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Parse `chainId=url` pairs separated by commas.
    pub fn parse_list(raw: &str) -> FhevmResult<Self> {
        let mut chains = Self::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, url) = pair.split_once('=').ok_or_else(|| {
                FhevmError::validation(format!("Expected `chainId=url`, got `{pair}`"))
            })?;
            let chain_id = id
                .trim()
                .parse::<u64>()
                .map_err(|e| FhevmError::validation(format!("Invalid chain id `{id}`: {e}")))?;
            let url = Url::parse(url.trim())
                .map_err(|e| FhevmError::validation(format!("Invalid RPC URL `{url}`: {e}")))?;
            chains.insert(chain_id, url);
        }
        Ok(chains)
    }
}

/// One deployment of the evaluation contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_name: Option<String>,
}

/// Evaluation contract addresses keyed by chain id.
///
/// Matches the generated addresses file: `{"31337": {"address": "0x..", "chainName": "hardhat"}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deployments(BTreeMap<String, Deployment>);

impl Deployments {
    pub fn from_json(raw: &str) -> FhevmResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| FhevmError::validation(format!("Invalid deployments file: {e}")))
    }

    pub fn load(path: &Path) -> FhevmResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FhevmError::validation(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn insert(&mut self, chain_id: u64, deployment: Deployment) {
        self.0.insert(chain_id.to_string(), deployment);
    }

    /// Deployed contract on `chain_id`; the zero address counts as not deployed.
    pub fn address_for(&self, chain_id: u64) -> Option<Address> {
        self.0
            .get(&chain_id.to_string())
            .map(|d| d.address)
            .filter(|address| !address.is_zero())
    }
}

/// Parse a `0x`-prefixed 20-byte address.
pub fn parse_address(raw: &str) -> FhevmResult<Address> {
    if !raw.starts_with("0x") {
        return Err(FhevmError::validation(format!("Invalid address: {raw}")));
    }
    Address::from_str(raw).map_err(|_| FhevmError::validation(format!("Invalid address: {raw}")))
}
