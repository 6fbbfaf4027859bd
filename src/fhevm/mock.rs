// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Mock Instance Factory
//!
//! Builds a local mock encryption instance against a Hardhat development node
//! that runs the FHEVM plugin.
//!
//! ## Pipeline
//!
//! 1. `web3_clientVersion` must mention "hardhat" (case-insensitive),
//!    otherwise the mock path is abandoned without error.
//! 2. `fhevm_relayer_metadata` must return the ACL, InputVerifier and
//!    KMSVerifier addresses, each `0x`-prefixed and well-formed. Any failure
//!    abandons the mock path silently.
//! 3. The instance is built with the caller's wallet provider for request
//!    signing, or a read-only request shim over the RPC URL when there is no
//!    wallet provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use super::instance::EncryptionInstance;
use crate::blockchain::{parse_address, Eip1193Provider, RpcConnector};
use crate::error::{FhevmError, FhevmResult};
use alloy::primitives::Address;

/// Non-standard RPC method exposed by the FHEVM Hardhat plugin.
pub const RELAYER_METADATA_METHOD: &str = "fhevm_relayer_metadata";

/// Trust anchors of an FHEVM deployment on a development node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerMetadata {
    pub acl_address: Address,
    pub input_verifier_address: Address,
    pub kms_verifier_address: Address,
    pub chain_id: Option<u64>,
    pub gateway_chain_id: Option<u64>,
}

impl RelayerMetadata {
    /// Validate a raw `fhevm_relayer_metadata` answer. `None` on any defect.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let address = |field: &str| -> Option<Address> {
            let raw = object.get(field)?.as_str()?;
            parse_address(raw).ok()
        };

        Some(Self {
            acl_address: address("ACLAddress")?,
            input_verifier_address: address("InputVerifierAddress")?,
            kms_verifier_address: address("KMSVerifierAddress")?,
            chain_id: object.get("chainId").and_then(Value::as_u64),
            gateway_chain_id: object.get("gatewayChainId").and_then(Value::as_u64),
        })
    }
}

/// Configuration of a mock instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockInstanceConfig {
    pub acl_contract_address: Address,
    pub kms_contract_address: Address,
    pub input_verifier_contract_address: Address,
    pub verifying_contract_address_decryption: Address,
    pub verifying_contract_address_input_verification: Address,
    pub chain_id: u64,
    pub gateway_chain_id: u64,
}

impl MockInstanceConfig {
    /// Metadata chain ids win over the detected chain id.
    pub fn from_metadata(metadata: &RelayerMetadata, detected_chain_id: u64) -> Self {
        Self {
            acl_contract_address: metadata.acl_address,
            kms_contract_address: metadata.kms_verifier_address,
            input_verifier_contract_address: metadata.input_verifier_address,
            verifying_contract_address_decryption: metadata.kms_verifier_address,
            verifying_contract_address_input_verification: metadata.input_verifier_address,
            chain_id: metadata.chain_id.unwrap_or(detected_chain_id),
            gateway_chain_id: metadata.gateway_chain_id.unwrap_or(detected_chain_id),
        }
    }
}

/// Constructs the mock instance from its collaborators.
#[async_trait]
pub trait MockInstanceBuilder: Send + Sync {
    /// `request_provider` signs and sends requests; `readonly` serves reads.
    async fn create(
        &self,
        request_provider: Arc<dyn Eip1193Provider>,
        readonly: Arc<dyn Eip1193Provider>,
        config: MockInstanceConfig,
    ) -> FhevmResult<Arc<dyn EncryptionInstance>>;
}

/// Three-stage mock pipeline against a suspected development node.
#[derive(Clone)]
pub struct MockInstanceFactory {
    connector: Arc<dyn RpcConnector>,
    builder: Arc<dyn MockInstanceBuilder>,
}

impl MockInstanceFactory {
    pub fn new(connector: Arc<dyn RpcConnector>, builder: Arc<dyn MockInstanceBuilder>) -> Self {
        Self { connector, builder }
    }

    /// Stages 1 and 2. `Ok(None)` means "not an FHEVM Hardhat node".
    pub async fn try_fetch_relayer_metadata(
        &self,
        rpc_url: &Url,
    ) -> FhevmResult<Option<RelayerMetadata>> {
        probe_relayer_metadata(self.connector.as_ref(), rpc_url).await
    }

    /// Stage 3.
    pub async fn create_instance(
        &self,
        rpc_url: &Url,
        chain_id: u64,
        metadata: &RelayerMetadata,
        wallet_provider: Option<Arc<dyn Eip1193Provider>>,
    ) -> FhevmResult<Arc<dyn EncryptionInstance>> {
        let readonly = self.connector.connect(rpc_url)?;
        let request_provider = wallet_provider.unwrap_or_else(|| readonly.clone());
        let config = MockInstanceConfig::from_metadata(metadata, chain_id);

        tracing::info!(
            chain_id = config.chain_id,
            gateway_chain_id = config.gateway_chain_id,
            acl = %config.acl_contract_address,
            "Creating mock FHEVM instance"
        );
        self.builder.create(request_provider, readonly, config).await
    }
}

/// Ask a suspected development node for its FHEVM relayer metadata.
///
/// Only an unreachable node is an error. A non-Hardhat client, a failing
/// metadata query or a malformed answer all yield `Ok(None)`.
pub async fn probe_relayer_metadata(
    connector: &dyn RpcConnector,
    rpc_url: &Url,
) -> FhevmResult<Option<RelayerMetadata>> {
    let rpc = connector.connect(rpc_url)?;

    let version = rpc
        .request("web3_clientVersion", json!([]))
        .await
        .map_err(|e| {
            FhevmError::network(format!(
                "The URL {rpc_url} is not a Web3 node or is not reachable: {e}"
            ))
        })?;

    let is_hardhat = version
        .as_str()
        .is_some_and(|v| v.to_lowercase().contains("hardhat"));
    if !is_hardhat {
        tracing::debug!(%rpc_url, client = %version, "Not a Hardhat node, skipping mock path");
        return Ok(None);
    }

    let raw = match rpc.request(RELAYER_METADATA_METHOD, json!([])).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(%rpc_url, error = %e, "Relayer metadata query failed");
            return Ok(None);
        }
    };

    let metadata = RelayerMetadata::from_value(&raw);
    if metadata.is_none() {
        tracing::debug!(%rpc_url, metadata = %raw, "Relayer metadata rejected");
    }
    Ok(metadata)
}
