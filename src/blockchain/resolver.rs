// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain identity resolution against the mock chain table.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::provider::{parse_chain_id, ChainEndpoint, RpcConnector};
use super::types::MockChains;
use crate::error::{FhevmError, FhevmResult};

/// Result of resolving an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    /// `true` when the chain id is listed in the mock table.
    pub is_mock: bool,
    pub chain_id: u64,
    /// Concrete RPC URL: the endpoint's own URL, or the mock table entry when
    /// the endpoint is a provider object on a mock chain.
    pub rpc_url: Option<Url>,
}

/// Chain identity queries give up after this long unless configured.
pub const DEFAULT_CHAIN_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Determines which chain an endpoint talks to.
#[derive(Clone)]
pub struct ChainResolver {
    connector: Arc<dyn RpcConnector>,
    timeout: Duration,
}

impl ChainResolver {
    pub fn new(connector: Arc<dyn RpcConnector>) -> Self {
        Self {
            connector,
            timeout: DEFAULT_CHAIN_QUERY_TIMEOUT,
        }
    }

    /// Bound the chain identity query. Applies to wallet providers too, which
    /// may never answer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query the chain id: `eth_chainId` through the provider object, or the
    /// network info of the URL.
    pub async fn chain_id(&self, endpoint: &ChainEndpoint) -> FhevmResult<u64> {
        let provider = match endpoint {
            ChainEndpoint::Provider(provider) => provider.clone(),
            ChainEndpoint::Url(url) => self.connector.connect(url)?,
        };
        let request = provider.request("eth_chainId", Value::Array(Vec::new()));
        let raw = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                FhevmError::network(format!(
                    "eth_chainId timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;
        parse_chain_id(&raw)
    }

    /// Resolve `endpoint` to its chain id and decide whether it is a mock chain.
    ///
    /// # Arguments
    /// * `endpoint` - Wallet provider object or bare RPC URL
    /// * `mock_chains` - Chain ids served by local development nodes
    ///
    /// # Returns
    /// The chain id, the mock flag and the concrete RPC URL. A URL supplied by
    /// the endpoint wins over the table entry.
    ///
    /// # Errors
    /// `FhevmError::Network` when the chain query fails or times out.
    pub async fn resolve(
        &self,
        endpoint: &ChainEndpoint,
        mock_chains: &MockChains,
    ) -> FhevmResult<ResolvedChain> {
        let chain_id = self.chain_id(endpoint).await?;
        let mut rpc_url = endpoint.url().cloned();

        let is_mock = match mock_chains.get(chain_id) {
            Some(table_url) => {
                if rpc_url.is_none() {
                    rpc_url = Some(table_url.clone());
                }
                true
            }
            None => false,
        };

        tracing::debug!(
            chain_id,
            is_mock,
            rpc_url = ?rpc_url.as_ref().map(Url::as_str),
            "Resolved chain endpoint"
        );

        Ok(ResolvedChain {
            is_mock,
            chain_id,
            rpc_url,
        })
    }
}
