// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EIP-1193 style request interface and chain endpoints.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::client::RpcClient;
use crate::error::{FhevmError, FhevmResult};

/// Anything that answers `request({ method, params })`: an injected wallet or
/// a plain JSON-RPC transport.
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> FhevmResult<Value>;
}

/// Where the session talks to the chain.
#[derive(Clone)]
pub enum ChainEndpoint {
    /// A wallet provider object (signing prompts go through it).
    Provider(Arc<dyn Eip1193Provider>),
    /// A bare JSON-RPC URL.
    Url(Url),
}

impl ChainEndpoint {
    pub fn url(&self) -> Option<&Url> {
        match self {
            ChainEndpoint::Url(url) => Some(url),
            ChainEndpoint::Provider(_) => None,
        }
    }

    pub fn provider(&self) -> Option<Arc<dyn Eip1193Provider>> {
        match self {
            ChainEndpoint::Provider(provider) => Some(provider.clone()),
            ChainEndpoint::Url(_) => None,
        }
    }
}

impl fmt::Debug for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEndpoint::Provider(_) => f.write_str("ChainEndpoint::Provider(..)"),
            ChainEndpoint::Url(url) => write!(f, "ChainEndpoint::Url({url})"),
        }
    }
}

/// Opens a request channel to a JSON-RPC URL.
pub trait RpcConnector: Send + Sync {
    fn connect(&self, url: &Url) -> FhevmResult<Arc<dyn Eip1193Provider>>;
}

/// Default connector: alloy HTTP transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl RpcConnector for HttpConnector {
    fn connect(&self, url: &Url) -> FhevmResult<Arc<dyn Eip1193Provider>> {
        Ok(Arc::new(RpcClient::new(url.clone(), self.timeout)))
    }
}

/// Parse an `eth_chainId` answer: hex quantity, decimal string or number.
pub fn parse_chain_id(value: &Value) -> FhevmResult<u64> {
    match value {
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse::<u64>(),
            };
            parsed.map_err(|e| FhevmError::network(format!("Invalid chain id `{s}`: {e}")))
        }
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| FhevmError::network(format!("Invalid chain id `{n}`"))),
        other => Err(FhevmError::network(format!(
            "Unexpected eth_chainId response: {other}"
        ))),
    }
}
