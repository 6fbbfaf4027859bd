// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC client for chain identity queries and development-node probes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::provider::Eip1193Provider;
use crate::error::{FhevmError, FhevmResult};

/// Read-only HTTP JSON-RPC client.
///
/// Doubles as the minimal request shim handed to the mock instance when no
/// wallet provider is available.
pub struct RpcClient {
    /// RPC endpoint URL
    url: Url,
    /// Per-request timeout
    timeout: Duration,
    /// Alloy HTTP provider
    provider: DynProvider,
}

impl RpcClient {
    /// Create a client for the given endpoint. No connection is made yet.
    pub fn new(url: Url, timeout: Duration) -> Self {
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        Self {
            url,
            timeout,
            provider,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send an arbitrary (possibly non-standard) method.
    pub async fn raw(&self, method: &str, params: Value) -> FhevmResult<Value> {
        let params = match params {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        };
        self.timed(
            method,
            self.provider
                .raw_request::<_, Value>(method.to_owned().into(), params),
        )
        .await
    }

    async fn timed<T, E: Display>(
        &self,
        method: &str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> FhevmResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FhevmError::network(format!(
                "{method} failed on {}: {e}",
                self.url
            ))),
            Err(_) => Err(FhevmError::network(format!(
                "{method} timed out after {}s on {}",
                self.timeout.as_secs(),
                self.url
            ))),
        }
    }
}

#[async_trait]
impl Eip1193Provider for RpcClient {
    async fn request(&self, method: &str, params: Value) -> FhevmResult<Value> {
        self.raw(method, params).await
    }
}
