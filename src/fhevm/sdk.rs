// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relayer SDK bootstrap.
//!
//! The production relayer SDK is supplied lazily through an [`SdkProvider`].
//! [`SdkRuntime`] is the lifecycle-scoped handle owned by the application
//! root: it fetches the SDK at most once and runs its init entrypoint at most
//! once successfully. Nothing is ever torn down while the handle lives.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use super::instance::EncryptionInstance;
use crate::blockchain::Eip1193Provider;
use crate::error::{FhevmError, FhevmResult};

/// Network configuration bundled with the relayer SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerNetworkDefaults {
    pub acl_contract_address: String,
    pub kms_contract_address: String,
    pub input_verifier_contract_address: String,
    pub verifying_contract_address_decryption: String,
    pub verifying_contract_address_input_verification: String,
    pub chain_id: u64,
    pub gateway_chain_id: u64,
    pub relayer_url: String,
}

/// The `network` parameter handed to the SDK.
#[derive(Clone)]
pub enum NetworkParam {
    Provider(Arc<dyn Eip1193Provider>),
    Url(Url),
}

impl fmt::Debug for NetworkParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkParam::Provider(_) => f.write_str("NetworkParam::Provider(..)"),
            NetworkParam::Url(url) => write!(f, "NetworkParam::Url({url})"),
        }
    }
}

/// Production instance configuration: SDK defaults plus the network to use.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub defaults: RelayerNetworkDefaults,
    pub network: NetworkParam,
}

/// A loaded relayer SDK module.
#[async_trait]
pub trait RelayerSdk: Send + Sync {
    /// Init entrypoint. `Ok(false)` is a failed initialization.
    async fn init_sdk(&self, options: Option<&Value>) -> FhevmResult<bool>;

    /// Bundled default network configuration.
    fn default_network(&self) -> RelayerNetworkDefaults;

    async fn create_instance(
        &self,
        config: InstanceConfig,
    ) -> FhevmResult<Arc<dyn EncryptionInstance>>;
}

/// Source of the relayer SDK module, fetched on first use.
#[async_trait]
pub trait SdkProvider: Send + Sync {
    async fn fetch(&self) -> FhevmResult<Arc<dyn RelayerSdk>>;
}

/// Process-lifetime SDK state: `{loaded, initialized}`.
pub struct SdkRuntime {
    provider: Arc<dyn SdkProvider>,
    sdk: OnceCell<Arc<dyn RelayerSdk>>,
    initialized: OnceCell<()>,
}

impl SdkRuntime {
    pub fn new(provider: Arc<dyn SdkProvider>) -> Self {
        Self {
            provider,
            sdk: OnceCell::new(),
            initialized: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.sdk.initialized()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// The installed SDK, if loaded.
    pub fn sdk(&self) -> Option<Arc<dyn RelayerSdk>> {
        self.sdk.get().cloned()
    }

    /// Fetch and install the SDK unless already installed.
    ///
    /// Concurrent callers share a single fetch.
    pub async fn load(&self) -> FhevmResult<Arc<dyn RelayerSdk>> {
        self.sdk
            .get_or_try_init(|| async {
                tracing::info!("Fetching relayer SDK");
                self.provider.fetch().await
            })
            .await
            .cloned()
    }

    /// Run the SDK init entrypoint once.
    ///
    /// A falsy result is returned as [`FhevmError::SdkInit`] and is not
    /// retried here; a later explicit call tries again.
    pub async fn init_sdk(&self, options: Option<&Value>) -> FhevmResult<()> {
        let sdk = self
            .sdk()
            .ok_or_else(|| FhevmError::Sdk("relayer SDK is not loaded".to_string()))?;

        self.initialized
            .get_or_try_init(|| async {
                if sdk.init_sdk(options).await? {
                    tracing::info!("Relayer SDK initialized");
                    Ok(())
                } else {
                    Err(FhevmError::SdkInit("initSDK returned false".to_string()))
                }
            })
            .await
            .map(|_| ())
    }
}
