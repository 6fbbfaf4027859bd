// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Encrypted Session Manager
//!
//! Builds the encryption instance for one (provider, chain) session.
//!
//! ## Status sequence
//!
//! Production path: `sdk-loading → sdk-loaded → sdk-initializing →
//! sdk-initialized → creating`, skipping the load pair when the SDK is already
//! installed and the init pair when it is already initialized.
//!
//! Mock path: `creating` only. SDK bootstrap state is never touched.
//!
//! ## Cancellation
//!
//! Every asynchronous step is raced against the caller's
//! [`CancellationToken`] and the token is checked before and after it. A
//! cancelled construction fails with [`FhevmError::Cancelled`] and never
//! returns a partial instance. The manager does not de-duplicate separate
//! invocations; [`InstanceSlot`] implements cancel-and-rebuild on top.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::instance::EncryptionInstance;
use super::mock::MockInstanceFactory;
use super::sdk::{InstanceConfig, NetworkParam, SdkRuntime};
use crate::blockchain::{parse_address, ChainEndpoint, ChainResolver, MockChains, SEPOLIA};
use crate::error::{FhevmError, FhevmResult};

/// Construction progress reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FhevmStatus {
    SdkLoading,
    SdkLoaded,
    SdkInitializing,
    SdkInitialized,
    Creating,
}

impl FhevmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FhevmStatus::SdkLoading => "sdk-loading",
            FhevmStatus::SdkLoaded => "sdk-loaded",
            FhevmStatus::SdkInitializing => "sdk-initializing",
            FhevmStatus::SdkInitialized => "sdk-initialized",
            FhevmStatus::Creating => "creating",
        }
    }
}

impl fmt::Display for FhevmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run one asynchronous step under the cancellation token.
async fn checkpoint<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = FhevmResult<T>>,
) -> FhevmResult<T> {
    if cancel.is_cancelled() {
        return Err(FhevmError::Cancelled);
    }
    let value = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FhevmError::Cancelled),
        result = step => result?,
    };
    if cancel.is_cancelled() {
        return Err(FhevmError::Cancelled);
    }
    Ok(value)
}

/// Orchestrates chain resolution, the mock pipeline and SDK bootstrap.
pub struct FhevmSessionManager {
    runtime: Arc<SdkRuntime>,
    resolver: ChainResolver,
    mock_factory: MockInstanceFactory,
    public_chain_id: u64,
    public_rpc_override: Option<Url>,
    sdk_init_options: Option<Value>,
}

impl FhevmSessionManager {
    pub fn new(
        runtime: Arc<SdkRuntime>,
        resolver: ChainResolver,
        mock_factory: MockInstanceFactory,
    ) -> Self {
        Self {
            runtime,
            resolver,
            mock_factory,
            public_chain_id: SEPOLIA.chain_id,
            public_rpc_override: None,
            sdk_init_options: None,
        }
    }

    /// RPC URL handed to the SDK instead of an injected provider on the public network.
    pub fn with_public_rpc_override(mut self, url: Option<Url>) -> Self {
        self.public_rpc_override = url;
        self
    }

    pub fn with_sdk_init_options(mut self, options: Option<Value>) -> Self {
        self.sdk_init_options = options;
        self
    }

    pub fn runtime(&self) -> &Arc<SdkRuntime> {
        &self.runtime
    }

    /// Build the encryption instance for `endpoint`.
    ///
    /// Mock chains with a Hardhat node and valid relayer metadata get a mock
    /// instance and emit only `creating`. Everything else goes through the
    /// relayer SDK, emitting the `sdk-*` events for steps not yet done.
    ///
    /// # Arguments
    /// * `endpoint` - Wallet provider object or bare RPC URL
    /// * `mock_chains` - Chain ids served by local development nodes
    /// * `cancel` - Checked before and after every asynchronous step
    /// * `on_status` - Receives each status transition in order
    ///
    /// # Errors
    /// `FhevmError::Cancelled` once `cancel` fires; no partial instance is
    /// ever returned.
    pub async fn create_instance<F>(
        &self,
        endpoint: &ChainEndpoint,
        mock_chains: &MockChains,
        cancel: &CancellationToken,
        mut on_status: F,
    ) -> FhevmResult<Arc<dyn EncryptionInstance>>
    where
        F: FnMut(FhevmStatus) + Send,
    {
        let resolved = checkpoint(cancel, self.resolver.resolve(endpoint, mock_chains)).await?;

        if resolved.is_mock {
            if let Some(rpc_url) = resolved.rpc_url.as_ref() {
                let metadata =
                    checkpoint(cancel, self.mock_factory.try_fetch_relayer_metadata(rpc_url))
                        .await?;

                if let Some(metadata) = metadata {
                    on_status(FhevmStatus::Creating);
                    let instance = checkpoint(
                        cancel,
                        self.mock_factory.create_instance(
                            rpc_url,
                            resolved.chain_id,
                            &metadata,
                            endpoint.provider(),
                        ),
                    )
                    .await?;
                    tracing::info!(chain_id = resolved.chain_id, "Mock FHEVM instance ready");
                    return Ok(instance);
                }

                tracing::info!(
                    chain_id = resolved.chain_id,
                    %rpc_url,
                    "No FHEVM relayer metadata on mock chain, using production relayer"
                );
            }
        }

        if cancel.is_cancelled() {
            return Err(FhevmError::Cancelled);
        }

        let sdk = match self.runtime.sdk() {
            Some(sdk) => sdk,
            None => {
                on_status(FhevmStatus::SdkLoading);
                let sdk = checkpoint(cancel, self.runtime.load()).await?;
                on_status(FhevmStatus::SdkLoaded);
                sdk
            }
        };

        if !self.runtime.is_initialized() {
            on_status(FhevmStatus::SdkInitializing);
            checkpoint(
                cancel,
                self.runtime.init_sdk(self.sdk_init_options.as_ref()),
            )
            .await?;
            on_status(FhevmStatus::SdkInitialized);
        }

        let defaults = sdk.default_network();
        parse_address(&defaults.acl_contract_address)?;

        if cancel.is_cancelled() {
            return Err(FhevmError::Cancelled);
        }

        let network = self.network_param(endpoint, resolved.chain_id);
        tracing::info!(
            chain_id = resolved.chain_id,
            network = ?network,
            "Creating FHEVM instance via relayer SDK"
        );

        on_status(FhevmStatus::Creating);
        let instance = checkpoint(cancel, sdk.create_instance(InstanceConfig { defaults, network }))
            .await?;
        tracing::info!(chain_id = resolved.chain_id, "FHEVM instance ready");
        Ok(instance)
    }

    /// The SDK cannot introspect an injected provider and would fall back to a
    /// local default endpoint, so the public network gets the override URL.
    fn network_param(&self, endpoint: &ChainEndpoint, chain_id: u64) -> NetworkParam {
        match (endpoint, &self.public_rpc_override) {
            (ChainEndpoint::Provider(_), Some(url)) if chain_id == self.public_chain_id => {
                NetworkParam::Url(url.clone())
            }
            (ChainEndpoint::Provider(provider), _) => NetworkParam::Provider(provider.clone()),
            (ChainEndpoint::Url(url), _) => NetworkParam::Url(url.clone()),
        }
    }
}

/// Observable state of an [`InstanceSlot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Building(Option<FhevmStatus>),
    Ready,
    Error(String),
}

struct Build {
    generation: u64,
    token: CancellationToken,
}

/// Holds the active instance and cancels superseded constructions.
///
/// Call [`InstanceSlot::rebuild`] on every change of active chain, provider
/// or target contract.
pub struct InstanceSlot {
    manager: Arc<FhevmSessionManager>,
    mock_chains: MockChains,
    generation: AtomicU64,
    current: Mutex<Option<Build>>,
    instance: RwLock<Option<Arc<dyn EncryptionInstance>>>,
    state: watch::Sender<SlotState>,
}

impl InstanceSlot {
    pub fn new(manager: Arc<FhevmSessionManager>, mock_chains: MockChains) -> Self {
        let (state, _) = watch::channel(SlotState::Idle);
        Self {
            manager,
            mock_chains,
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            instance: RwLock::new(None),
            state,
        }
    }

    pub fn instance(&self) -> Option<Arc<dyn EncryptionInstance>> {
        self.instance
            .read()
            .ok()
            .and_then(|instance| instance.clone())
    }

    pub fn state(&self) -> SlotState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SlotState> {
        self.state.subscribe()
    }

    /// Cancel any in-flight construction and drop the current instance.
    pub fn reset(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(build) = current.take() {
                build.token.cancel();
            }
        }
        if let Ok(mut instance) = self.instance.write() {
            *instance = None;
        }
        self.state.send_replace(SlotState::Idle);
    }

    /// Cancel the previous construction, then build for `endpoint`.
    ///
    /// Returns `Ok(None)` when this construction was itself superseded.
    pub async fn rebuild(
        &self,
        endpoint: ChainEndpoint,
    ) -> FhevmResult<Option<Arc<dyn EncryptionInstance>>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(Build {
                generation,
                token: token.clone(),
            }) {
                previous.token.cancel();
            }
        }
        if let Ok(mut instance) = self.instance.write() {
            *instance = None;
        }
        self.state.send_replace(SlotState::Building(None));

        let result = self
            .manager
            .create_instance(&endpoint, &self.mock_chains, &token, |status| {
                if !token.is_cancelled() {
                    self.state.send_replace(SlotState::Building(Some(status)));
                }
            })
            .await;

        let Ok(current) = self.current.lock() else {
            return Err(FhevmError::Cancelled);
        };
        let still_current = current
            .as_ref()
            .is_some_and(|build| build.generation == generation && !build.token.is_cancelled());

        match result {
            Ok(instance) if still_current => {
                if let Ok(mut slot) = self.instance.write() {
                    *slot = Some(instance.clone());
                }
                self.state.send_replace(SlotState::Ready);
                Ok(Some(instance))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_cancelled() => Ok(None),
            Err(e) => {
                if still_current {
                    self.state.send_replace(SlotState::Error(e.to_string()));
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use crate::fhevm::mock::RELAYER_METADATA_METHOD;
    use crate::test_support::{
        valid_metadata, FakeConnector, FakeMockBuilder, FakeNode, FakeSdk, FakeSdkProvider,
    };

    struct Harness {
        node: Arc<FakeNode>,
        sdk: Arc<FakeSdk>,
        sdk_provider: Arc<FakeSdkProvider>,
        mock_builder: Arc<FakeMockBuilder>,
        manager: Arc<FhevmSessionManager>,
    }

    fn harness(node: Arc<FakeNode>, sdk: Arc<FakeSdk>) -> Harness {
        let sdk_provider = FakeSdkProvider::new(sdk.clone());
        let mock_builder = FakeMockBuilder::new();
        let connector = FakeConnector::single(node.clone());
        let manager = FhevmSessionManager::new(
            Arc::new(SdkRuntime::new(sdk_provider.clone())),
            ChainResolver::new(connector.clone()),
            MockInstanceFactory::new(connector, mock_builder.clone()),
        );
        Harness {
            node,
            sdk,
            sdk_provider,
            mock_builder,
            manager: Arc::new(manager),
        }
    }

    fn mocks() -> MockChains {
        MockChains::new().with(31337, Url::parse("http://localhost:8545").unwrap())
    }

    fn recorder() -> (Arc<StdMutex<Vec<FhevmStatus>>>, impl FnMut(FhevmStatus) + Send) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |status| sink.lock().unwrap().push(status))
    }

    const FULL_SEQUENCE: [FhevmStatus; 5] = [
        FhevmStatus::SdkLoading,
        FhevmStatus::SdkLoaded,
        FhevmStatus::SdkInitializing,
        FhevmStatus::SdkInitialized,
        FhevmStatus::Creating,
    ];

    #[test]
    fn status_strings() {
        let names: Vec<_> = FULL_SEQUENCE.iter().map(FhevmStatus::as_str).collect();
        assert_eq!(
            names,
            [
                "sdk-loading",
                "sdk-loaded",
                "sdk-initializing",
                "sdk-initialized",
                "creating"
            ]
        );
    }

    #[tokio::test]
    async fn hardhat_node_with_metadata_builds_mock_instance() {
        let node = FakeNode::new(31337, "HardhatNetwork/2.22.0/@nomicfoundation/edr/0.6.4")
            .with_metadata(valid_metadata(Some(31337)));
        let h = harness(node.clone(), FakeSdk::new());
        let (seen, on_status) = recorder();

        let instance = h
            .manager
            .create_instance(
                &ChainEndpoint::Url(Url::parse("http://localhost:8545").unwrap()),
                &mocks(),
                &CancellationToken::new(),
                on_status,
            )
            .await
            .unwrap();

        assert!(instance.is_mock());
        assert_eq!(instance.chain_id(), 31337);
        assert_eq!(*seen.lock().unwrap(), vec![FhevmStatus::Creating]);
        assert_eq!(h.sdk_provider.fetch_count(), 0);
        assert!(!h.manager.runtime().is_loaded());
        assert_eq!(h.mock_builder.request_providers().len(), 1);
    }

    #[tokio::test]
    async fn non_hardhat_client_falls_through_to_production() {
        let node = FakeNode::new(31337, "anvil/v0.2.0").with_metadata(valid_metadata(Some(31337)));
        let h = harness(node, FakeSdk::new());
        let (seen, on_status) = recorder();

        let instance = h
            .manager
            .create_instance(
                &ChainEndpoint::Url(Url::parse("http://localhost:8545").unwrap()),
                &mocks(),
                &CancellationToken::new(),
                on_status,
            )
            .await
            .unwrap();

        assert!(!instance.is_mock());
        assert_eq!(*seen.lock().unwrap(), FULL_SEQUENCE.to_vec());
        assert_eq!(h.node.calls(RELAYER_METADATA_METHOD), 0);
        assert_eq!(h.sdk.default_network_reads(), 1);
        assert_eq!(h.sdk.created_configs().len(), 1);
        assert!(h.mock_builder.request_providers().is_empty());
    }

    #[tokio::test]
    async fn second_production_build_skips_bootstrap_events() {
        let h = harness(FakeNode::hardhat(11155111), FakeSdk::new());
        let endpoint = ChainEndpoint::Provider(h.node.clone());

        let (first, on_first) = recorder();
        h.manager
            .create_instance(&endpoint, &mocks(), &CancellationToken::new(), on_first)
            .await
            .unwrap();
        let (second, on_second) = recorder();
        h.manager
            .create_instance(&endpoint, &mocks(), &CancellationToken::new(), on_second)
            .await
            .unwrap();

        assert_eq!(*first.lock().unwrap(), FULL_SEQUENCE.to_vec());
        assert_eq!(*second.lock().unwrap(), vec![FhevmStatus::Creating]);
        assert_eq!(h.sdk_provider.fetch_count(), 1);
        assert_eq!(h.sdk.init_count(), 1);
    }

    #[tokio::test]
    async fn invalid_default_acl_address_is_fatal() {
        let h = harness(FakeNode::hardhat(11155111), FakeSdk::new().with_acl("not-an-address"));
        let (seen, on_status) = recorder();

        let err = h
            .manager
            .create_instance(
                &ChainEndpoint::Provider(h.node.clone()),
                &mocks(),
                &CancellationToken::new(),
                on_status,
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(err, FhevmError::Validation(_)));
        assert!(!seen.lock().unwrap().contains(&FhevmStatus::Creating));
        assert!(h.sdk.created_configs().is_empty());
    }

    #[tokio::test]
    async fn falsy_sdk_init_is_fatal() {
        let h = harness(FakeNode::hardhat(11155111), FakeSdk::new().failing_init());

        let err = h
            .manager
            .create_instance(
                &ChainEndpoint::Provider(h.node.clone()),
                &mocks(),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(err, FhevmError::SdkInit(_)));
    }

    #[tokio::test]
    async fn public_network_provider_is_replaced_by_override_url() {
        let override_url = Url::parse("https://sepolia.example/rpc").unwrap();
        let h = harness(FakeNode::hardhat(11155111), FakeSdk::new());
        let manager = FhevmSessionManager::new(
            h.manager.runtime().clone(),
            ChainResolver::new(FakeConnector::single(h.node.clone())),
            MockInstanceFactory::new(FakeConnector::single(h.node.clone()), h.mock_builder.clone()),
        )
        .with_public_rpc_override(Some(override_url.clone()));

        manager
            .create_instance(
                &ChainEndpoint::Provider(h.node.clone()),
                &mocks(),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();

        let configs = h.sdk.created_configs();
        assert!(matches!(&configs[0].network, NetworkParam::Url(url) if *url == override_url));
    }

    #[tokio::test]
    async fn other_chains_keep_the_provider() {
        let h = harness(FakeNode::hardhat(8009), FakeSdk::new());
        let manager = FhevmSessionManager::new(
            h.manager.runtime().clone(),
            ChainResolver::new(FakeConnector::single(h.node.clone())),
            MockInstanceFactory::new(FakeConnector::single(h.node.clone()), h.mock_builder.clone()),
        )
        .with_public_rpc_override(Some(Url::parse("https://sepolia.example/rpc").unwrap()));

        manager
            .create_instance(
                &ChainEndpoint::Provider(h.node.clone()),
                &mocks(),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();

        assert!(matches!(
            h.sdk.created_configs()[0].network,
            NetworkParam::Provider(_)
        ));
    }

    #[tokio::test]
    async fn cancel_during_sdk_load_never_emits_creating() {
        let sdk = FakeSdk::new();
        let node = FakeNode::hardhat(11155111);
        let sdk_provider = FakeSdkProvider::new(sdk.clone()).with_delay(Duration::from_secs(30));
        let connector = FakeConnector::single(node.clone());
        let manager = FhevmSessionManager::new(
            Arc::new(SdkRuntime::new(sdk_provider)),
            ChainResolver::new(connector.clone()),
            MockInstanceFactory::new(connector, FakeMockBuilder::new()),
        );

        let token = CancellationToken::new();
        let canceller = token.clone();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();

        let err = manager
            .create_instance(
                &ChainEndpoint::Provider(node),
                &mocks(),
                &token,
                move |status| {
                    sink.lock().unwrap().push(status);
                    if status == FhevmStatus::SdkLoading {
                        canceller.cancel();
                    }
                },
            )
            .await
            .err()
            .unwrap();

        assert!(err.is_cancelled());
        assert_eq!(*seen.lock().unwrap(), vec![FhevmStatus::SdkLoading]);
        assert!(sdk.created_configs().is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_token_fails_immediately() {
        let h = harness(FakeNode::hardhat(31337), FakeSdk::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = h
            .manager
            .create_instance(&ChainEndpoint::Provider(h.node.clone()), &mocks(), &token, |_| {})
            .await
            .err()
            .unwrap();

        assert!(err.is_cancelled());
        assert_eq!(h.node.calls("eth_chainId"), 0);
    }

    #[tokio::test]
    async fn slot_rebuild_supersedes_in_flight_construction() {
        let sdk = FakeSdk::new();
        let node = FakeNode::hardhat(11155111);
        let slow = FakeSdkProvider::new(sdk.clone()).with_delay(Duration::from_millis(200));
        let connector = FakeConnector::single(node.clone());
        let manager = Arc::new(FhevmSessionManager::new(
            Arc::new(SdkRuntime::new(slow)),
            ChainResolver::new(connector.clone()),
            MockInstanceFactory::new(connector, FakeMockBuilder::new()),
        ));
        let slot = Arc::new(InstanceSlot::new(manager, mocks()));

        let first = {
            let slot = slot.clone();
            let endpoint = ChainEndpoint::Provider(node.clone());
            tokio::spawn(async move { slot.rebuild(endpoint).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = slot.rebuild(ChainEndpoint::Provider(node)).await.unwrap();

        assert!(first.await.unwrap().unwrap().is_none());
        assert!(second.is_some());
        assert!(slot.instance().is_some());
        assert_eq!(slot.state(), SlotState::Ready);
    }

    #[tokio::test]
    async fn slot_reset_clears_instance() {
        let h = harness(FakeNode::hardhat(11155111), FakeSdk::new());
        let slot = InstanceSlot::new(h.manager.clone(), mocks());

        slot.rebuild(ChainEndpoint::Provider(h.node.clone()))
            .await
            .unwrap();
        assert!(slot.instance().is_some());

        slot.reset();
        assert!(slot.instance().is_none());
        assert_eq!(slot.state(), SlotState::Idle);
    }

    #[tokio::test]
    async fn cancel_during_mock_metadata_fetch_never_emits_creating() {
        let node = FakeNode::hardhat(31337);
        let h = harness(node.clone(), FakeSdk::new());
        let token = CancellationToken::new();
        let canceller = token.clone();
        node.on_request(RELAYER_METADATA_METHOD, move || canceller.cancel());
        let (seen, on_status) = recorder();

        let err = h
            .manager
            .create_instance(
                &ChainEndpoint::Url(Url::parse("http://localhost:8545").unwrap()),
                &mocks(),
                &token,
                on_status,
            )
            .await
            .err()
            .unwrap();

        assert!(err.is_cancelled());
        assert!(seen.lock().unwrap().is_empty());
        assert!(h.mock_builder.configs().is_empty());
        assert_eq!(h.sdk_provider.fetch_count(), 0);
    }
}
