// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application root: owns the SDK runtime, the active instance slot and the
//! signature store for the lifetime of the process.

use std::sync::Arc;

use alloy::primitives::Address;

use crate::blockchain::{
    ChainEndpoint, ChainResolver, Deployments, EvaluationContract, RpcConnector, WalletSigner,
};
use crate::config::ClientConfig;
use crate::error::FhevmResult;
use crate::evaluation::{EvaluationSession, SessionTracker};
use crate::fhevm::{
    EncryptionInstance, FhevmSessionManager, InstanceSlot, MockInstanceBuilder,
    MockInstanceFactory, SdkProvider, SdkRuntime,
};
use crate::storage::GenericStringStorage;

#[derive(Clone)]
pub struct AppState {
    pub config: ClientConfig,
    pub runtime: Arc<SdkRuntime>,
    pub slot: Arc<InstanceSlot>,
    pub storage: Arc<dyn GenericStringStorage>,
    pub deployments: Arc<Deployments>,
    pub tracker: SessionTracker,
}

impl AppState {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn RpcConnector>,
        sdk_provider: Arc<dyn SdkProvider>,
        mock_builder: Arc<dyn MockInstanceBuilder>,
        storage: Arc<dyn GenericStringStorage>,
        deployments: Deployments,
    ) -> Self {
        let runtime = Arc::new(SdkRuntime::new(sdk_provider));
        let manager = FhevmSessionManager::new(
            runtime.clone(),
            ChainResolver::new(connector.clone()).with_timeout(config.rpc_timeout),
            MockInstanceFactory::new(connector, mock_builder),
        )
        .with_public_rpc_override(config.sepolia_rpc_url.clone());
        let slot = InstanceSlot::new(Arc::new(manager), config.mock_chains.clone());

        Self {
            config,
            runtime,
            slot: Arc::new(slot),
            storage,
            deployments: Arc::new(deployments),
            tracker: SessionTracker::new(),
        }
    }

    /// Rebuild the encryption instance after a chain or provider change.
    ///
    /// Flows of the previous session go stale immediately.
    pub async fn connect(
        &self,
        endpoint: ChainEndpoint,
    ) -> FhevmResult<Option<Arc<dyn EncryptionInstance>>> {
        self.tracker.clear();
        self.slot.rebuild(endpoint).await
    }

    /// Evaluation contract deployed on `chain_id`.
    pub fn contract_address(&self, chain_id: u64) -> Option<Address> {
        self.deployments.address_for(chain_id)
    }

    /// Open and activate an evaluation session on the current instance.
    ///
    /// `None` while no instance is ready.
    pub fn evaluation_session(
        &self,
        contract: Arc<dyn EvaluationContract>,
        signer: Arc<dyn WalletSigner>,
    ) -> Option<EvaluationSession> {
        let instance = self.slot.instance()?;
        let session = EvaluationSession::new(
            instance,
            contract,
            signer,
            self.storage.clone(),
            self.tracker.clone(),
        );
        session.activate();
        Some(session)
    }
}
