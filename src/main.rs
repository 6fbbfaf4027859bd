// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `fhevm-probe`: reports which FHEVM instance path `RPC_URL` would take.

use std::process::ExitCode;
use std::sync::Arc;

use serde_json::json;
use url::Url;

use fhevm_evaluation_client::blockchain::{ChainEndpoint, ChainResolver, Deployments, HttpConnector};
use fhevm_evaluation_client::config::ClientConfig;
use fhevm_evaluation_client::error::FhevmResult;
use fhevm_evaluation_client::fhevm::mock::probe_relayer_metadata;
use fhevm_evaluation_client::logging::{init_tracing, LogFormat};
use fhevm_evaluation_client::storage::RedbStorage;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(LogFormat::from_env());

    let result = tokio::select! {
        result = run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Probe failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> FhevmResult<()> {
    let config = ClientConfig::from_env()?;
    tracing::info!(
        rpc_url = %config.rpc_url,
        mock_chains = config.mock_chains.len(),
        timeout_secs = config.rpc_timeout.as_secs(),
        "Probing FHEVM endpoint"
    );

    let connector = Arc::new(HttpConnector::new(config.rpc_timeout));
    let resolver = ChainResolver::new(connector.clone()).with_timeout(config.rpc_timeout);
    let resolved = resolver
        .resolve(&ChainEndpoint::Url(config.rpc_url.clone()), &config.mock_chains)
        .await?;

    let metadata = match (&resolved.rpc_url, resolved.is_mock) {
        (Some(rpc_url), true) => probe_relayer_metadata(connector.as_ref(), rpc_url).await?,
        _ => None,
    };
    let instance_path = if metadata.is_some() { "mock" } else { "relayer" };

    let deployments = match &config.deployments_path {
        Some(path) => Deployments::load(path)?,
        None => Deployments::default(),
    };

    // Fails early when DATA_DIR is not writable.
    let signature_db = config.signature_db_path();
    RedbStorage::open(&signature_db)?;

    let report = json!({
        "chainId": resolved.chain_id,
        "rpcUrl": resolved.rpc_url.as_ref().map(Url::as_str),
        "isMock": resolved.is_mock,
        "instancePath": instance_path,
        "relayerMetadata": metadata,
        "evaluationContract": deployments.address_for(resolved.chain_id),
        "sepoliaRpcOverride": config.sepolia_rpc_url.as_ref().map(Url::as_str),
        "signatureStore": signature_db.display().to_string(),
    });
    println!("{report:#}");

    Ok(())
}
