// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the client. Configuration is loaded from the environment at
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RPC_URL` | JSON-RPC endpoint of the target chain | `http://localhost:8545` |
//! | `USE_LOCAL_MOCK` | Add `31337=http://localhost:8545` to the mock chain table | `false` |
//! | `MOCK_CHAINS` | Extra mock chains, `chainId=url,...` | Empty |
//! | `SEPOLIA_RPC_URL` | RPC URL handed to the relayer SDK on Sepolia | Optional |
//! | `DATA_DIR` | Directory of the decryption signature database | `./data` |
//! | `RPC_TIMEOUT_SECS` | Timeout of a single RPC request | `10` |
//! | `DEPLOYMENTS_PATH` | JSON file of evaluation contract deployments | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,fhevm_evaluation_client=debug` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::blockchain::{MockChains, HARDHAT_LOCAL};
use crate::error::{FhevmError, FhevmResult};

/// Environment variable name for the target chain RPC endpoint.
pub const RPC_URL_ENV: &str = "RPC_URL";

/// Environment variable name of the local Hardhat switch.
///
/// Unless set, or unless `MOCK_CHAINS` lists chains, every chain goes through
/// the production relayer SDK.
pub const USE_LOCAL_MOCK_ENV: &str = "USE_LOCAL_MOCK";

/// Environment variable name of extra mock chains, merged over the local
/// Hardhat entry.
pub const MOCK_CHAINS_ENV: &str = "MOCK_CHAINS";

/// Environment variable name of the public network RPC override.
///
/// The relayer SDK cannot introspect an injected wallet provider and falls
/// back to a generic local endpoint on Sepolia unless given a URL.
pub const SEPOLIA_RPC_URL_ENV: &str = "SEPOLIA_RPC_URL";

/// Environment variable name for the data directory path.
///
/// # Default
/// `./data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const DEFAULT_DATA_DIR: &str = "./data";

/// Environment variable name of the per-request RPC timeout, in seconds.
pub const RPC_TIMEOUT_SECS_ENV: &str = "RPC_TIMEOUT_SECS";

pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

/// Environment variable name of the deployments file.
pub const DEPLOYMENTS_PATH_ENV: &str = "DEPLOYMENTS_PATH";

/// Environment variable name of the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// File name of the signature database inside the data directory.
pub const SIGNATURE_DB_FILE: &str = "decryption_signatures.redb";

/// Client configuration resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub rpc_url: Url,
    pub mock_chains: MockChains,
    pub sepolia_rpc_url: Option<Url>,
    pub data_dir: PathBuf,
    pub rpc_timeout: Duration,
    pub deployments_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn from_env() -> FhevmResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FhevmResult<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let rpc_url = parse_url(
            RPC_URL_ENV,
            &var(RPC_URL_ENV).unwrap_or_else(|| HARDHAT_LOCAL.rpc_url.to_string()),
        )?;

        let use_local_mock = match var(USE_LOCAL_MOCK_ENV) {
            Some(raw) => parse_bool(USE_LOCAL_MOCK_ENV, &raw)?,
            None => false,
        };
        let mut mock_chains = if use_local_mock {
            MockChains::local_default()
        } else {
            MockChains::new()
        };
        if let Some(raw) = var(MOCK_CHAINS_ENV) {
            mock_chains.extend(MockChains::parse_list(&raw)?);
        }

        let sepolia_rpc_url = var(SEPOLIA_RPC_URL_ENV)
            .map(|raw| parse_url(SEPOLIA_RPC_URL_ENV, &raw))
            .transpose()?;

        let rpc_timeout_secs = match var(RPC_TIMEOUT_SECS_ENV) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                FhevmError::validation(format!("{RPC_TIMEOUT_SECS_ENV} must be a number, got {raw}"))
            })?,
            None => DEFAULT_RPC_TIMEOUT_SECS,
        };

        Ok(Self {
            rpc_url,
            mock_chains,
            sepolia_rpc_url,
            data_dir: PathBuf::from(var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            deployments_path: var(DEPLOYMENTS_PATH_ENV).map(PathBuf::from),
        })
    }

    pub fn signature_db_path(&self) -> PathBuf {
        self.data_dir.join(SIGNATURE_DB_FILE)
    }
}

fn parse_url(name: &str, raw: &str) -> FhevmResult<Url> {
    Url::parse(raw.trim()).map_err(|e| FhevmError::validation(format!("{name} is not a URL: {e}")))
}

fn parse_bool(name: &str, raw: &str) -> FhevmResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(FhevmError::validation(format!(
            "{name} must be true or false, got {raw}"
        ))),
    }
}
