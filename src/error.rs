// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error type shared by the FHEVM session runtime.
//!
//! Only [`FhevmError::Network`], [`FhevmError::SdkInit`], [`FhevmError::Cancelled`]
//! and the production-path [`FhevmError::Validation`] ever reach callers of
//! instance construction. Malformed relayer metadata on the mock path and
//! declined wallet signatures are soft failures and never surface as errors.

use crate::storage::StorageError;

/// Errors that can occur while building or using an encrypted session.
#[derive(Debug, thiserror::Error)]
pub enum FhevmError {
    /// Chain or RPC endpoint unreachable, timed out or answered garbage.
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed address, metadata or configuration value.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The relayer SDK init entrypoint returned a falsy result.
    #[error("Relayer SDK initialization failed: {0}")]
    SdkInit(String),

    /// The relayer SDK failed while loading or creating an instance.
    #[error("Relayer SDK error: {0}")]
    Sdk(String),

    /// The construction was cancelled through its cancellation token.
    #[error("FHEVM operation was cancelled")]
    Cancelled,

    /// The wallet refused or failed to sign.
    #[error("Signing error: {0}")]
    Signing(String),

    /// A call to the evaluation contract failed.
    #[error("Contract error: {0}")]
    Contract(String),

    /// Persisted signature storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FhevmError {
    /// `true` for cancellations, which callers should ignore rather than display.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FhevmError::Cancelled)
    }

    pub fn network(message: impl Into<String>) -> Self {
        FhevmError::Network(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        FhevmError::Validation(message.into())
    }
}

pub type FhevmResult<T> = Result<T, FhevmError>;
