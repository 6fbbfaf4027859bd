// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signature Storage Module
//!
//! Key-value string storage for cached decryption signatures.
//!
//! ## Backends
//!
//! - [`InMemoryStorage`]: bounded LRU, lost on restart
//! - [`RedbStorage`]: embedded redb database under `DATA_DIR`
//!
//! Writes are idempotent re-derivations keyed by (contract set, signer,
//! chain), so concurrent writers need no coordination beyond what each
//! backend already provides.

pub mod memory;
pub mod signature_db;

pub use memory::InMemoryStorage;
pub use signature_db::RedbStorage;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// String key-value storage addressed by derived keys.
pub trait GenericStringStorage: Send + Sync {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}
