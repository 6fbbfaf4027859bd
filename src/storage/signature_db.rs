// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistent string storage backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `decryption_signatures`: storage key → serialized decryption signature

use std::path::Path;

use redb::{Database, ReadableDatabase, TableDefinition};

use super::{GenericStringStorage, StorageResult};

/// Storage key → JSON value.
const DECRYPTION_SIGNATURES: TableDefinition<&str, &str> =
    TableDefinition::new("decryption_signatures");

/// Embedded store for cached decryption signatures.
pub struct RedbStorage {
    db: Database,
}

impl RedbStorage {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DECRYPTION_SIGNATURES)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "Opened decryption signature store");
        Ok(Self { db })
    }
}

impl GenericStringStorage for RedbStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DECRYPTION_SIGNATURES)?;
        Ok(table.get(key)?.map(|value| value.value().to_string()))
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DECRYPTION_SIGNATURES)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DECRYPTION_SIGNATURES)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
