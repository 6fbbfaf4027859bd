// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process LRU string storage.
//!
//! Default backing store for decryption signatures when nothing needs to
//! survive a restart.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use super::{GenericStringStorage, StorageError, StorageResult};

/// Default number of entries kept in memory.
const DEFAULT_CAPACITY: usize = 256;

/// Bounded in-memory key-value store.
pub struct InMemoryStorage {
    entries: Mutex<LruCache<String, String>>,
}

impl InMemoryStorage {
    /// Create a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl GenericStringStorage for InMemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.put(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.pop(key);
        Ok(())
    }
}
