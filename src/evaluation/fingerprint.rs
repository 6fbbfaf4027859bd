// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session fingerprints and staleness detection.
//!
//! Every flow captures the fingerprint of the session it started in and
//! compares it with the tracker after each suspension point. A mismatch means
//! the active chain, signer or contract changed underneath the flow and its
//! result must be discarded.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::watch;

/// Identity of an active (chain, signer, contract) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionFingerprint {
    pub chain_id: u64,
    pub signer: Address,
    pub contract: Address,
}

impl SessionFingerprint {
    pub fn new(chain_id: u64, signer: Address, contract: Address) -> Self {
        Self {
            chain_id,
            signer,
            contract,
        }
    }

    /// Is this still the session the tracker considers active?
    pub fn is_current(&self, tracker: &SessionTracker) -> bool {
        tracker.current().as_ref() == Some(self)
    }
}

impl fmt::Display for SessionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.chain_id, self.signer, self.contract)
    }
}

/// Shared view of the active session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    current: Arc<watch::Sender<Option<SessionFingerprint>>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current: Arc::new(current),
        }
    }

    /// Switch the active session. Flows started under another fingerprint go stale.
    pub fn set(&self, fingerprint: SessionFingerprint) {
        let previous = self.current.send_replace(Some(fingerprint));
        if previous != Some(fingerprint) {
            tracing::debug!(session = %fingerprint, "Active session changed");
        }
    }

    /// No active session (wallet disconnected or contract not deployed).
    pub fn clear(&self) {
        self.current.send_replace(None);
    }

    pub fn current(&self) -> Option<SessionFingerprint> {
        *self.current.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionFingerprint>> {
        self.current.subscribe()
    }
}
