// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-flight guards for user-triggered actions.

use std::sync::atomic::{AtomicBool, Ordering};

/// Rejects re-entrant starts of an action while one is outstanding.
#[derive(Debug, Default)]
pub struct FlightGuard {
    active: AtomicBool,
}

impl FlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard. `None` while another flight holds it.
    pub fn try_acquire(&self) -> Option<Flight<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Flight { guard: self })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// An outstanding action. Releases its guard when dropped, including on
/// early return and error paths.
#[must_use = "the guard is released as soon as the flight is dropped"]
#[derive(Debug)]
pub struct Flight<'a> {
    guard: &'a FlightGuard,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.guard.active.store(false, Ordering::Release);
    }
}
