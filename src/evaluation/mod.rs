// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted evaluation flows: submit, refresh, check and decrypt.

pub mod fingerprint;
pub mod guard;
pub mod session;

pub use fingerprint::{SessionFingerprint, SessionTracker};
pub use guard::{Flight, FlightGuard};
pub use session::{
    CheckOutcome, CheckResult, CheckResults, ClearRecord, EvaluationInput, EvaluationSession,
    EvaluationState, Outcome, SkipReason,
};
