// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Evaluation Session
//!
//! Drives the user-facing flows against one (instance, contract, signer)
//! session:
//!
//! | Action | Guard | Stale result |
//! |--------|-------|--------------|
//! | `refresh_record` | refreshing | dropped |
//! | `decrypt_record` | decrypting, refuses during refresh | dropped |
//! | `submit_record` | transacting, refuses during refresh | dropped |
//! | `check_eligibility` / `check_average` | transacting | dropped |
//! | `decrypt_check_results` | decrypting | dropped |
//!
//! Actions that do not run return [`Outcome::Skipped`] with the reason.
//! Contract and SDK failures are returned as errors after the status message
//! is updated. The status message mirrors what a UI would display.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, Bytes};

use super::fingerprint::{SessionFingerprint, SessionTracker};
use super::guard::FlightGuard;
use crate::blockchain::{
    is_decryptable, CheckCall, EncryptedHandle, EvaluationContract, RecordHandles, TxOutcome,
    WalletSigner,
};
use crate::error::{FhevmError, FhevmResult};
use crate::fhevm::{
    ClearValue, DecryptionSignature, EncryptedInputBuilder, EncryptionInstance, HandleContractPair,
};
use crate::storage::GenericStringStorage;

/// Result of a user-triggered action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Skipped(reason) => Some(*reason),
        }
    }
}

/// Why an action did not apply a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The same action, or one it conflicts with, is in flight.
    Busy,
    /// Prerequisite state (a loaded record) is missing.
    NotReady,
    /// The session changed while the action was suspended.
    Stale,
    /// The wallet declined or the decryption signature failed validation.
    AuthorizationUnavailable,
    /// The user has no record on chain.
    NoRecord,
    /// Every handle is the zero sentinel.
    NothingToDecrypt,
}

/// Plaintext record fields to encrypt and upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationInput {
    pub score: u32,
    pub contribution: u32,
    pub grade: u16,
    pub passed: bool,
    /// Off-chain document identifier, stored in clear.
    pub cid: String,
}

/// Decrypted record. `None` where the handle was the zero sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearRecord {
    pub score: Option<ClearValue>,
    pub contribution: Option<ClearValue>,
    pub grade: Option<ClearValue>,
    pub passed: Option<ClearValue>,
}

/// Encrypted boolean returned by a check, and its plaintext once decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub handle: EncryptedHandle,
    pub clear: Option<bool>,
}

/// What a check transaction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Recovered by the static call; `None` if it failed.
    pub handle: Option<EncryptedHandle>,
    pub tx: TxOutcome,
}

/// Plaintext check results after `decrypt_check_results`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckResults {
    pub eligible: Option<bool>,
    pub average_at_least: Option<bool>,
}

/// Snapshot of everything a UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationState {
    pub record: Option<RecordHandles>,
    pub clear_record: Option<ClearRecord>,
    pub eligibility: Option<CheckResult>,
    pub average: Option<CheckResult>,
    pub message: String,
}

/// Contract errors carrying "no record" mean an empty state, not a failure.
fn is_no_record(e: &FhevmError) -> bool {
    e.to_string().to_lowercase().contains("no record")
}

pub struct EvaluationSession {
    instance: Arc<dyn EncryptionInstance>,
    contract: Arc<dyn EvaluationContract>,
    signer: Arc<dyn WalletSigner>,
    storage: Arc<dyn GenericStringStorage>,
    tracker: SessionTracker,
    fingerprint: SessionFingerprint,
    refreshing: FlightGuard,
    decrypting: FlightGuard,
    transacting: FlightGuard,
    state: Mutex<EvaluationState>,
}

impl EvaluationSession {
    pub fn new(
        instance: Arc<dyn EncryptionInstance>,
        contract: Arc<dyn EvaluationContract>,
        signer: Arc<dyn WalletSigner>,
        storage: Arc<dyn GenericStringStorage>,
        tracker: SessionTracker,
    ) -> Self {
        let fingerprint =
            SessionFingerprint::new(instance.chain_id(), signer.address(), contract.address());
        Self {
            instance,
            contract,
            signer,
            storage,
            tracker,
            fingerprint,
            refreshing: FlightGuard::new(),
            decrypting: FlightGuard::new(),
            transacting: FlightGuard::new(),
            state: Mutex::new(EvaluationState::default()),
        }
    }

    /// Make this the active session, superseding flows of any previous one.
    pub fn activate(&self) {
        self.tracker.set(self.fingerprint);
    }

    pub fn fingerprint(&self) -> SessionFingerprint {
        self.fingerprint
    }

    pub fn state(&self) -> EvaluationState {
        self.lock_state().clone()
    }

    pub fn message(&self) -> String {
        self.lock_state().message.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.is_active()
    }

    pub fn is_decrypting(&self) -> bool {
        self.decrypting.is_active()
    }

    pub fn is_transacting(&self) -> bool {
        self.transacting.is_active()
    }

    fn lock_state(&self) -> MutexGuard<'_, EvaluationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(session = %self.fingerprint, %message, "Status");
        self.lock_state().message = message;
    }

    fn is_stale(&self) -> bool {
        !self.fingerprint.is_current(&self.tracker)
    }

    fn contract_address(&self) -> Address {
        self.fingerprint.contract
    }

    /// Reload the user's record handles.
    pub async fn refresh_record(&self) -> FhevmResult<Outcome<RecordHandles>> {
        let Some(_flight) = self.refreshing.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };
        if self.is_stale() {
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }

        // The log scan keeps `getMyRecord` from reverting for users without a record.
        let has_record = match self.contract.has_record(self.fingerprint.signer).await {
            Ok(has_record) => has_record,
            Err(e) => {
                self.set_message(format!("getMyRecord() failed: {e}"));
                return Err(e);
            }
        };
        if self.is_stale() {
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }

        let record = if has_record {
            match self.contract.get_my_record().await {
                Ok(record) => Some(record),
                Err(e) if is_no_record(&e) => None,
                Err(e) => {
                    self.set_message(format!("getMyRecord() failed: {e}"));
                    return Err(e);
                }
            }
        } else {
            None
        };
        if self.is_stale() {
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }

        let mut state = self.lock_state();
        state.record = record;
        match record {
            Some(record) => Ok(Outcome::Applied(record)),
            None => {
                state.message = "no record".to_string();
                Ok(Outcome::Skipped(SkipReason::NoRecord))
            }
        }
    }

    /// Decrypt every non-zero handle of the loaded record in one request.
    pub async fn decrypt_record(&self) -> FhevmResult<Outcome<ClearRecord>> {
        if self.refreshing.is_active() {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        }
        let Some(_flight) = self.decrypting.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };
        let Some(record) = self.lock_state().record else {
            return Ok(Outcome::Skipped(SkipReason::NotReady));
        };

        let handles = record.decryptable();
        if handles.is_empty() {
            self.set_message("No encrypted handles to decrypt");
            return Ok(Outcome::Skipped(SkipReason::NothingToDecrypt));
        }

        self.set_message("Start decrypt");
        let clear = match self.user_decrypt(&handles).await? {
            Outcome::Applied(clear) => clear,
            Outcome::Skipped(reason) => return Ok(Outcome::Skipped(reason)),
        };

        let field = |handle: EncryptedHandle| {
            is_decryptable(&handle)
                .then(|| clear.get(&handle).copied())
                .flatten()
        };
        let decrypted = ClearRecord {
            score: field(record.score),
            contribution: field(record.contribution),
            grade: field(record.grade),
            passed: field(record.passed),
        };

        let mut state = self.lock_state();
        state.clear_record = Some(decrypted.clone());
        state.message = "Decryption completed".to_string();
        Ok(Outcome::Applied(decrypted))
    }

    /// Authorize and run one batched user decryption for this contract.
    async fn user_decrypt(
        &self,
        handles: &[EncryptedHandle],
    ) -> FhevmResult<Outcome<HashMap<EncryptedHandle, ClearValue>>> {
        let contract = self.contract_address();
        let signature = DecryptionSignature::load_or_sign(
            self.instance.as_ref(),
            &[contract],
            self.signer.as_ref(),
            self.storage.as_ref(),
        )
        .await;

        let Some(signature) = signature else {
            self.set_message("Unable to build FHEVM decryption signature");
            return Ok(Outcome::Skipped(SkipReason::AuthorizationUnavailable));
        };
        if self.is_stale() {
            self.set_message("Ignore FHEVM decryption");
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }

        let pairs: Vec<HandleContractPair> = handles
            .iter()
            .map(|handle| HandleContractPair {
                handle: *handle,
                contract_address: contract,
            })
            .collect();

        let clear = match self.instance.user_decrypt(&pairs, &signature).await {
            Ok(clear) => clear,
            Err(e) => {
                self.set_message(format!("decrypt failed: {e}"));
                return Err(e);
            }
        };

        if self.is_stale() {
            self.set_message("Ignore FHEVM decryption");
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }
        Ok(Outcome::Applied(clear))
    }

    /// Encrypt all four fields into one bundle, upload, then refresh.
    pub async fn submit_record(&self, input: EvaluationInput) -> FhevmResult<Outcome<TxOutcome>> {
        if self.refreshing.is_active() {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        }
        let Some(flight) = self.transacting.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };

        self.set_message("Start encrypt+submit");
        let mut builder =
            EncryptedInputBuilder::new(self.instance.as_ref(), self.contract_address(), self.fingerprint.signer);
        builder
            .add_u32(input.score)
            .add_u32(input.contribution)
            .add_u16(input.grade)
            .add_bool(input.passed);

        let tx = match self.encrypt_and_upload(builder, &input.cid).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                self.set_message("Ignore submit");
                return Ok(Outcome::Skipped(SkipReason::Stale));
            }
            Err(e) => {
                self.set_message(format!("upload failed: {e}"));
                return Err(e);
            }
        };
        tracing::info!(
            session = %self.fingerprint,
            tx_hash = %tx.tx_hash,
            success = tx.success,
            "Record uploaded"
        );
        if self.is_stale() {
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }

        self.set_message(format!("upload() status={}", u8::from(tx.success)));
        drop(flight);

        if let Err(e) = self.refresh_record().await {
            tracing::warn!(session = %self.fingerprint, error = %e, "Refresh after upload failed");
        }
        Ok(Outcome::Applied(tx))
    }

    /// `None` when the session went stale before the upload was sent.
    async fn encrypt_and_upload(
        &self,
        builder: EncryptedInputBuilder<'_>,
        cid: &str,
    ) -> FhevmResult<Option<TxOutcome>> {
        let bundle = builder.encrypt().await?;
        if self.is_stale() {
            return Ok(None);
        }

        let handles: [EncryptedHandle; 4] = bundle
            .handles
            .try_into()
            .map_err(|_| FhevmError::Sdk("upload needs exactly four handles".to_string()))?;
        self.contract
            .upload(handles, bundle.input_proof, cid)
            .await
            .map(Some)
    }

    /// `isEligible(scoreThreshold, contributionThreshold)`.
    pub async fn check_eligibility(
        &self,
        score_threshold: u32,
        contribution_threshold: u32,
    ) -> FhevmResult<Outcome<CheckOutcome>> {
        self.run_check(
            "Start check eligibility",
            &[score_threshold, contribution_threshold],
            |handles| CheckCall::Eligibility {
                score_threshold: handles[0],
                contribution_threshold: handles[1],
            },
        )
        .await
    }

    /// `isAvgScoreAtLeast(threshold)`.
    pub async fn check_average(&self, threshold: u32) -> FhevmResult<Outcome<CheckOutcome>> {
        self.run_check("Start check avg", &[threshold], |handles| {
            CheckCall::AverageScore {
                threshold: handles[0],
            }
        })
        .await
    }

    /// Static call first for the returned handle, then the real transaction.
    async fn run_check(
        &self,
        start_message: &str,
        thresholds: &[u32],
        make_call: impl FnOnce(&[EncryptedHandle]) -> CheckCall,
    ) -> FhevmResult<Outcome<CheckOutcome>> {
        let Some(_flight) = self.transacting.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };
        self.set_message(start_message);

        let mut builder = EncryptedInputBuilder::new(
            self.instance.as_ref(),
            self.contract_address(),
            self.fingerprint.signer,
        );
        for threshold in thresholds {
            builder.add_u32(*threshold);
        }
        let bundle = match builder.encrypt().await {
            Ok(bundle) => bundle,
            Err(e) => {
                self.set_message(format!("check failed: {e}"));
                return Err(e);
            }
        };
        if self.is_stale() {
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }

        let call = make_call(bundle.handles.as_slice());
        let proof: Bytes = bundle.input_proof;

        let handle = match self.contract.simulate_check(call, proof.clone()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::debug!(check = call.name(), error = %e, "Static call failed, sending transaction");
                None
            }
        };
        if self.is_stale() {
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }
        if let Some(handle) = handle {
            self.store_check(&call, CheckResult { handle, clear: None });
            self.set_message("Encrypted handle received. Use 'Decrypt Check Results' to decrypt.");
        }

        let tx = match self.contract.send_check(call, proof).await {
            Ok(tx) => tx,
            Err(e) => {
                self.set_message(format!("check failed: {e}"));
                return Err(e);
            }
        };
        if self.is_stale() {
            return Ok(Outcome::Skipped(SkipReason::Stale));
        }
        if handle.is_none() {
            self.set_message(format!(
                "{}() mined; retrieve handle and decrypt manually.",
                call.name()
            ));
        }

        Ok(Outcome::Applied(CheckOutcome { handle, tx }))
    }

    fn store_check(&self, call: &CheckCall, result: CheckResult) {
        let mut state = self.lock_state();
        match call {
            CheckCall::Eligibility { .. } => state.eligibility = Some(result),
            CheckCall::AverageScore { .. } => state.average = Some(result),
        }
    }

    /// Decrypt both check results, when present, in one request.
    pub async fn decrypt_check_results(&self) -> FhevmResult<Outcome<CheckResults>> {
        let Some(_flight) = self.decrypting.try_acquire() else {
            return Ok(Outcome::Skipped(SkipReason::Busy));
        };

        let (eligibility, average) = {
            let state = self.lock_state();
            (state.eligibility, state.average)
        };
        let handles: Vec<EncryptedHandle> = [eligibility, average]
            .into_iter()
            .flatten()
            .map(|result| result.handle)
            .filter(is_decryptable)
            .collect();
        if handles.is_empty() {
            self.set_message("No handles to decrypt");
            return Ok(Outcome::Skipped(SkipReason::NothingToDecrypt));
        }

        self.set_message("Start decrypt checks");
        let clear = match self.user_decrypt(&handles).await? {
            Outcome::Applied(clear) => clear,
            Outcome::Skipped(reason) => return Ok(Outcome::Skipped(reason)),
        };

        let lookup = |result: Option<CheckResult>| {
            result.and_then(|result| clear.get(&result.handle).map(ClearValue::as_bool))
        };
        // A check mined while decrypting replaced its entry; leave the newer handle alone.
        let apply = |entry: &mut Option<CheckResult>| {
            if let Some(entry) = entry.as_mut() {
                if let Some(value) = clear.get(&entry.handle) {
                    entry.clear = Some(value.as_bool());
                }
            }
        };

        let mut state = self.lock_state();
        apply(&mut state.eligibility);
        apply(&mut state.average);
        state.message = "Decrypt checks completed".to_string();

        Ok(Outcome::Applied(CheckResults {
            eligible: lookup(eligibility),
            average_at_least: lookup(average),
        }))
    }
}
