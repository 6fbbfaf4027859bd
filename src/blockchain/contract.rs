// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Evaluation contract interactions.

use alloy::{
    primitives::{Address, Bytes, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::Filter,
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use url::Url;

use super::signing::wallet_from_signer;
use super::types::{is_decryptable, EncryptedHandle};
use crate::error::{FhevmError, FhevmResult};

/// Public RPCs cap `eth_getLogs` ranges at 50k blocks.
pub const LOG_LOOKBACK_BLOCKS: u64 = 49_000;

// Encrypted types (`externalEuint32`, `ebool`, ...) travel as bytes32 handles.
sol! {
    #[sol(rpc)]
    interface IEncryptEvaluation {
        event RecordUploaded(address indexed user, string cid);

        function upload(
            bytes32 scoreEnc,
            bytes32 contributionEnc,
            bytes32 gradeEnc,
            bytes32 passedEnc,
            bytes inputProof,
            string cid
        ) external;

        function getMyRecord()
            external
            view
            returns (bytes32 score, bytes32 contribution, bytes32 grade, bytes32 passed);

        function isEligible(
            bytes32 scoreThresholdEnc,
            bytes32 contributionThresholdEnc,
            bytes inputProof
        ) external returns (bytes32);

        function isAvgScoreAtLeast(bytes32 thresholdEnc, bytes inputProof) external returns (bytes32);
    }
}

/// Handles of one user's encrypted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandles {
    pub score: EncryptedHandle,
    pub contribution: EncryptedHandle,
    pub grade: EncryptedHandle,
    pub passed: EncryptedHandle,
}

impl RecordHandles {
    pub fn as_array(&self) -> [EncryptedHandle; 4] {
        [self.score, self.contribution, self.grade, self.passed]
    }

    /// Handles worth decrypting, zero sentinels removed.
    pub fn decryptable(&self) -> Vec<EncryptedHandle> {
        self.as_array()
            .into_iter()
            .filter(is_decryptable)
            .collect()
    }
}

/// An encrypted threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCall {
    /// `isEligible(scoreThreshold, contributionThreshold, proof)`
    Eligibility {
        score_threshold: EncryptedHandle,
        contribution_threshold: EncryptedHandle,
    },
    /// `isAvgScoreAtLeast(threshold, proof)`
    AverageScore { threshold: EncryptedHandle },
}

impl CheckCall {
    pub fn name(&self) -> &'static str {
        match self {
            CheckCall::Eligibility { .. } => "isEligible",
            CheckCall::AverageScore { .. } => "isAvgScoreAtLeast",
        }
    }
}

/// Mined transaction summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// The evaluation contract as seen by the orchestration layer.
#[async_trait]
pub trait EvaluationContract: Send + Sync {
    fn address(&self) -> Address;

    /// Whether `user` emitted `RecordUploaded` within the recent log window.
    async fn has_record(&self, user: Address) -> FhevmResult<bool>;

    /// `getMyRecord()` as the connected signer.
    async fn get_my_record(&self) -> FhevmResult<RecordHandles>;

    /// `upload(...)`, waiting for the receipt.
    async fn upload(
        &self,
        handles: [EncryptedHandle; 4],
        input_proof: Bytes,
        cid: &str,
    ) -> FhevmResult<TxOutcome>;

    /// Static call of a check, returning the encrypted boolean handle.
    async fn simulate_check(&self, check: CheckCall, input_proof: Bytes)
        -> FhevmResult<EncryptedHandle>;

    /// State-changing check transaction, waiting for the receipt.
    async fn send_check(&self, check: CheckCall, input_proof: Bytes) -> FhevmResult<TxOutcome>;
}

/// Evaluation contract bound to a local signing key.
pub struct AlloyEvaluationContract {
    contract: IEncryptEvaluation::IEncryptEvaluationInstance<DynProvider>,
    provider: DynProvider,
    sender: Address,
}

impl AlloyEvaluationContract {
    pub fn new(rpc_url: Url, signer: PrivateKeySigner, contract_address: Address) -> Self {
        let sender = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(wallet_from_signer(signer))
            .connect_http(rpc_url)
            .erased();
        let contract = IEncryptEvaluation::new(contract_address, provider.clone());

        Self {
            contract,
            provider,
            sender,
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }
}

fn contract_error(call: &str, e: impl std::fmt::Display) -> FhevmError {
    FhevmError::Contract(format!("{call}() failed: {e}"))
}

#[async_trait]
impl EvaluationContract for AlloyEvaluationContract {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn has_record(&self, user: Address) -> FhevmResult<bool> {
        let latest = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| FhevmError::network(format!("eth_blockNumber failed: {e}")))?;

        let filter = Filter::new()
            .address(self.address())
            .event_signature(IEncryptEvaluation::RecordUploaded::SIGNATURE_HASH)
            .topic1(user.into_word())
            .from_block(latest.saturating_sub(LOG_LOOKBACK_BLOCKS))
            .to_block(latest);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| FhevmError::network(format!("eth_getLogs failed: {e}")))?;

        Ok(!logs.is_empty())
    }

    async fn get_my_record(&self) -> FhevmResult<RecordHandles> {
        let record = self
            .contract
            .getMyRecord()
            .from(self.sender)
            .call()
            .await
            .map_err(|e| contract_error("getMyRecord", e))?;

        Ok(RecordHandles {
            score: record.score,
            contribution: record.contribution,
            grade: record.grade,
            passed: record.passed,
        })
    }

    async fn upload(
        &self,
        handles: [EncryptedHandle; 4],
        input_proof: Bytes,
        cid: &str,
    ) -> FhevmResult<TxOutcome> {
        let [score, contribution, grade, passed] = handles;
        let receipt = self
            .contract
            .upload(score, contribution, grade, passed, input_proof, cid.to_string())
            .send()
            .await
            .map_err(|e| contract_error("upload", e))?
            .get_receipt()
            .await
            .map_err(|e| contract_error("upload", e))?;

        Ok(TxOutcome {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        })
    }

    async fn simulate_check(
        &self,
        check: CheckCall,
        input_proof: Bytes,
    ) -> FhevmResult<EncryptedHandle> {
        let handle = match check {
            CheckCall::Eligibility {
                score_threshold,
                contribution_threshold,
            } => self
                .contract
                .isEligible(score_threshold, contribution_threshold, input_proof)
                .from(self.sender)
                .call()
                .await,
            CheckCall::AverageScore { threshold } => self
                .contract
                .isAvgScoreAtLeast(threshold, input_proof)
                .from(self.sender)
                .call()
                .await,
        };
        handle.map_err(|e| contract_error(check.name(), e))
    }

    async fn send_check(&self, check: CheckCall, input_proof: Bytes) -> FhevmResult<TxOutcome> {
        let pending = match check {
            CheckCall::Eligibility {
                score_threshold,
                contribution_threshold,
            } => self
                .contract
                .isEligible(score_threshold, contribution_threshold, input_proof)
                .send()
                .await,
            CheckCall::AverageScore { threshold } => self
                .contract
                .isAvgScoreAtLeast(threshold, input_proof)
                .send()
                .await,
        }
        .map_err(|e| contract_error(check.name(), e))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| contract_error(check.name(), e))?;

        Ok(TxOutcome {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        })
    }
}
