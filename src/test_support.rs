// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process stand-ins for the node, wallet, relayer SDK and contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::blockchain::signing::signer_from_hex;
use crate::blockchain::{
    CheckCall, Eip1193Provider, EncryptedHandle, EvaluationContract, RecordHandles, RpcConnector,
    TxOutcome, WalletSigner,
};
use crate::error::{FhevmError, FhevmResult};
use crate::fhevm::mock::RELAYER_METADATA_METHOD;
use crate::fhevm::{
    ClearValue, DecryptionSignature, EncryptedInputBundle, EncryptionInstance, HandleContractPair,
    InstanceConfig, MockInstanceBuilder, MockInstanceConfig, PlaintextValue, RelayerNetworkDefaults,
    RelayerSdk, SdkProvider,
};

pub const ACL: &str = "0x50157cffd6bbfa2dece204a89ec419c23ef5755d";
pub const INPUT_VERIFIER: &str = "0x901f8942346f7ab3a01f6d7613119bca447bb030";
pub const KMS_VERIFIER: &str = "0x1364cbbf2cdf5032c47d8226a6f6fbd2afcdacac";

/// First default Hardhat account key.
pub const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// A well-formed `fhevm_relayer_metadata` answer.
pub fn valid_metadata(chain_id: Option<u64>) -> Value {
    let mut metadata = json!({
        "ACLAddress": ACL,
        "InputVerifierAddress": INPUT_VERIFIER,
        "KMSVerifierAddress": KMS_VERIFIER,
    });
    if let Some(chain_id) = chain_id {
        metadata["chainId"] = json!(chain_id);
    }
    metadata
}

fn address(raw: &str) -> Address {
    raw.parse().unwrap()
}

type Hook = Box<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

pub struct FakeNode {
    chain_id: u64,
    client_version: String,
    reachable: bool,
    metadata: Mutex<Option<Value>>,
    calls: Mutex<HashMap<String, usize>>,
    hooks: Mutex<HashMap<String, Hook>>,
}

impl FakeNode {
    pub fn new(chain_id: u64, client_version: &str) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            client_version: client_version.to_string(),
            reachable: true,
            metadata: Mutex::new(Some(valid_metadata(Some(chain_id)))),
            calls: Mutex::new(HashMap::new()),
            hooks: Mutex::new(HashMap::new()),
        })
    }

    pub fn hardhat(chain_id: u64) -> Arc<Self> {
        Self::new(chain_id, "HardhatNetwork/2.22.19/@nomicfoundation/edr/0.8.0")
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            chain_id: 0,
            client_version: String::new(),
            reachable: false,
            metadata: Mutex::new(None),
            calls: Mutex::new(HashMap::new()),
            hooks: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_metadata(self: Arc<Self>, metadata: Value) -> Arc<Self> {
        *self.metadata.lock().unwrap() = Some(metadata);
        self
    }

    pub fn without_metadata(self: Arc<Self>) -> Arc<Self> {
        *self.metadata.lock().unwrap() = None;
        self
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Run `hook` inside every `method` request, before it is answered.
    pub fn on_request(&self, method: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap()
            .insert(method.to_string(), Box::new(hook));
    }
}

#[async_trait]
impl Eip1193Provider for FakeNode {
    async fn request(&self, method: &str, _params: Value) -> FhevmResult<Value> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default() += 1;
        if let Some(hook) = self.hooks.lock().unwrap().get(method) {
            hook();
        }

        if !self.reachable {
            return Err(FhevmError::network("connection refused"));
        }

        match method {
            "eth_chainId" => Ok(json!(format!("{:#x}", self.chain_id))),
            "web3_clientVersion" => Ok(json!(self.client_version)),
            RELAYER_METADATA_METHOD => self.metadata.lock().unwrap().clone().ok_or_else(|| {
                FhevmError::network(format!("the method {method} does not exist"))
            }),
            _ => Err(FhevmError::network(format!("unsupported method {method}"))),
        }
    }
}

/// Connects every URL to the same node.
pub struct FakeConnector {
    node: Arc<FakeNode>,
}

impl FakeConnector {
    pub fn single(node: Arc<FakeNode>) -> Arc<Self> {
        Arc::new(Self { node })
    }
}

impl RpcConnector for FakeConnector {
    fn connect(&self, _url: &Url) -> FhevmResult<Arc<dyn Eip1193Provider>> {
        Ok(self.node.clone())
    }
}

// ---------------------------------------------------------------------------
// Encryption instance
// ---------------------------------------------------------------------------

/// Handles are deterministic hashes; decryption returns the encrypted plaintext.
pub struct FakeInstance {
    chain_id: u64,
    verifying_contract: Address,
    mock: bool,
    encrypt_calls: AtomicUsize,
    plaintexts: Mutex<HashMap<EncryptedHandle, ClearValue>>,
    decrypt_requests: Mutex<Vec<Vec<HandleContractPair>>>,
    decrypt_delay: Option<Duration>,
    on_encrypt: Mutex<Option<Hook>>,
}

impl FakeInstance {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            verifying_contract: address(KMS_VERIFIER),
            mock: false,
            encrypt_calls: AtomicUsize::new(0),
            plaintexts: Mutex::new(HashMap::new()),
            decrypt_requests: Mutex::new(Vec::new()),
            decrypt_delay: None,
            on_encrypt: Mutex::new(None),
        }
    }

    /// Make every `user_decrypt` take `delay` before answering.
    pub fn with_decrypt_delay(mut self, delay: Duration) -> Self {
        self.decrypt_delay = Some(delay);
        self
    }

    /// Run `hook` inside every `encrypt` call.
    pub fn on_encrypt(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_encrypt.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn mock(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            verifying_contract,
            mock: true,
            ..Self::new(chain_id)
        }
    }

    pub fn register(&self, handle: EncryptedHandle, value: ClearValue) {
        self.plaintexts.lock().unwrap().insert(handle, value);
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_requests(&self) -> Vec<Vec<HandleContractPair>> {
        self.decrypt_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EncryptionInstance for FakeInstance {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn verifying_contract_decryption(&self) -> Address {
        self.verifying_contract
    }

    fn is_mock(&self) -> bool {
        self.mock
    }

    async fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[PlaintextValue],
    ) -> FhevmResult<EncryptedInputBundle> {
        let call = self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_encrypt.lock().unwrap().as_ref() {
            hook();
        }
        let mut handles = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let clear = match value {
                PlaintextValue::U32(v) => ClearValue::Uint(U256::from(*v)),
                PlaintextValue::U16(v) => ClearValue::Uint(U256::from(*v)),
                PlaintextValue::Bool(v) => ClearValue::Bool(*v),
            };
            let handle = keccak256(format!(
                "{}:{contract}:{user}:{call}:{index}",
                self.chain_id
            ));
            self.register(handle, clear);
            handles.push(handle);
        }
        Ok(EncryptedInputBundle {
            handles,
            input_proof: Bytes::from(vec![0xAB; 32]),
        })
    }

    async fn user_decrypt(
        &self,
        handles: &[HandleContractPair],
        signature: &DecryptionSignature,
    ) -> FhevmResult<HashMap<EncryptedHandle, ClearValue>> {
        if !signature.verify(self) {
            return Err(FhevmError::Signing("invalid decryption signature".to_string()));
        }
        if let Some(pair) = handles
            .iter()
            .find(|pair| !signature.contract_addresses.contains(&pair.contract_address))
        {
            return Err(FhevmError::validation(format!(
                "contract {} not authorized",
                pair.contract_address
            )));
        }

        self.decrypt_requests.lock().unwrap().push(handles.to_vec());
        if let Some(delay) = self.decrypt_delay {
            tokio::time::sleep(delay).await;
        }
        let plaintexts = self.plaintexts.lock().unwrap();
        Ok(handles
            .iter()
            .filter_map(|pair| plaintexts.get(&pair.handle).map(|clear| (pair.handle, *clear)))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

pub struct FakeWallet {
    signer: PrivateKeySigner,
    declining: bool,
    prompts: AtomicUsize,
}

impl FakeWallet {
    pub fn hardhat() -> Self {
        Self {
            signer: signer_from_hex(HARDHAT_KEY).unwrap(),
            declining: false,
            prompts: AtomicUsize::new(0),
        }
    }

    /// Rejects every signature request.
    pub fn declining(mut self) -> Self {
        self.declining = true;
        self
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for FakeWallet {
    fn address(&self) -> Address {
        WalletSigner::address(&self.signer)
    }

    async fn sign_hash(&self, hash: &B256) -> FhevmResult<Signature> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.declining {
            return Err(FhevmError::Signing("User rejected the request".to_string()));
        }
        WalletSigner::sign_hash(&self.signer, hash).await
    }
}

// ---------------------------------------------------------------------------
// Relayer SDK
// ---------------------------------------------------------------------------

pub struct FakeSdk {
    init_result: AtomicBool,
    acl: Mutex<String>,
    init_count: AtomicUsize,
    default_network_reads: AtomicUsize,
    created: Mutex<Vec<InstanceConfig>>,
}

impl FakeSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            init_result: AtomicBool::new(true),
            acl: Mutex::new("0x687820221192c5b662b25367f70076a37bc79b6c".to_string()),
            init_count: AtomicUsize::new(0),
            default_network_reads: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        })
    }

    /// `initSDK` answers `false`.
    pub fn failing_init(self: Arc<Self>) -> Arc<Self> {
        self.init_result.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_acl(self: Arc<Self>, acl: &str) -> Arc<Self> {
        *self.acl.lock().unwrap() = acl.to_string();
        self
    }

    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    pub fn default_network_reads(&self) -> usize {
        self.default_network_reads.load(Ordering::SeqCst)
    }

    pub fn created_configs(&self) -> Vec<InstanceConfig> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayerSdk for FakeSdk {
    async fn init_sdk(&self, _options: Option<&Value>) -> FhevmResult<bool> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.init_result.load(Ordering::SeqCst))
    }

    fn default_network(&self) -> RelayerNetworkDefaults {
        self.default_network_reads.fetch_add(1, Ordering::SeqCst);
        RelayerNetworkDefaults {
            acl_contract_address: self.acl.lock().unwrap().clone(),
            kms_contract_address: "0x1364cbbf2cdf5032c47d8226a6f6fbd2afcdacac".to_string(),
            input_verifier_contract_address: "0xbc91f3dad1a5f19f8390c400196e58073b6a0bc4"
                .to_string(),
            verifying_contract_address_decryption: "0xb6e160b1ff80d67bfe90a85ee06ce0a2613607d1"
                .to_string(),
            verifying_contract_address_input_verification:
                "0x7048c39f048125eda9d678aebadfb22f7900a29f".to_string(),
            chain_id: 11155111,
            gateway_chain_id: 55815,
            relayer_url: "https://relayer.testnet.zama.cloud".to_string(),
        }
    }

    async fn create_instance(
        &self,
        config: InstanceConfig,
    ) -> FhevmResult<Arc<dyn EncryptionInstance>> {
        let chain_id = config.defaults.chain_id;
        self.created.lock().unwrap().push(config);
        Ok(Arc::new(FakeInstance::new(chain_id)))
    }
}

pub struct FakeSdkProvider {
    sdk: Arc<FakeSdk>,
    delay: Mutex<Option<Duration>>,
    fetch_count: AtomicUsize,
}

impl FakeSdkProvider {
    pub fn new(sdk: Arc<FakeSdk>) -> Arc<Self> {
        Arc::new(Self {
            sdk,
            delay: Mutex::new(None),
            fetch_count: AtomicUsize::new(0),
        })
    }

    /// Simulate a slow module download.
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SdkProvider for FakeSdkProvider {
    async fn fetch(&self) -> FhevmResult<Arc<dyn RelayerSdk>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.sdk.clone())
    }
}

// ---------------------------------------------------------------------------
// Mock instance builder
// ---------------------------------------------------------------------------

pub struct FakeMockBuilder {
    request_providers: Mutex<Vec<Arc<dyn Eip1193Provider>>>,
    configs: Mutex<Vec<MockInstanceConfig>>,
}

impl FakeMockBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            request_providers: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        })
    }

    pub fn request_providers(&self) -> Vec<Arc<dyn Eip1193Provider>> {
        self.request_providers.lock().unwrap().clone()
    }

    pub fn configs(&self) -> Vec<MockInstanceConfig> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait]
impl MockInstanceBuilder for FakeMockBuilder {
    async fn create(
        &self,
        request_provider: Arc<dyn Eip1193Provider>,
        _readonly: Arc<dyn Eip1193Provider>,
        config: MockInstanceConfig,
    ) -> FhevmResult<Arc<dyn EncryptionInstance>> {
        self.request_providers.lock().unwrap().push(request_provider);
        let instance = FakeInstance::mock(config.chain_id, config.verifying_contract_address_decryption);
        self.configs.lock().unwrap().push(config);
        Ok(Arc::new(instance))
    }
}

// ---------------------------------------------------------------------------
// Evaluation contract
// ---------------------------------------------------------------------------

/// Upload stores the record; checks return the configured handle.
pub struct FakeContract {
    address: Address,
    record: Mutex<Option<RecordHandles>>,
    record_reads: AtomicUsize,
    hooks: Mutex<HashMap<&'static str, Hook>>,
    uploads: Mutex<Vec<([EncryptedHandle; 4], Bytes, String)>>,
    check_handle: Mutex<Option<EncryptedHandle>>,
    sent_checks: Mutex<Vec<CheckCall>>,
    transactions: AtomicU64,
}

impl FakeContract {
    pub fn new(address: Address) -> Arc<Self> {
        Arc::new(Self {
            address,
            record: Mutex::new(None),
            record_reads: AtomicUsize::new(0),
            hooks: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
            check_handle: Mutex::new(None),
            sent_checks: Mutex::new(Vec::new()),
            transactions: AtomicU64::new(0),
        })
    }

    pub fn set_record(&self, record: RecordHandles) {
        *self.record.lock().unwrap() = Some(record);
    }

    pub fn record_reads(&self) -> usize {
        self.record_reads.load(Ordering::SeqCst)
    }

    /// Run `hook` inside every `getMyRecord` call.
    pub fn on_record_read(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_call("getMyRecord", hook);
    }

    /// Run `hook` inside every call of `method`: `getMyRecord`, `upload`,
    /// `simulateCheck` or `sendCheck`.
    pub fn on_call(&self, method: &'static str, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().unwrap().insert(method, Box::new(hook));
    }

    fn run_hook(&self, method: &str) {
        if let Some(hook) = self.hooks.lock().unwrap().get(method) {
            hook();
        }
    }

    pub fn uploads(&self) -> Vec<([EncryptedHandle; 4], Bytes, String)> {
        self.uploads.lock().unwrap().clone()
    }

    /// Handle returned by static check calls; `None` makes them revert.
    pub fn set_check_handle(&self, handle: Option<EncryptedHandle>) {
        *self.check_handle.lock().unwrap() = handle;
    }

    pub fn sent_checks(&self) -> Vec<CheckCall> {
        self.sent_checks.lock().unwrap().clone()
    }

    fn mined(&self) -> TxOutcome {
        let n = self.transactions.fetch_add(1, Ordering::SeqCst) + 1;
        TxOutcome {
            tx_hash: keccak256(n.to_be_bytes()),
            block_number: Some(n),
            success: true,
        }
    }
}

#[async_trait]
impl EvaluationContract for FakeContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn has_record(&self, _user: Address) -> FhevmResult<bool> {
        Ok(self.record.lock().unwrap().is_some())
    }

    async fn get_my_record(&self) -> FhevmResult<RecordHandles> {
        self.record_reads.fetch_add(1, Ordering::SeqCst);
        self.run_hook("getMyRecord");
        let record = *self.record.lock().unwrap();
        record.ok_or_else(|| {
            FhevmError::Contract("getMyRecord() failed: execution reverted: no record".to_string())
        })
    }

    async fn upload(
        &self,
        handles: [EncryptedHandle; 4],
        input_proof: Bytes,
        cid: &str,
    ) -> FhevmResult<TxOutcome> {
        self.run_hook("upload");
        self.uploads
            .lock()
            .unwrap()
            .push((handles, input_proof, cid.to_string()));
        self.set_record(RecordHandles {
            score: handles[0],
            contribution: handles[1],
            grade: handles[2],
            passed: handles[3],
        });
        Ok(self.mined())
    }

    async fn simulate_check(
        &self,
        _check: CheckCall,
        _input_proof: Bytes,
    ) -> FhevmResult<EncryptedHandle> {
        self.run_hook("simulateCheck");
        let handle = *self.check_handle.lock().unwrap();
        handle.ok_or_else(|| FhevmError::Contract("static call reverted".to_string()))
    }

    async fn send_check(&self, check: CheckCall, _input_proof: Bytes) -> FhevmResult<TxOutcome> {
        self.run_hook("sendCheck");
        self.sent_checks.lock().unwrap().push(check);
        Ok(self.mined())
    }
}
