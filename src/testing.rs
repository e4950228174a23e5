// src/testing.rs
//! In-memory fakes shared by the unit tests

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TransactionRequest, H256, U256, U64};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::artifacts::ArtifactSource;
use crate::encryption::{ensure_u32, ConfidentialVmClient, EncryptionProvider};
use crate::error::{DeployError, EncryptionError};
use crate::reporter::ResultReporter;
use crate::types::{AttemptSnapshot, DeploymentState, EncryptedValue, PublicKeyMaterial, U32_WIDTH_BITS};
use crate::wallet::WalletProvider;

pub const TOKEN_ABI: &str = r#"[
  {"type":"constructor","stateMutability":"nonpayable","inputs":[
    {"name":"name_","type":"string","internalType":"string"},
    {"name":"symbol_","type":"string","internalType":"string"},
    {"name":"encryptedSupply","type":"bytes","internalType":"bytes"}]},
  {"type":"function","name":"name","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"string","internalType":"string"}]},
  {"type":"function","name":"symbol","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"string","internalType":"string"}]}
]"#;

pub const COLLECTION_ABI: &str = r#"[
  {"type":"constructor","stateMutability":"nonpayable","inputs":[
    {"name":"name_","type":"string","internalType":"string"},
    {"name":"symbol_","type":"string","internalType":"string"}]},
  {"type":"function","name":"name","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"string","internalType":"string"}]}
]"#;

pub const COLLECTION_ABI_WITH_URI: &str = r#"[
  {"type":"constructor","stateMutability":"nonpayable","inputs":[
    {"name":"name_","type":"string","internalType":"string"},
    {"name":"symbol_","type":"string","internalType":"string"},
    {"name":"baseURI_","type":"string","internalType":"string"}]}
]"#;

/// Hardhat-shaped artifact JSON; `abi` is inserted verbatim.
pub fn artifact_json(name: &str, abi: &str, bytecode: &str) -> String {
    format!(
        r#"{{"_format":"hh-sol-artifact-1","contractName":"{}","sourceName":"contracts/{}.sol","abi":{},"bytecode":"{}","deployedBytecode":"0x","linkReferences":{{}},"deployedLinkReferences":{{}}}}"#,
        name, name, abi, bytecode
    )
}

fn fake_ciphertext(width_bits: u16, value: u32) -> Vec<u8> {
    let mut out = vec![0xfe, width_bits as u8];
    out.extend_from_slice(&(value ^ 0xa5a5_a5a5).to_be_bytes());
    out
}

// ============================================
// Wallet

#[derive(Clone)]
enum ReceiptMode {
    Never,
    Confirm { address: Address, gas_used: u64 },
    Revert,
    Delayed { after: Duration, address: Address },
}

struct WalletInner {
    chain_id: u64,
    reject_connect: bool,
    reject_switch: bool,
    switch_delay: Option<Duration>,
    balance: U256,
    gas_price: U256,
    send_failure: Option<String>,
    receipts: ReceiptMode,
    sent: Vec<(H256, TransactionRequest, Instant)>,
}

/// Scriptable wallet provider.
pub struct FakeWallet {
    account: Address,
    inner: Mutex<WalletInner>,
    calls: AtomicUsize,
    receipt_queries: AtomicUsize,
}

impl FakeWallet {
    pub fn new(chain_id: u64) -> Arc<Self> {
        Arc::new(Self {
            account: Address::repeat_byte(0xa1),
            inner: Mutex::new(WalletInner {
                chain_id,
                reject_connect: false,
                reject_switch: false,
                switch_delay: None,
                balance: U256::exp10(18),
                gas_price: U256::from(1_000_000_000u64),
                send_failure: None,
                receipts: ReceiptMode::Never,
                sent: Vec::new(),
            }),
            calls: AtomicUsize::new(0),
            receipt_queries: AtomicUsize::new(0),
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn reject_connect(&self) {
        self.inner.lock().unwrap().reject_connect = true;
    }

    pub fn reject_switch(&self) {
        self.inner.lock().unwrap().reject_switch = true;
    }

    /// Keep the switch prompt open for `delay` before answering.
    pub fn delay_switch(&self, delay: Duration) {
        self.inner.lock().unwrap().switch_delay = Some(delay);
    }

    pub fn set_balance(&self, balance: U256) {
        self.inner.lock().unwrap().balance = balance;
    }

    pub fn set_gas_price(&self, gas_price: U256) {
        self.inner.lock().unwrap().gas_price = gas_price;
    }

    pub fn fail_send(&self, message: &str) {
        self.inner.lock().unwrap().send_failure = Some(message.to_string());
    }

    pub fn auto_confirm(&self, address: Address, gas_used: u64) {
        self.inner.lock().unwrap().receipts = ReceiptMode::Confirm { address, gas_used };
    }

    pub fn auto_revert(&self) {
        self.inner.lock().unwrap().receipts = ReceiptMode::Revert;
    }

    pub fn delay_receipt(&self, after: Duration, address: Address) {
        self.inner.lock().unwrap().receipts = ReceiptMode::Delayed { after, address };
    }

    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, tx, _)| tx.clone())
            .collect()
    }

    /// Provider calls other than receipt polling.
    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn receipt_queries(&self) -> usize {
        self.receipt_queries.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, DeployError> {
        self.count();
        if self.inner.lock().unwrap().reject_connect {
            return Err(DeployError::UserRejected);
        }
        Ok(vec![self.account])
    }

    async fn chain_id(&self) -> Result<u64, DeployError> {
        self.count();
        Ok(self.inner.lock().unwrap().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), DeployError> {
        self.count();
        let delay = self.inner.lock().unwrap().switch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.reject_switch {
            return Err(DeployError::NetworkSwitchRejected);
        }
        inner.chain_id = chain_id;
        Ok(())
    }

    async fn balance(&self, _account: Address) -> Result<U256, DeployError> {
        self.count();
        Ok(self.inner.lock().unwrap().balance)
    }

    async fn gas_price(&self) -> Result<U256, DeployError> {
        self.count();
        Ok(self.inner.lock().unwrap().gas_price)
    }

    async fn send_transaction(
        &self,
        _from: Address,
        tx: TransactionRequest,
    ) -> Result<H256, DeployError> {
        self.count();
        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.send_failure {
            return Err(DeployError::from_submission_message(message.clone()));
        }

        let hash = H256::from_low_u64_be(inner.sent.len() as u64 + 1);
        inner.sent.push((hash, tx, Instant::now()));
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, DeployError> {
        self.receipt_queries.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();

        let Some((_, _, sent_at)) = inner.sent.iter().find(|(hash, _, _)| *hash == tx_hash) else {
            return Ok(None);
        };

        let receipt = |status: u64, address: Option<Address>, gas_used: u64| TransactionReceipt {
            transaction_hash: tx_hash,
            status: Some(U64::from(status)),
            contract_address: address,
            gas_used: Some(U256::from(gas_used)),
            ..Default::default()
        };

        Ok(match inner.receipts.clone() {
            ReceiptMode::Never => None,
            ReceiptMode::Confirm { address, gas_used } => Some(receipt(1, Some(address), gas_used)),
            ReceiptMode::Revert => Some(receipt(0, None, 5_000_000)),
            ReceiptMode::Delayed { after, address } if sent_at.elapsed() >= after => {
                Some(receipt(1, Some(address), 1))
            }
            ReceiptMode::Delayed { .. } => None,
        })
    }
}

// ============================================
// Encryption

#[derive(Default)]
struct VmClientInner {
    init_calls: usize,
    fail_next_init: bool,
}

/// Confidential VM client producing deterministic, non-plaintext ciphertexts.
#[derive(Clone, Default)]
pub struct FakeVmClient {
    inner: Arc<Mutex<VmClientInner>>,
}

impl FakeVmClient {
    pub fn init_calls(&self) -> usize {
        self.inner.lock().unwrap().init_calls
    }

    pub fn fail_next_init(&self) {
        self.inner.lock().unwrap().fail_next_init = true;
    }
}

#[async_trait]
impl ConfidentialVmClient for FakeVmClient {
    async fn initialize(&self) -> Result<(), EncryptionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.init_calls += 1;
        if std::mem::take(&mut inner.fail_next_init) {
            return Err(EncryptionError::Client("gateway unavailable".to_string()));
        }
        Ok(())
    }

    async fn public_key(&self) -> Result<PublicKeyMaterial, EncryptionError> {
        Ok(PublicKeyMaterial {
            key_id: "test-key".to_string(),
            public_key: vec![0x0b; 32],
        })
    }

    async fn encrypt(
        &self,
        _key: &PublicKeyMaterial,
        width_bits: u16,
        value: u64,
    ) -> Result<Vec<u8>, EncryptionError> {
        Ok(fake_ciphertext(width_bits, ensure_u32(value)?))
    }
}

type EncryptHook = Arc<dyn Fn() + Send + Sync>;

struct EncryptionInner {
    init_calls: usize,
    encrypt_calls: usize,
    failure: Option<EncryptionError>,
    width_bits: u16,
    hook: Option<EncryptHook>,
}

/// Encryption provider with scriptable failures, for orchestrator tests.
pub struct FakeEncryption {
    inner: Mutex<EncryptionInner>,
}

impl Default for FakeEncryption {
    fn default() -> Self {
        Self {
            inner: Mutex::new(EncryptionInner {
                init_calls: 0,
                encrypt_calls: 0,
                failure: None,
                width_bits: U32_WIDTH_BITS,
                hook: None,
            }),
        }
    }
}

impl FakeEncryption {
    pub fn ciphertext_for(value: u32) -> Vec<u8> {
        fake_ciphertext(U32_WIDTH_BITS, value)
    }

    pub fn fail_with(&self, error: EncryptionError) {
        self.inner.lock().unwrap().failure = Some(error);
    }

    /// Report ciphertexts with the wrong declared width.
    pub fn use_width(&self, width_bits: u16) {
        self.inner.lock().unwrap().width_bits = width_bits;
    }

    /// Run `hook` on every encryption, before the ciphertext is returned.
    pub fn on_encrypt<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        self.inner.lock().unwrap().hook = Some(Arc::new(hook));
    }

    pub fn init_calls(&self) -> usize {
        self.inner.lock().unwrap().init_calls
    }

    pub fn encrypt_calls(&self) -> usize {
        self.inner.lock().unwrap().encrypt_calls
    }
}

#[async_trait]
impl EncryptionProvider for FakeEncryption {
    async fn initialize(&self) -> Result<(), EncryptionError> {
        self.inner.lock().unwrap().init_calls += 1;
        Ok(())
    }

    async fn encrypt_u32(&self, value: u64) -> Result<EncryptedValue, EncryptionError> {
        let (hook, width_bits) = {
            let mut inner = self.inner.lock().unwrap();
            inner.encrypt_calls += 1;
            if let Some(failure) = inner.failure.clone() {
                return Err(failure);
            }
            (inner.hook.clone(), inner.width_bits)
        };

        let plaintext = ensure_u32(value)?;
        if let Some(hook) = hook {
            hook();
        }
        Ok(EncryptedValue::new(fake_ciphertext(U32_WIDTH_BITS, plaintext), width_bits))
    }

    async fn public_key(&self) -> Result<PublicKeyMaterial, EncryptionError> {
        FakeVmClient::default().public_key().await
    }
}

// ============================================
// Artifacts

#[derive(Clone, Default)]
pub struct InMemoryArtifacts {
    files: Arc<Mutex<HashMap<String, String>>>,
    fetches: Arc<AtomicUsize>,
}

impl InMemoryArtifacts {
    pub fn insert(&self, name: &str, json: String) {
        self.files.lock().unwrap().insert(name.to_string(), json);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactSource for InMemoryArtifacts {
    async fn fetch(&self, contract_name: &str) -> Result<Option<String>, DeployError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.files.lock().unwrap().get(contract_name).cloned())
    }
}

// ============================================
// Reporting

/// Keeps every notification for later assertions.
#[derive(Default)]
pub struct CapturingReporter {
    states: Mutex<Vec<(u64, DeploymentState)>>,
    finished: Mutex<Vec<AttemptSnapshot>>,
    state_delay: Option<Duration>,
}

impl CapturingReporter {
    /// Sleeps for `delay` inside every state notification.
    pub fn slow(delay: Duration) -> Self {
        Self {
            state_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn states_for(&self, attempt_id: u64) -> Vec<DeploymentState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == attempt_id)
            .map(|(_, state)| *state)
            .collect()
    }

    pub fn finished(&self) -> Vec<AttemptSnapshot> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultReporter for CapturingReporter {
    async fn attempt_state_changed(&self, attempt: &AttemptSnapshot) {
        if let Some(delay) = self.state_delay {
            tokio::time::sleep(delay).await;
        }
        self.states.lock().unwrap().push((attempt.id, attempt.state));
    }

    async fn deployment_finished(&self, attempt: &AttemptSnapshot) {
        self.finished.lock().unwrap().push(attempt.clone());
    }
}
