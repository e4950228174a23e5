// src/orchestrator.rs
//! Deployment orchestrator - the attempt state machine
//!
//! Idle -> Validating -> Encrypting -> Submitting -> Confirming -> {Succeeded, Failed}
//!
//! At most one attempt per orchestrator is non-terminal at any time. A second
//! request while one is in flight is rejected synchronously. No step retries on
//! its own; resubmitting a creation transaction is the caller's decision.

use chrono::{DateTime, Utc};
use ethers::abi::Token;
use ethers::types::{TransactionReceipt, TransactionRequest, H256, U256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactRegistry, ContractArtifact};
use crate::config::DeployerConfig;
use crate::encryption::EncryptionProvider;
use crate::error::{DeployError, EncryptionError};
use crate::metrics;
use crate::reporter::ResultReporter;
use crate::types::{
    AttemptSnapshot, ContractType, DeploymentResult, DeploymentState, EncryptedValue, TokenParams,
    U32_WIDTH_BITS,
};
use crate::wallet::WalletSession;

/// Knobs the orchestrator needs from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub expected_chain_id: u64,
    pub gas_price_ceiling: U256,
    pub confirmation_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub token_contract: String,
    pub collection_contract: String,
    pub token_gas_limit: u64,
    pub collection_gas_limit: u64,
}

impl OrchestratorSettings {
    pub fn from_config(config: &DeployerConfig) -> Self {
        Self {
            expected_chain_id: config.network.chain_id,
            gas_price_ceiling: config.network.gas_price_ceiling_wei(),
            confirmation_timeout: config.deployment.confirmation_timeout(),
            receipt_poll_interval: config.deployment.receipt_poll_interval(),
            token_contract: config.artifacts.contract_name(ContractType::Token).to_string(),
            collection_contract: config
                .artifacts
                .contract_name(ContractType::Collection)
                .to_string(),
            token_gas_limit: config.deployment.gas_limit(ContractType::Token),
            collection_gas_limit: config.deployment.gas_limit(ContractType::Collection),
        }
    }

    fn contract_name(&self, contract_type: ContractType) -> &str {
        match contract_type {
            ContractType::Token => &self.token_contract,
            ContractType::Collection => &self.collection_contract,
        }
    }

    fn gas_limit(&self, contract_type: ContractType) -> u64 {
        match contract_type {
            ContractType::Token => self.token_gas_limit,
            ContractType::Collection => self.collection_gas_limit,
        }
    }
}

/// One logical try at creating a contract.
#[derive(Debug, Clone)]
struct DeploymentAttempt {
    id: u64,
    contract_type: ContractType,
    params: TokenParams,
    state: DeploymentState,
    started_at: DateTime<Utc>,
    result: Option<DeploymentResult>,
}

impl DeploymentAttempt {
    fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot {
            id: self.id,
            contract_type: self.contract_type,
            params: self.params.clone(),
            state: self.state,
            started_at: self.started_at,
            result: self.result.clone(),
        }
    }
}

/// Output of the submission step, handed to confirmation.
struct Submitted {
    tx_hash: H256,
}

pub struct DeploymentOrchestrator {
    wallet: Arc<WalletSession>,
    encryption: Arc<dyn EncryptionProvider>,
    artifacts: Arc<ArtifactRegistry>,
    reporter: Arc<dyn ResultReporter>,
    settings: OrchestratorSettings,
    current: Mutex<Option<DeploymentAttempt>>,
    next_id: AtomicU64,
}

impl DeploymentOrchestrator {
    pub fn new(
        wallet: Arc<WalletSession>,
        encryption: Arc<dyn EncryptionProvider>,
        artifacts: Arc<ArtifactRegistry>,
        reporter: Arc<dyn ResultReporter>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            wallet,
            encryption,
            artifacts,
            reporter,
            settings,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// State of the latest attempt, or `Idle` if none was ever accepted.
    pub fn current_attempt_state(&self) -> DeploymentState {
        self.lock_current()
            .as_ref()
            .map(|attempt| attempt.state)
            .unwrap_or(DeploymentState::Idle)
    }

    pub fn current_attempt(&self) -> Option<AttemptSnapshot> {
        self.lock_current().as_ref().map(DeploymentAttempt::snapshot)
    }

    /// Run a deployment to a terminal result.
    ///
    /// The pipeline runs on its own task: if the caller stops awaiting, the
    /// attempt still reaches `Succeeded` or `Failed` and is reported.
    pub async fn deploy(
        self: &Arc<Self>,
        contract_type: ContractType,
        params: TokenParams,
    ) -> DeploymentResult {
        let id = match self.begin(contract_type, &params) {
            Ok(id) => id,
            Err(rejection) => return rejection,
        };

        // No await between begin and spawn: a dropped caller must not strand the attempt
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.report_state(id).await;
            let outcome = this.run(id, contract_type, &params).await;
            this.finish(id, outcome).await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Deployment task {} aborted: {}", id, e);
                let aborted = DeployError::NetworkError(format!("deployment task aborted: {}", e));
                self.finish(id, Err(aborted)).await
            }
        }
    }

    /// Accept a new attempt, or reject synchronously if one is in flight.
    fn begin(&self, contract_type: ContractType, params: &TokenParams) -> Result<u64, DeploymentResult> {
        let mut current = self.lock_current();

        if let Some(attempt) = current.as_ref() {
            if !attempt.state.is_terminal() {
                warn!(
                    "Rejecting deploy request: attempt {} is {:?}",
                    attempt.id, attempt.state
                );
                return Err(DeploymentResult::failed(DeployError::AttemptInFlight(attempt.id)));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        *current = Some(DeploymentAttempt {
            id,
            contract_type,
            params: params.clone(),
            state: DeploymentState::Validating,
            started_at: Utc::now(),
            result: None,
        });
        metrics::DEPLOYMENTS_STARTED.inc();

        info!(
            "Deployment attempt {} accepted: {} {:?} ({})",
            id, contract_type, params.name, params.symbol
        );
        Ok(id)
    }

    async fn run(
        &self,
        id: u64,
        contract_type: ContractType,
        params: &TokenParams,
    ) -> Result<(Submitted, TransactionReceipt), DeployError> {
        self.validate(contract_type, params)?;

        let encrypted = if contract_type.has_sensitive_field() {
            self.transition(id, DeploymentState::Encrypting).await;
            Some(self.encrypt_sensitive(params).await?)
        } else {
            debug!("Attempt {}: {} has no sensitive field, skipping encryption", id, contract_type);
            None
        };

        self.transition(id, DeploymentState::Submitting).await;
        let submitted = self.submit(contract_type, params, encrypted).await?;

        self.transition(id, DeploymentState::Confirming).await;
        let receipt = self.await_receipt(submitted.tx_hash).await?;

        Ok((submitted, receipt))
    }

    fn validate(&self, contract_type: ContractType, params: &TokenParams) -> Result<(), DeployError> {
        self.check_network()?;
        params.validate(contract_type)
    }

    /// Connectivity and chain check against the current wallet snapshot. No I/O.
    fn check_network(&self) -> Result<(), DeployError> {
        let expected = self.settings.expected_chain_id;
        let state = self.wallet.snapshot();

        if !state.is_connected() {
            return Err(DeployError::NotConnected);
        }
        if !self.wallet.current_network_matches(expected) {
            return Err(DeployError::WrongNetwork {
                expected,
                actual: state.chain_id(),
            });
        }
        Ok(())
    }

    async fn encrypt_sensitive(&self, params: &TokenParams) -> Result<EncryptedValue, DeployError> {
        let value = params
            .sensitive_value
            .ok_or_else(|| DeployError::InvalidParams("missing sensitive value".to_string()))?;

        self.encryption.initialize().await?;
        let encrypted = self.encryption.encrypt_u32(value).await?;

        if encrypted.width_bits() != U32_WIDTH_BITS || encrypted.is_empty() {
            return Err(EncryptionError::Client(format!(
                "provider returned a {}-bit ciphertext of {} bytes, expected a non-empty {}-bit one",
                encrypted.width_bits(),
                encrypted.len(),
                U32_WIDTH_BITS
            ))
            .into());
        }

        debug!("Sensitive field encrypted ({} bytes)", encrypted.len());
        Ok(encrypted)
    }

    async fn submit(
        &self,
        contract_type: ContractType,
        params: &TokenParams,
        encrypted: Option<EncryptedValue>,
    ) -> Result<Submitted, DeployError> {
        let artifact = self
            .artifacts
            .load(self.settings.contract_name(contract_type))
            .await?;

        let args = constructor_args(contract_type, params, encrypted, &artifact)?;
        let data = artifact.encode_deployment(&args)?;

        // The wallet may have moved since validation
        self.check_network()?;
        let signer = self.wallet.signer()?;

        let balance = signer.balance().await?;
        if balance.is_zero() {
            return Err(DeployError::InsufficientFunds(format!(
                "deployer {:?} has no balance",
                signer.address()
            )));
        }

        let gas_price = signer.gas_price().await?;
        if gas_price > self.settings.gas_price_ceiling {
            return Err(DeployError::GasPriceTooHigh {
                current: saturating_u128(gas_price),
                ceiling: saturating_u128(self.settings.gas_price_ceiling),
            });
        }

        let gas_limit = self.settings.gas_limit(contract_type);
        let tx = TransactionRequest::new()
            .data(data)
            .gas(gas_limit)
            .gas_price(gas_price);

        info!(
            "Submitting {} creation from {:?} (gas limit {}, gas price {} wei)",
            artifact.name,
            signer.address(),
            gas_limit,
            gas_price
        );
        let tx_hash = signer.send_transaction(tx).await?;
        info!("Creation transaction sent: {:?}", tx_hash);

        Ok(Submitted { tx_hash })
    }

    /// Poll for the receipt until it arrives or the confirmation window closes.
    async fn await_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt, DeployError> {
        let timeout = self.settings.confirmation_timeout;
        let interval = self.settings.receipt_poll_interval;

        let polling = async {
            loop {
                match self.wallet.transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => debug!("No receipt yet for {:?}", tx_hash),
                    Err(e) => warn!("Receipt query for {:?} failed: {}", tx_hash, e),
                }
                tokio::time::sleep(interval).await;
            }
        };

        match tokio::time::timeout(timeout, polling).await {
            Ok(receipt) => Ok(receipt),
            Err(_) => Err(DeployError::DeploymentTimeout {
                tx_hash: format!("{:?}", tx_hash),
                waited_secs: timeout.as_secs(),
            }),
        }
    }

    async fn finish(
        &self,
        id: u64,
        outcome: Result<(Submitted, TransactionReceipt), DeployError>,
    ) -> DeploymentResult {
        let result = match outcome.and_then(|(submitted, receipt)| into_result(submitted, receipt)) {
            Ok(result) => {
                metrics::DEPLOYMENTS_SUCCEEDED.inc();
                info!(
                    "Attempt {} succeeded: contract={:?}, tx={:?}",
                    id, result.contract_address, result.transaction_hash
                );
                result
            }
            Err(e) => {
                metrics::DEPLOYMENTS_FAILED.inc();
                warn!("Attempt {} failed ({}): {}", id, e.kind(), e);
                DeploymentResult::failed(e)
            }
        };

        let snapshot = {
            let mut current = self.lock_current();
            match current.as_mut() {
                Some(attempt) if attempt.id == id && !attempt.state.is_terminal() => {
                    attempt.state = result.state();
                    attempt.result = Some(result.clone());
                    Some(attempt.snapshot())
                }
                _ => None,
            }
        };

        if let Some(snapshot) = snapshot {
            self.reporter.attempt_state_changed(&snapshot).await;
            self.reporter.deployment_finished(&snapshot).await;
        }
        result
    }

    async fn transition(&self, id: u64, state: DeploymentState) {
        {
            let mut current = self.lock_current();
            if let Some(attempt) = current.as_mut().filter(|a| a.id == id) {
                debug!("Attempt {}: {:?} -> {:?}", id, attempt.state, state);
                attempt.state = state;
            }
        }
        self.report_state(id).await;
    }

    async fn report_state(&self, id: u64) {
        let snapshot = self
            .lock_current()
            .as_ref()
            .filter(|a| a.id == id)
            .map(DeploymentAttempt::snapshot);

        if let Some(snapshot) = snapshot {
            self.reporter.attempt_state_changed(&snapshot).await;
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<DeploymentAttempt>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Constructor arguments in ABI order.
///
/// Sensitive fields only ever enter as [`EncryptedValue`]; the plaintext supply
/// has no path into the argument list.
fn constructor_args(
    contract_type: ContractType,
    params: &TokenParams,
    encrypted: Option<EncryptedValue>,
    artifact: &ContractArtifact,
) -> Result<Vec<Token>, DeployError> {
    let mut args = vec![
        Token::String(params.name.trim().to_string()),
        Token::String(params.symbol.trim().to_string()),
    ];

    match contract_type {
        ContractType::Token => {
            let ciphertext = encrypted.ok_or_else(|| {
                DeployError::from(EncryptionError::Client(
                    "sensitive field reached submission unencrypted".to_string(),
                ))
            })?;
            args.push(Token::Bytes(ciphertext.into_bytes()));
        }
        ContractType::Collection => {
            // Newer collection builds take the metadata base URI in the constructor
            if artifact.constructor_arity() == 3 {
                args.push(Token::String(params.base_uri().unwrap_or_default().to_string()));
            }
        }
    }

    Ok(args)
}

fn saturating_u128(value: U256) -> u128 {
    if value > U256::from(u128::MAX) {
        u128::MAX
    } else {
        value.as_u128()
    }
}

fn into_result(submitted: Submitted, receipt: TransactionReceipt) -> Result<DeploymentResult, DeployError> {
    let tx_hash = format!("{:?}", submitted.tx_hash);

    if receipt.status.map(|s| s.is_zero()).unwrap_or(false) {
        return Err(DeployError::Reverted { tx_hash });
    }

    let contract_address = receipt.contract_address.ok_or_else(|| {
        DeployError::NetworkError(format!("receipt for {} carries no contract address", tx_hash))
    })?;

    Ok(DeploymentResult::succeeded(
        contract_address,
        submitted.tx_hash,
        receipt.gas_used.map(|g| g.low_u64()),
    ))
}
