// src/error.rs
//! Error taxonomy for the deployment pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by an [`EncryptionProvider`](crate::encryption::EncryptionProvider).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Value {value} is outside the 32-bit unsigned range")]
    InvalidRange { value: u64 },

    #[error("Encryption client not initialized")]
    NotInitialized,

    #[error("Confidential VM client error: {0}")]
    Client(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    #[error("Wallet not connected")]
    NotConnected,

    #[error("Wallet is on chain {actual:?}, expected chain {expected}")]
    WrongNetwork { expected: u64, actual: Option<u64> },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact malformed: {0}")]
    ArtifactMalformed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailure(#[from] EncryptionError),

    #[error("No wallet provider available")]
    WalletUnavailable,

    #[error("User rejected the request")]
    UserRejected,

    #[error("Network switch rejected")]
    NetworkSwitchRejected,

    #[error("Network switch not supported by provider")]
    NetworkSwitchUnsupported,

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Gas price {current} wei exceeds ceiling {ceiling} wei")]
    GasPriceTooHigh { current: u128, ceiling: u128 },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Transaction {tx_hash} was included but reverted")]
    Reverted { tx_hash: String },

    #[error("No receipt for transaction {tx_hash} after {waited_secs}s; outcome unresolved")]
    DeploymentTimeout { tx_hash: String, waited_secs: u64 },

    #[error("Not authorized to decrypt: {0}")]
    NotAuthorized(String),

    #[error("Another deployment attempt ({0}) is still in flight")]
    AttemptInFlight(u64),
}

/// Flat classification of a [`DeployError`], stable enough to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConnected,
    WrongNetwork,
    InvalidParams,
    ArtifactNotFound,
    ArtifactMalformed,
    EncryptionFailure,
    WalletUnavailable,
    UserRejected,
    NetworkSwitchRejected,
    NetworkSwitchUnsupported,
    InsufficientFunds,
    GasPriceTooHigh,
    NetworkError,
    Reverted,
    DeploymentTimeout,
    NotAuthorized,
    AttemptInFlight,
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::NotConnected => ErrorKind::NotConnected,
            DeployError::WrongNetwork { .. } => ErrorKind::WrongNetwork,
            DeployError::InvalidParams(_) => ErrorKind::InvalidParams,
            DeployError::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            DeployError::ArtifactMalformed(_) => ErrorKind::ArtifactMalformed,
            DeployError::EncryptionFailure(_) => ErrorKind::EncryptionFailure,
            DeployError::WalletUnavailable => ErrorKind::WalletUnavailable,
            DeployError::UserRejected => ErrorKind::UserRejected,
            DeployError::NetworkSwitchRejected => ErrorKind::NetworkSwitchRejected,
            DeployError::NetworkSwitchUnsupported => ErrorKind::NetworkSwitchUnsupported,
            DeployError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            DeployError::GasPriceTooHigh { .. } => ErrorKind::GasPriceTooHigh,
            DeployError::NetworkError(_) => ErrorKind::NetworkError,
            DeployError::Reverted { .. } => ErrorKind::Reverted,
            DeployError::DeploymentTimeout { .. } => ErrorKind::DeploymentTimeout,
            DeployError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            DeployError::AttemptInFlight(_) => ErrorKind::AttemptInFlight,
        }
    }

    /// Map a provider/RPC failure message onto the submission taxonomy.
    ///
    /// JSON-RPC nodes and wallets report these conditions only as text, so the
    /// match is on well-known fragments (`insufficient funds`, EIP-1193 code 4001).
    pub fn from_submission_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
            DeployError::InsufficientFunds(message)
        } else if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("code: 4001")
            || lower.contains("\"code\":4001")
        {
            DeployError::UserRejected
        } else {
            DeployError::NetworkError(message)
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&name)
    }
}
