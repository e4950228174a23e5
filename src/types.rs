// src/types.rs
//! Data model shared by the deployment pipeline

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Plaintext width of every ciphertext this pipeline produces.
pub const U32_WIDTH_BITS: u16 = 32;

/// The two confidential contract families the deployer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    /// ERC20-style token; the initial supply is an encrypted constructor argument.
    Token,
    /// ERC721-style collection; carries no encrypted field.
    Collection,
}

impl ContractType {
    /// Whether the constructor takes an encrypted supply.
    pub fn has_sensitive_field(&self) -> bool {
        matches!(self, ContractType::Token)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Token => "token",
            ContractType::Collection => "collection",
        }
    }
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied deployment parameters.
///
/// `sensitive_value` is taken as the raw unsigned input so that values beyond
/// 32 bits reach the encryption step and are rejected there with
/// `InvalidRange` instead of being truncated at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub sensitive_value: Option<u64>,
    #[serde(default)]
    pub base_uri: Option<String>,
}

impl TokenParams {
    pub fn token(name: impl Into<String>, symbol: impl Into<String>, supply: u64) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            sensitive_value: Some(supply),
            base_uri: None,
        }
    }

    pub fn collection(
        name: impl Into<String>,
        symbol: impl Into<String>,
        base_uri: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            sensitive_value: None,
            base_uri,
        }
    }

    /// Check field presence and shape for the given contract type.
    pub fn validate(&self, contract_type: ContractType) -> Result<(), DeployError> {
        if self.name.trim().is_empty() {
            return Err(DeployError::InvalidParams("name must not be empty".to_string()));
        }
        if self.symbol.trim().is_empty() {
            return Err(DeployError::InvalidParams("symbol must not be empty".to_string()));
        }

        match (contract_type.has_sensitive_field(), self.sensitive_value) {
            (true, None) => {
                return Err(DeployError::InvalidParams(
                    "token contracts require an initial supply".to_string(),
                ))
            }
            (false, Some(_)) => {
                return Err(DeployError::InvalidParams(
                    "collection contracts carry no encrypted field".to_string(),
                ))
            }
            _ => {}
        }

        if let Some(uri) = self.base_uri() {
            reqwest::Url::parse(uri).map_err(|e| {
                DeployError::InvalidParams(format!("base URI {:?} is not a valid URI: {}", uri, e))
            })?;
        }

        Ok(())
    }

    /// Base URI, treating an empty form field as absent.
    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }
}

/// Ciphertext produced by the confidential VM client.
///
/// Always paired with the plaintext width it encodes. `Debug` is redacted so the
/// bytes never end up in logs by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    ciphertext: Vec<u8>,
    width_bits: u16,
}

impl EncryptedValue {
    pub fn new(ciphertext: Vec<u8>, width_bits: u16) -> Self {
        Self {
            ciphertext,
            width_bits,
        }
    }

    pub fn width_bits(&self) -> u16 {
        self.width_bits
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn len(&self) -> usize {
        self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// `0x`-prefixed hex, for handing the ciphertext to other tooling.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.ciphertext))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.ciphertext
    }
}

impl std::fmt::Debug for EncryptedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedValue")
            .field("width_bits", &self.width_bits)
            .field("len", &self.ciphertext.len())
            .finish()
    }
}

/// Public key material handed out by the confidential VM client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyMaterial {
    /// Opaque key identifier as reported by the gateway.
    pub key_id: String,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// Progress of a single deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Idle,
    Validating,
    Encrypting,
    Submitting,
    Confirming,
    Succeeded,
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Succeeded | DeploymentState::Failed)
    }
}

/// Terminal outcome of a deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub success: bool,
    pub contract_address: Option<Address>,
    pub transaction_hash: Option<H256>,
    pub gas_used: Option<u64>,
    pub error: Option<DeployError>,
    pub completed_at: DateTime<Utc>,
}

impl DeploymentResult {
    pub fn succeeded(contract_address: Address, transaction_hash: H256, gas_used: Option<u64>) -> Self {
        Self {
            success: true,
            contract_address: Some(contract_address),
            transaction_hash: Some(transaction_hash),
            gas_used,
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(error: DeployError) -> Self {
        Self {
            success: false,
            contract_address: None,
            transaction_hash: None,
            gas_used: None,
            error: Some(error),
            completed_at: Utc::now(),
        }
    }

    pub fn state(&self) -> DeploymentState {
        if self.success {
            DeploymentState::Succeeded
        } else {
            DeploymentState::Failed
        }
    }
}

/// Immutable view of a deployment attempt handed to reporters.
#[derive(Debug, Clone)]
pub struct AttemptSnapshot {
    pub id: u64,
    pub contract_type: ContractType,
    pub params: TokenParams,
    pub state: DeploymentState,
    pub started_at: DateTime<Utc>,
    pub result: Option<DeploymentResult>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
