// src/config.rs
//! Deployer configuration - target network, gas policy, artifact and gateway locations

use anyhow::{Context, Result};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::ContractType;

/// Sepolia chain id; the confidential VM testnet is hosted there.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

const WEI_PER_GWEI: u64 = 1_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// Chain to deploy to
    pub network: NetworkConfig,

    /// Signing credential for unattended runs
    #[serde(default)]
    pub deployer: DeployerKeyConfig,

    /// Compiled contract artifacts
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Confidential VM gateway
    pub gateway: GatewayConfig,

    /// Submission and confirmation policy
    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// Deployment record store
    #[serde(default)]
    pub records: RecordsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,

    /// JSON-RPC endpoint for submission and receipts
    pub rpc_url: String,

    /// Max gas price (in gwei)
    #[serde(default = "default_gas_price_ceiling")]
    pub gas_price_ceiling_gwei: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployerKeyConfig {
    /// Hex private key; prefer the DEPLOYER_KEY environment variable
    #[serde(default)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Hardhat artifacts root (`<dir>/contracts/<Name>.sol/<Name>.json`)
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_token_contract")]
    pub token_contract: String,

    #[serde(default = "default_collection_contract")]
    pub collection_contract: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_receipt_poll_interval")]
    pub receipt_poll_interval_ms: u64,

    #[serde(default = "default_gas_limit")]
    pub token_gas_limit: u64,

    #[serde(default = "default_gas_limit")]
    pub collection_gas_limit: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// Sqlite file for deployment summaries; disabled when absent
    #[serde(default)]
    pub database_path: Option<String>,
}

// Default values
fn default_gas_price_ceiling() -> u64 {
    20
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_token_contract() -> String {
    "ConfidentialERC20".to_string()
}

fn default_collection_contract() -> String {
    "ConfidentialERC721".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_confirmation_timeout() -> u64 {
    300
}

fn default_receipt_poll_interval() -> u64 {
    2_000
}

fn default_gas_limit() -> u64 {
    // FHE-enabled constructors are far heavier than plain ERC20/721 ones
    5_000_000
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            token_contract: default_token_contract(),
            collection_contract: default_collection_contract(),
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout(),
            receipt_poll_interval_ms: default_receipt_poll_interval(),
            token_gas_limit: default_gas_limit(),
            collection_gas_limit: default_gas_limit(),
        }
    }
}

impl NetworkConfig {
    /// Sepolia preset with the given RPC endpoint.
    pub fn sepolia(rpc_url: impl Into<String>) -> Self {
        Self {
            name: "sepolia".to_string(),
            chain_id: SEPOLIA_CHAIN_ID,
            rpc_url: rpc_url.into(),
            gas_price_ceiling_gwei: default_gas_price_ceiling(),
        }
    }

    pub fn gas_price_ceiling_wei(&self) -> U256 {
        U256::from(self.gas_price_ceiling_gwei) * U256::from(WEI_PER_GWEI)
    }
}

impl DeploymentConfig {
    /// Fixed gas ceiling for a contract type. Never derived from an estimate.
    pub fn gas_limit(&self, contract_type: ContractType) -> u64 {
        match contract_type {
            ContractType::Token => self.token_gas_limit,
            ContractType::Collection => self.collection_gas_limit,
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

impl ArtifactsConfig {
    pub fn contract_name(&self, contract_type: ContractType) -> &str {
        match contract_type {
            ContractType::Token => &self.token_contract,
            ContractType::Collection => &self.collection_contract,
        }
    }
}

impl DeployerConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DeployerConfig = toml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            anyhow::bail!("RPC URL for network {} cannot be empty", self.network.name);
        }

        if self.network.chain_id == 0 {
            anyhow::bail!("Chain ID must be greater than 0");
        }

        if self.network.gas_price_ceiling_gwei == 0 {
            anyhow::bail!("Gas price ceiling must be greater than 0");
        }

        if self.gateway.url.is_empty() {
            anyhow::bail!("Gateway URL cannot be empty");
        }

        if self.deployment.token_gas_limit == 0 || self.deployment.collection_gas_limit == 0 {
            anyhow::bail!("Gas limits must be greater than 0");
        }

        if self.deployment.confirmation_timeout_secs == 0 {
            anyhow::bail!("Confirmation timeout must be greater than 0");
        }

        if self.deployment.receipt_poll_interval_ms == 0 {
            anyhow::bail!("Receipt poll interval must be greater than 0");
        }

        Ok(())
    }

    /// Resolve the signing key, letting an explicit override (env/CLI) win.
    pub fn deployer_key(&self, override_key: Option<&str>) -> Option<String> {
        override_key
            .map(str::to_owned)
            .or_else(|| self.deployer.private_key.clone())
            .filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[network]
name = "sepolia"
chain_id = 11155111
rpc_url = "https://sepolia.example.org"

[gateway]
url = "https://gateway.sepolia.example.org"

[deployment]
confirmation_timeout_secs = 120
"#;

    #[test]
    fn test_config_defaults() {
        let config = DeployerConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.network.chain_id, SEPOLIA_CHAIN_ID);
        assert_eq!(config.network.gas_price_ceiling_gwei, 20);
        assert_eq!(
            config.network.gas_price_ceiling_wei(),
            U256::from(20_000_000_000u64)
        );
        assert_eq!(config.deployment.confirmation_timeout(), Duration::from_secs(120));
        assert_eq!(config.deployment.gas_limit(ContractType::Token), 5_000_000);
        assert_eq!(config.artifacts.contract_name(ContractType::Collection), "ConfidentialERC721");
        assert!(config.records.database_path.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DeployerConfig::from_toml(SAMPLE).unwrap();
        assert!(config.validate().is_ok());

        config.deployment.token_gas_limit = 0;
        assert!(config.validate().is_err());

        let mut config = DeployerConfig::from_toml(SAMPLE).unwrap();
        config.gateway.url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deployer_key_override() {
        let mut config = DeployerConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.deployer_key(None), None);

        config.deployer.private_key = Some("0xabc".to_string());
        assert_eq!(config.deployer_key(None).as_deref(), Some("0xabc"));
        assert_eq!(config.deployer_key(Some("0xdef")).as_deref(), Some("0xdef"));
    }
}
