// src/main.rs
//! FHEVM Deployer
//!
//! Command-line front end for the deployment pipeline:
//! 1. Deploy confidential tokens and collections
//! 2. Encrypt values against the confidential VM public key
//! 3. Read back deployed contracts and the local deployment history
//! 4. Request decryption, which stays closed until an ACL gateway is configured

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ethers::types::Address;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fhevm_deployer::artifacts::{ArtifactRegistry, HardhatArtifacts};
use fhevm_deployer::database::DeploymentRecords;
use fhevm_deployer::encryption::{
    self, DecryptionRequest, Decryptor, EncryptionProvider, FhevmEncryptor, HttpVmClient, UntrustedValue,
};
use fhevm_deployer::reporter::{DeploymentSummary, FanoutReporter, RecordingReporter, TracingReporter};
use fhevm_deployer::wallet::{LocalKeyProvider, WalletSession};
use fhevm_deployer::{
    metrics, verify, ContractType, DeployerConfig, DeploymentOrchestrator, EncryptedValue,
    OrchestratorSettings, TokenParams, VERSION,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "deployer.toml")]
    config: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    /// Hex private key of the deploying account
    #[arg(long, env = "DEPLOYER_KEY", hide_env_values = true)]
    deployer_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deploy a confidential contract
    Deploy {
        #[command(subcommand)]
        target: DeployTarget,
    },
    /// Encrypt a 32-bit value and print the ciphertext
    Encrypt { value: u64 },
    /// Print the confidential VM public key
    PublicKey,
    /// Check a deployed contract's name and symbol
    Verify {
        #[arg(long)]
        address: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, value_enum, default_value = "token")]
        contract: ContractKind,
    },
    /// Request decryption of an on-chain ciphertext handle
    Decrypt {
        #[arg(long)]
        contract: String,
        #[arg(long)]
        requester: String,
        /// Hex-encoded ciphertext handle
        #[arg(long)]
        handle: String,
        /// Also print the unauthorized numeric preview of the handle
        #[arg(long)]
        preview: bool,
    },
    /// Show recorded deployments
    History {
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

#[derive(Debug, Subcommand)]
enum DeployTarget {
    /// Confidential ERC20 with an encrypted initial supply
    Token {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        /// Initial supply; must fit in 32 bits
        #[arg(long)]
        supply: u64,
    },
    /// Confidential ERC721 collection
    Collection {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        base_uri: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ContractKind {
    Token,
    Collection,
}

impl From<ContractKind> for ContractType {
    fn from(kind: ContractKind) -> Self {
        match kind {
            ContractKind::Token => ContractType::Token,
            ContractKind::Collection => ContractType::Collection,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    info!("🔐 FHEVM Deployer v{}", VERSION);

    let config = DeployerConfig::load(&cli.config).context("Failed to load configuration")?;
    info!("✓ Configuration loaded from {:?}", cli.config);
    info!("  Network: {} (chain {})", config.network.name, config.network.chain_id);

    match cli.command {
        Command::Deploy { target } => {
            let (contract_type, params) = match target {
                DeployTarget::Token { name, symbol, supply } => {
                    (ContractType::Token, TokenParams::token(name, symbol, supply))
                }
                DeployTarget::Collection { name, symbol, base_uri } => {
                    (ContractType::Collection, TokenParams::collection(name, symbol, base_uri))
                }
            };
            cmd_deploy(&config, cli.deployer_key.as_deref(), contract_type, params).await
        }
        Command::Encrypt { value } => cmd_encrypt(&config, value).await,
        Command::PublicKey => cmd_public_key(&config).await,
        Command::Verify {
            address,
            name,
            symbol,
            contract,
        } => cmd_verify(&config, &address, &name, &symbol, contract.into()).await,
        Command::Decrypt {
            contract,
            requester,
            handle,
            preview,
        } => cmd_decrypt(&contract, &requester, &handle, preview).await,
        Command::History { limit } => cmd_history(&config, limit).await,
    }
}

async fn cmd_deploy(
    config: &DeployerConfig,
    deployer_key: Option<&str>,
    contract_type: ContractType,
    params: TokenParams,
) -> Result<()> {
    let key = config
        .deployer_key(deployer_key)
        .context("No deployer key: set DEPLOYER_KEY or [deployer].private_key")?;

    let provider = LocalKeyProvider::new(&config.network.rpc_url, &key, config.network.chain_id)?;
    info!("✓ Deployer account {:?}", provider.address());

    let wallet = Arc::new(WalletSession::new(Arc::new(provider)));
    wallet.connect().await.context("Failed to connect deployer account")?;
    if !wallet.current_network_matches(config.network.chain_id) {
        if let Err(e) = wallet.switch_network(config.network.chain_id).await {
            warn!("Could not switch to chain {}: {}", config.network.chain_id, e);
        }
    }

    let encryption = Arc::new(FhevmEncryptor::new(vm_client(config)?));
    let artifacts = Arc::new(ArtifactRegistry::new(Arc::new(HardhatArtifacts::new(
        config.artifacts.dir.clone(),
    ))));

    let mut reporter = FanoutReporter::new().with(Arc::new(TracingReporter));
    if let Some(path) = &config.records.database_path {
        let records = DeploymentRecords::new(path)
            .await
            .context("Failed to initialize deployment records")?;
        reporter = reporter.with(Arc::new(RecordingReporter::new(records)));
        info!("✓ Recording deployments to {}", path);
    }

    let orchestrator = Arc::new(DeploymentOrchestrator::new(
        wallet,
        encryption,
        artifacts,
        Arc::new(reporter),
        OrchestratorSettings::from_config(config),
    ));

    info!("🚀 Deploying {} {}", contract_type, params.name);
    let result = orchestrator.deploy(contract_type, params).await;

    if let Some(summary) = orchestrator
        .current_attempt()
        .as_ref()
        .and_then(DeploymentSummary::from_attempt)
    {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    debug!("Metrics:\n{}", metrics::render()?);

    match result.error {
        None => Ok(()),
        Some(e) => Err(anyhow::Error::new(e).context("Deployment failed")),
    }
}

async fn cmd_encrypt(config: &DeployerConfig, value: u64) -> Result<()> {
    let encryptor = FhevmEncryptor::new(vm_client(config)?);
    encryptor.initialize().await?;

    let encrypted = encryptor.encrypt_u32(value).await?;
    println!("{}", serde_json::to_string_pretty(&encryption_output(&encrypted))?);
    Ok(())
}

fn encryption_output(encrypted: &EncryptedValue) -> serde_json::Value {
    json!({
        "width_bits": encrypted.width_bits(),
        "bytes": encrypted.len(),
        "ciphertext": encrypted.to_hex(),
    })
}

async fn cmd_public_key(config: &DeployerConfig) -> Result<()> {
    let encryptor = FhevmEncryptor::new(vm_client(config)?);
    encryptor.initialize().await?;

    println!("{}", serde_json::to_string_pretty(&encryptor.public_key().await?)?);
    Ok(())
}

async fn cmd_verify(
    config: &DeployerConfig,
    address: &str,
    name: &str,
    symbol: &str,
    contract_type: ContractType,
) -> Result<()> {
    let address = parse_address(address)?;

    let registry = ArtifactRegistry::new(Arc::new(HardhatArtifacts::new(config.artifacts.dir.clone())));
    let artifact = registry
        .load(config.artifacts.contract_name(contract_type))
        .await?;

    let report =
        verify::verify_deployment(&config.network.rpc_url, address, artifact.abi.clone(), name, symbol)
            .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.matches {
        anyhow::bail!("Contract at {:?} does not match the expected name/symbol", address);
    }
    Ok(())
}

async fn cmd_decrypt(contract: &str, requester: &str, handle: &str, preview: bool) -> Result<()> {
    let request = DecryptionRequest {
        contract: parse_address(contract)?,
        requester: parse_address(requester)?,
        handle: hex::decode(handle.trim_start_matches("0x")).context("Handle is not valid hex")?,
    };

    if preview {
        println!("{}", UntrustedValue::preview(&request.handle));
    }

    let value = encryption::fail_closed().decrypt(&request).await?;
    println!("{}", value);
    Ok(())
}

async fn cmd_history(config: &DeployerConfig, limit: u32) -> Result<()> {
    let path = config
        .records
        .database_path
        .as_deref()
        .context("No [records].database_path configured")?;
    let records = DeploymentRecords::new(path).await?;

    let stats = records.get_stats().await?;
    info!(
        "{} deployments: {} succeeded, {} failed, {} gas used",
        stats.total, stats.succeeded, stats.failed, stats.total_gas_used
    );

    for (contract_type, name, address, tx_hash) in records.recent_deployments(limit).await? {
        println!("{:<10} {:<24} {} {}", contract_type, name, address, tx_hash);
    }
    Ok(())
}

fn parse_address(value: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address {}: {}", value, e))
}

fn vm_client(config: &DeployerConfig) -> Result<HttpVmClient> {
    let client = HttpVmClient::new(
        &config.gateway.url,
        Duration::from_secs(config.gateway.timeout_secs),
    )?;
    Ok(client)
}

fn init_tracing(verbose: bool) -> Result<()> {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // stdout carries the JSON output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fhevm_deployer={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
