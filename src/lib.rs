// src/lib.rs
//! Confidential contract deployer for FHE-enabled EVM chains
//!
//! Deploys confidential ERC20 tokens (with an encrypted initial supply) and
//! ERC721 collections through a single, strictly sequential attempt pipeline.

pub mod artifacts;
pub mod config;
pub mod database;
pub mod encryption;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod reporter;
pub mod types;
pub mod verify;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use config::DeployerConfig;
pub use error::{DeployError, EncryptionError, ErrorKind};
pub use orchestrator::{DeploymentOrchestrator, OrchestratorSettings};
pub use types::{ContractType, DeploymentResult, DeploymentState, EncryptedValue, TokenParams};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
