// src/artifacts.rs
//! Registry of compiled contract artifacts (ABI + creation bytecode)

use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::DeployError;

/// Compiled contract, validated on load.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
}

/// Where artifact JSON comes from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Raw artifact JSON for `contract_name`, or `None` if the source has nothing.
    async fn fetch(&self, contract_name: &str) -> Result<Option<String>, DeployError>;
}

/// Hardhat build output: `<root>/contracts/<Name>.sol/<Name>.json`.
pub struct HardhatArtifacts {
    root: PathBuf,
}

impl HardhatArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, contract_name: &str) -> PathBuf {
        self.root
            .join("contracts")
            .join(format!("{}.sol", contract_name))
            .join(format!("{}.json", contract_name))
    }
}

#[async_trait]
impl ArtifactSource for HardhatArtifacts {
    async fn fetch(&self, contract_name: &str) -> Result<Option<String>, DeployError> {
        let path = self.path_for(contract_name);
        debug!("Reading artifact {}", path.display());

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DeployError::ArtifactNotFound(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Artifact file format emitted by the compiler.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    abi: serde_json::Value,
    #[serde(default)]
    bytecode: String,
}

impl ContractArtifact {
    /// Parse and validate artifact JSON.
    pub fn parse(requested_name: &str, content: &str) -> Result<Self, DeployError> {
        let malformed = |reason: String| {
            DeployError::ArtifactMalformed(format!("{}: {}", requested_name, reason))
        };

        let raw: RawArtifact = serde_json::from_str(content)
            .map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

        let abi_is_empty = match &raw.abi {
            serde_json::Value::Null => true,
            serde_json::Value::Array(entries) => entries.is_empty(),
            _ => false,
        };
        if abi_is_empty {
            return Err(malformed("interface description is empty".to_string()));
        }

        let abi: Abi = serde_json::from_value(raw.abi)
            .map_err(|e| malformed(format!("interface description does not parse: {}", e)))?;

        let hex_code = raw.bytecode.trim().trim_start_matches("0x");
        if hex_code.is_empty() {
            return Err(malformed("bytecode is empty".to_string()));
        }
        let bytecode = hex::decode(hex_code)
            .map_err(|e| malformed(format!("bytecode is not valid hex (unlinked library?): {}", e)))?;

        Ok(Self {
            name: raw.contract_name.unwrap_or_else(|| requested_name.to_string()),
            abi,
            bytecode: bytecode.into(),
        })
    }

    /// Number of constructor inputs; zero when the ABI declares no constructor.
    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor()
            .map(|c| c.inputs.len())
            .unwrap_or(0)
    }

    /// Creation bytecode with ABI-encoded constructor arguments appended.
    pub fn encode_deployment(&self, args: &[Token]) -> Result<Bytes, DeployError> {
        let arity = self.constructor_arity();
        if arity != args.len() {
            return Err(DeployError::ArtifactMalformed(format!(
                "{}: constructor takes {} arguments, {} supplied",
                self.name,
                arity,
                args.len()
            )));
        }

        match self.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(self.bytecode.to_vec(), args)
                .map(Bytes::from)
                .map_err(|e| {
                    DeployError::ArtifactMalformed(format!(
                        "{}: constructor arguments do not match ABI: {}",
                        self.name, e
                    ))
                }),
            None => Ok(self.bytecode.clone()),
        }
    }
}

/// Loads artifacts once per name and caches successful loads for the process lifetime.
pub struct ArtifactRegistry {
    source: Arc<dyn ArtifactSource>,
    cache: RwLock<HashMap<String, Arc<ContractArtifact>>>,
}

impl ArtifactRegistry {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load(&self, contract_name: &str) -> Result<Arc<ContractArtifact>, DeployError> {
        if let Some(artifact) = self.cache.read().await.get(contract_name) {
            return Ok(Arc::clone(artifact));
        }

        let content = self
            .source
            .fetch(contract_name)
            .await?
            .ok_or_else(|| DeployError::ArtifactNotFound(contract_name.to_string()))?;

        // Malformed artifacts return here and never reach the cache
        let artifact = Arc::new(ContractArtifact::parse(contract_name, &content)?);

        let mut cache = self.cache.write().await;
        let cached = cache
            .entry(contract_name.to_string())
            .or_insert_with(|| Arc::clone(&artifact));

        info!(
            "Loaded artifact {} ({} bytes of bytecode, {} constructor inputs)",
            cached.name,
            cached.bytecode.len(),
            cached.constructor_arity()
        );
        Ok(Arc::clone(cached))
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
