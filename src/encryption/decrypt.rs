// src/encryption/decrypt.rs
//! Decryption path - fails closed until the gateway authorization protocol is wired in
//!
//! No plaintext is released without a positive ACL answer. The only interim
//! numeric view is [`UntrustedValue`], which cannot be turned into a verified value.

use async_trait::async_trait;
use ethers::types::Address;
use tracing::warn;

use crate::error::DeployError;

/// A request to reveal an encrypted on-chain value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionRequest {
    /// Contract holding the ciphertext handle
    pub contract: Address,
    /// Account asking for the plaintext
    pub requester: Address,
    pub handle: Vec<u8>,
}

/// Access Control List check performed by the confidential VM gateway.
#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn is_allowed(&self, request: &DecryptionRequest) -> Result<bool, DeployError>;
}

#[async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(&self, request: &DecryptionRequest) -> Result<u32, DeployError>;
}

/// ACL used until the gateway's authorization contract is specified: denies everything.
pub struct UnconfiguredAcl;

#[async_trait]
impl AccessControl for UnconfiguredAcl {
    async fn is_allowed(&self, _request: &DecryptionRequest) -> Result<bool, DeployError> {
        Err(DeployError::NotAuthorized(
            "gateway authorization protocol is not configured".to_string(),
        ))
    }
}

/// Placeholder behind the gate until a key-release service exists.
pub struct UnavailableDecryptor;

#[async_trait]
impl Decryptor for UnavailableDecryptor {
    async fn decrypt(&self, _request: &DecryptionRequest) -> Result<u32, DeployError> {
        Err(DeployError::NotAuthorized(
            "no decryption service is configured".to_string(),
        ))
    }
}

/// Default decryption path: unconfigured ACL in front of no decryptor.
pub fn fail_closed() -> GatedDecryptor<UnconfiguredAcl, UnavailableDecryptor> {
    GatedDecryptor::new(UnconfiguredAcl, UnavailableDecryptor)
}

/// Runs the ACL check before handing the request to the inner decryptor.
pub struct GatedDecryptor<A, D> {
    acl: A,
    inner: D,
}

impl<A: AccessControl, D: Decryptor> GatedDecryptor<A, D> {
    pub fn new(acl: A, inner: D) -> Self {
        Self { acl, inner }
    }
}

#[async_trait]
impl<A: AccessControl, D: Decryptor> Decryptor for GatedDecryptor<A, D> {
    async fn decrypt(&self, request: &DecryptionRequest) -> Result<u32, DeployError> {
        match self.acl.is_allowed(request).await {
            Ok(true) => self.inner.decrypt(request).await,
            Ok(false) => Err(DeployError::NotAuthorized(format!(
                "{:?} may not decrypt handles of {:?}",
                request.requester, request.contract
            ))),
            Err(DeployError::NotAuthorized(reason)) => Err(DeployError::NotAuthorized(reason)),
            Err(e) => {
                warn!("ACL check could not be performed: {}", e);
                Err(DeployError::NotAuthorized(format!("ACL check failed: {}", e)))
            }
        }
    }
}

/// A number read straight out of a payload without any authorization.
///
/// Display-only. There is deliberately no accessor returning a bare `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntrustedValue(u32);

impl UntrustedValue {
    /// First four bytes, big-endian; zero for shorter payloads.
    pub fn preview(payload: &[u8]) -> Self {
        let value = payload
            .get(..4)
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
            .map(u32::from_be_bytes)
            .unwrap_or(0);
        Self(value)
    }
}

impl std::fmt::Display for UntrustedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (untrusted)", self.0)
    }
}
