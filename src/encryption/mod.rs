// src/encryption/mod.rs
//! Encryption of sensitive constructor fields for the confidential VM
//!
//! The FHE scheme itself lives behind [`ConfidentialVmClient`]; this module only
//! enforces correct use of it: range checks, declared widths, one-time setup.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::EncryptionError;
use crate::types::{EncryptedValue, PublicKeyMaterial, U32_WIDTH_BITS};

pub mod client;
pub mod decrypt;

pub use client::{ConfidentialVmClient, HttpVmClient};
pub use decrypt::{
    fail_closed, AccessControl, DecryptionRequest, Decryptor, GatedDecryptor, UnavailableDecryptor,
    UnconfiguredAcl, UntrustedValue,
};

#[async_trait]
pub trait EncryptionProvider: Send + Sync {
    /// One-time client setup. Safe to call repeatedly.
    async fn initialize(&self) -> Result<(), EncryptionError>;

    /// Encrypt a value into a 32-bit ciphertext.
    ///
    /// Input is taken wider than `u32` so callers can hand over raw user input;
    /// anything above `u32::MAX` fails with `InvalidRange`.
    async fn encrypt_u32(&self, value: u64) -> Result<EncryptedValue, EncryptionError>;

    async fn public_key(&self) -> Result<PublicKeyMaterial, EncryptionError>;
}

/// Narrow a raw value to the 32-bit plaintext domain.
pub fn ensure_u32(value: u64) -> Result<u32, EncryptionError> {
    u32::try_from(value).map_err(|_| EncryptionError::InvalidRange { value })
}

/// Encryption provider backed by a confidential VM client.
///
/// The public key fetched during `initialize` is cached; later calls reuse it.
pub struct FhevmEncryptor<C> {
    client: C,
    ready: OnceCell<PublicKeyMaterial>,
}

impl<C: ConfidentialVmClient> FhevmEncryptor<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            ready: OnceCell::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }
}

#[async_trait]
impl<C: ConfidentialVmClient> EncryptionProvider for FhevmEncryptor<C> {
    async fn initialize(&self) -> Result<(), EncryptionError> {
        self.ready
            .get_or_try_init(|| async {
                self.client.initialize().await?;
                let key = self.client.public_key().await?;
                info!("Confidential VM client ready (key {})", key.key_id);
                Ok::<_, EncryptionError>(key)
            })
            .await?;
        Ok(())
    }

    async fn encrypt_u32(&self, value: u64) -> Result<EncryptedValue, EncryptionError> {
        let plaintext = ensure_u32(value)?;
        let key = self.ready.get().ok_or(EncryptionError::NotInitialized)?;

        let ciphertext = self
            .client
            .encrypt(key, U32_WIDTH_BITS, u64::from(plaintext))
            .await?;

        if ciphertext.is_empty() {
            return Err(EncryptionError::Client("client returned an empty ciphertext".to_string()));
        }

        debug!("Encrypted {}-bit value into {} bytes", U32_WIDTH_BITS, ciphertext.len());
        Ok(EncryptedValue::new(ciphertext, U32_WIDTH_BITS))
    }

    async fn public_key(&self) -> Result<PublicKeyMaterial, EncryptionError> {
        self.ready.get().cloned().ok_or(EncryptionError::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVmClient;

    #[test]
    fn test_ensure_u32_bounds() {
        assert_eq!(ensure_u32(0), Ok(0));
        assert_eq!(ensure_u32(u32::MAX as u64), Ok(u32::MAX));
        assert_eq!(
            ensure_u32(u32::MAX as u64 + 1),
            Err(EncryptionError::InvalidRange { value: 4_294_967_296 })
        );
        assert!(ensure_u32(u64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let client = FakeVmClient::default();
        let encryptor = FhevmEncryptor::new(client.clone());

        assert!(!encryptor.is_ready());
        encryptor.initialize().await.unwrap();
        let first = encryptor.public_key().await.unwrap();
        encryptor.initialize().await.unwrap();
        let second = encryptor.public_key().await.unwrap();

        assert!(encryptor.is_ready());
        assert_eq!(first, second);
        assert_eq!(client.init_calls(), 1);
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let encryptor = FhevmEncryptor::new(FakeVmClient::default());

        assert_eq!(encryptor.public_key().await, Err(EncryptionError::NotInitialized));
        assert_eq!(encryptor.encrypt_u32(7).await, Err(EncryptionError::NotInitialized));
    }

    #[tokio::test]
    async fn test_encrypt_range_and_width() {
        let encryptor = FhevmEncryptor::new(FakeVmClient::default());
        encryptor.initialize().await.unwrap();

        for value in [0u64, 1, 1_000_000, u32::MAX as u64] {
            let encrypted = encryptor.encrypt_u32(value).await.unwrap();
            assert_eq!(encrypted.width_bits(), 32);
            assert!(!encrypted.is_empty());
        }

        for value in [u32::MAX as u64 + 1, 5_000_000_000, u64::MAX] {
            assert_eq!(
                encryptor.encrypt_u32(value).await,
                Err(EncryptionError::InvalidRange { value })
            );
        }
    }

    #[tokio::test]
    async fn test_ciphertext_never_contains_plaintext_encoding() {
        let encryptor = FhevmEncryptor::new(FakeVmClient::default());
        encryptor.initialize().await.unwrap();

        let encrypted = encryptor.encrypt_u32(1_000_000).await.unwrap();
        assert_ne!(encrypted.as_bytes(), &1_000_000u32.to_be_bytes()[..]);
    }

    #[tokio::test]
    async fn test_failed_initialize_can_be_retried() {
        let client = FakeVmClient::default();
        client.fail_next_init();
        let encryptor = FhevmEncryptor::new(client.clone());

        assert!(encryptor.initialize().await.is_err());
        assert!(!encryptor.is_ready());
        encryptor.initialize().await.unwrap();
        assert!(encryptor.is_ready());
    }
}
