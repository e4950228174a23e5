// src/encryption/client.rs
//! Client for the confidential VM encryption service
//! The official FHE SDK runs as a local service; we only speak its HTTP API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EncryptionError;
use crate::types::PublicKeyMaterial;

/// Narrow interface of the confidential VM client.
#[async_trait]
pub trait ConfidentialVmClient: Send + Sync {
    async fn initialize(&self) -> Result<(), EncryptionError>;

    async fn public_key(&self) -> Result<PublicKeyMaterial, EncryptionError>;

    /// Encrypt `value` as a `width_bits` unsigned integer under `key`.
    async fn encrypt(
        &self,
        key: &PublicKeyMaterial,
        width_bits: u16,
        value: u64,
    ) -> Result<Vec<u8>, EncryptionError>;
}

pub struct HttpVmClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct EncryptRequest<'a> {
    key_id: &'a str,
    width: u16,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EncryptResponse {
    ciphertext: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

impl HttpVmClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EncryptionError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        match reqwest::Url::parse(&base_url) {
            Ok(url) => {
                let local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("::1"));
                if !local {
                    // Plaintext crosses this connection before it is encrypted
                    warn!("Confidential VM client at {} is not on the loopback interface", base_url);
                }
            }
            Err(e) => {
                return Err(EncryptionError::Client(format!("invalid client URL {}: {}", base_url, e)))
            }
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(client_error)?;

        Ok(Self { base_url, client })
    }
}

fn client_error(err: impl std::fmt::Display) -> EncryptionError {
    EncryptionError::Client(err.to_string())
}

#[async_trait]
impl ConfidentialVmClient for HttpVmClient {
    async fn initialize(&self) -> Result<(), EncryptionError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(client_error)?;

        if !response.status().is_success() {
            return Err(client_error(format!("health check failed: {}", response.status())));
        }

        let health: HealthResponse = response.json().await.map_err(client_error)?;
        info!("Confidential VM client at {} reports {}", self.base_url, health.status);
        Ok(())
    }

    async fn public_key(&self) -> Result<PublicKeyMaterial, EncryptionError> {
        let url = format!("{}/keys/public", self.base_url);
        let response = self.client.get(&url).send().await.map_err(client_error)?;

        if !response.status().is_success() {
            return Err(client_error(format!("failed to fetch public key: {}", response.status())));
        }

        response.json().await.map_err(client_error)
    }

    async fn encrypt(
        &self,
        key: &PublicKeyMaterial,
        width_bits: u16,
        value: u64,
    ) -> Result<Vec<u8>, EncryptionError> {
        let url = format!("{}/encrypt", self.base_url);
        debug!("Requesting {}-bit encryption under key {}", width_bits, key.key_id);

        let response = self
            .client
            .post(&url)
            .json(&EncryptRequest {
                key_id: &key.key_id,
                width: width_bits,
                value,
            })
            .send()
            .await
            .map_err(client_error)?;

        if !response.status().is_success() {
            return Err(client_error(format!("encryption failed: {}", response.status())));
        }

        let body: EncryptResponse = response.json().await.map_err(client_error)?;
        hex::decode(body.ciphertext.trim_start_matches("0x")).map_err(client_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_url_normalization() {
        let client = HttpVmClient::new("http://127.0.0.1:8787/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:8787");
    }

    #[test]
    fn test_client_rejects_invalid_url() {
        assert!(matches!(
            HttpVmClient::new("not a url", Duration::from_secs(5)),
            Err(EncryptionError::Client(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_client_reports_client_error() {
        // Port 9 (discard) is closed on test machines
        let client = HttpVmClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(client.initialize().await, Err(EncryptionError::Client(_))));
    }
}
