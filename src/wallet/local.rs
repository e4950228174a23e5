// src/wallet/local.rs
//! Key-backed wallet provider for unattended deployments
//! Signs locally with the deployer key and talks plain JSON-RPC to the node

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use tracing::debug;

use super::WalletProvider;
use crate::error::DeployError;

pub struct LocalKeyProvider {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
}

impl LocalKeyProvider {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC URL {}", rpc_url))?;
        let wallet: LocalWallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .context("Invalid deployer private key")?;
        let client = SignerMiddleware::new(provider, wallet.with_chain_id(chain_id));

        Ok(Self { client })
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }
}

fn rpc_error(err: impl std::fmt::Display) -> DeployError {
    DeployError::NetworkError(err.to_string())
}

#[async_trait]
impl WalletProvider for LocalKeyProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, DeployError> {
        Ok(vec![self.client.address()])
    }

    async fn chain_id(&self) -> Result<u64, DeployError> {
        let chain_id = self.client.get_chainid().await.map_err(rpc_error)?;
        Ok(chain_id.as_u64())
    }

    async fn switch_chain(&self, _chain_id: u64) -> Result<(), DeployError> {
        // The node decides the chain; a raw key cannot move it
        Err(DeployError::NetworkSwitchUnsupported)
    }

    async fn balance(&self, account: Address) -> Result<U256, DeployError> {
        self.client.get_balance(account, None).await.map_err(rpc_error)
    }

    async fn gas_price(&self) -> Result<U256, DeployError> {
        self.client.get_gas_price().await.map_err(rpc_error)
    }

    async fn send_transaction(
        &self,
        from: Address,
        tx: TransactionRequest,
    ) -> Result<H256, DeployError> {
        if from != self.client.address() {
            return Err(DeployError::NotConnected);
        }

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| DeployError::from_submission_message(e.to_string()))?;

        let tx_hash = pending.tx_hash();
        debug!("Transaction accepted by node: {:?}", tx_hash);
        Ok(tx_hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, DeployError> {
        self.client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_error)
    }
}
