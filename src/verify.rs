// src/verify.rs
//! Post-deployment check: read back name/symbol from a deployed contract

use anyhow::{Context, Result};
use ethers::abi::Abi;
use ethers::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What the chain reports for a deployed contract versus what was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub address: Address,
    pub has_code: bool,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub matches: bool,
}

impl VerificationReport {
    fn new(
        address: Address,
        has_code: bool,
        name: Option<String>,
        symbol: Option<String>,
        expected_name: &str,
        expected_symbol: &str,
    ) -> Self {
        let matches = has_code
            && name.as_deref() == Some(expected_name)
            && symbol.as_deref() == Some(expected_symbol);

        Self {
            address,
            has_code,
            name,
            symbol,
            matches,
        }
    }
}

/// Query `address` over `rpc_url` and compare its metadata with the expected values.
pub async fn verify_deployment(
    rpc_url: &str,
    address: Address,
    abi: Abi,
    expected_name: &str,
    expected_symbol: &str,
) -> Result<VerificationReport> {
    let provider = Arc::new(
        Provider::<Http>::try_from(rpc_url).with_context(|| format!("Invalid RPC URL {}", rpc_url))?,
    );

    let code = provider
        .get_code(address, None)
        .await
        .context("Failed to fetch contract code")?;

    if code.is_empty() {
        warn!("No code at {:?}", address);
        return Ok(VerificationReport::new(address, false, None, None, expected_name, expected_symbol));
    }

    let contract = Contract::new(address, abi, provider);
    let name = read_string(&contract, "name").await;
    let symbol = read_string(&contract, "symbol").await;

    let report = VerificationReport::new(address, true, name, symbol, expected_name, expected_symbol);
    info!(
        "Verified {:?}: name={:?}, symbol={:?}, matches={}",
        address, report.name, report.symbol, report.matches
    );
    Ok(report)
}

async fn read_string(contract: &Contract<Provider<Http>>, method: &str) -> Option<String> {
    let call = match contract.method::<_, String>(method, ()) {
        Ok(call) => call,
        Err(e) => {
            warn!("Contract ABI has no usable {}(): {}", method, e);
            return None;
        }
    };

    match call.call().await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}() call failed: {}", method, e);
            None
        }
    }
}
