// src/metrics.rs
//! Prometheus metrics

use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tracing::warn;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref DEPLOYMENTS_STARTED: IntCounter =
        IntCounter::new("deployments_started", "Deployment attempts accepted").unwrap();
    pub static ref DEPLOYMENTS_SUCCEEDED: IntCounter =
        IntCounter::new("deployments_succeeded", "Deployments confirmed on chain").unwrap();
    pub static ref DEPLOYMENTS_FAILED: IntCounter =
        IntCounter::new("deployments_failed", "Deployment attempts that ended in failure").unwrap();
}

/// Register the counters with [`REGISTRY`]. Safe to call more than once.
pub fn register() {
    for counter in [&*DEPLOYMENTS_STARTED, &*DEPLOYMENTS_SUCCEEDED, &*DEPLOYMENTS_FAILED] {
        register_counter(&REGISTRY, counter);
    }
}

/// Returns whether `counter` is exported by `registry` afterwards.
fn register_counter(registry: &Registry, counter: &IntCounter) -> bool {
    match registry.register(Box::new(counter.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => true,
        Err(e) => {
            warn!("Failed to register metric: {}", e);
            false
        }
    }
}

/// Text exposition of every registered metric.
pub fn render() -> Result<String> {
    register();

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
