// src/reporter.rs
//! Result reporting - where attempt progress and outcomes go
//!
//! The orchestrator only talks to [`ResultReporter`]. Shipped sinks log through
//! tracing or persist a [`DeploymentSummary`] to the record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::DeploymentRecords;
use crate::error::ErrorKind;
use crate::types::{AttemptSnapshot, ContractType};

#[async_trait]
pub trait ResultReporter: Send + Sync {
    /// Called after every state transition, terminal ones included.
    async fn attempt_state_changed(&self, _attempt: &AttemptSnapshot) {}

    /// Called exactly once per accepted attempt, after it reaches a terminal state.
    async fn deployment_finished(&self, attempt: &AttemptSnapshot);
}

/// Flat, serializable record of a finished attempt.
///
/// Carries the public parameters only; the sensitive value is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub attempt_id: u64,
    pub contract_type: ContractType,
    pub name: String,
    pub symbol: String,
    pub success: bool,
    pub contract_address: Option<String>,
    pub transaction_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl DeploymentSummary {
    /// `None` while the attempt is still running.
    pub fn from_attempt(attempt: &AttemptSnapshot) -> Option<Self> {
        let result = attempt.result.as_ref()?;

        Some(Self {
            attempt_id: attempt.id,
            contract_type: attempt.contract_type,
            name: attempt.params.name.clone(),
            symbol: attempt.params.symbol.clone(),
            success: result.success,
            contract_address: result.contract_address.map(|a| format!("{:?}", a)),
            transaction_hash: result.transaction_hash.map(|h| format!("{:?}", h)),
            gas_used: result.gas_used,
            error_kind: result.error.as_ref().map(|e| e.kind()),
            error_message: result.error.as_ref().map(|e| e.to_string()),
            started_at: attempt.started_at,
            completed_at: result.completed_at,
        })
    }
}

/// Logs progress and outcomes.
pub struct TracingReporter;

#[async_trait]
impl ResultReporter for TracingReporter {
    async fn attempt_state_changed(&self, attempt: &AttemptSnapshot) {
        info!("Attempt {} ({}): {:?}", attempt.id, attempt.contract_type, attempt.state);
    }

    async fn deployment_finished(&self, attempt: &AttemptSnapshot) {
        let Some(summary) = DeploymentSummary::from_attempt(attempt) else {
            return;
        };

        if summary.success {
            info!(
                "✓ {} {} deployed at {} (tx {}, gas {})",
                summary.contract_type,
                summary.name,
                summary.contract_address.as_deref().unwrap_or("?"),
                summary.transaction_hash.as_deref().unwrap_or("?"),
                summary.gas_used.unwrap_or_default()
            );
        } else {
            warn!(
                "✗ {} {} failed [{}]: {}",
                summary.contract_type,
                summary.name,
                summary.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                summary.error_message.as_deref().unwrap_or("")
            );
        }
    }
}

/// Persists every finished attempt to the record store.
pub struct RecordingReporter {
    records: DeploymentRecords,
}

impl RecordingReporter {
    pub fn new(records: DeploymentRecords) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ResultReporter for RecordingReporter {
    async fn deployment_finished(&self, attempt: &AttemptSnapshot) {
        let Some(summary) = DeploymentSummary::from_attempt(attempt) else {
            return;
        };

        // A failed write must not change the deployment outcome
        if let Err(e) = self.records.record(&summary).await {
            error!("Failed to record deployment attempt {}: {}", summary.attempt_id, e);
        }
    }
}

/// Forwards to several reporters in order.
#[derive(Default)]
pub struct FanoutReporter {
    sinks: Vec<Arc<dyn ResultReporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ResultReporter>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl ResultReporter for FanoutReporter {
    async fn attempt_state_changed(&self, attempt: &AttemptSnapshot) {
        for sink in &self.sinks {
            sink.attempt_state_changed(attempt).await;
        }
    }

    async fn deployment_finished(&self, attempt: &AttemptSnapshot) {
        for sink in &self.sinks {
            sink.deployment_finished(attempt).await;
        }
    }
}
