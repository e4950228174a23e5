// src/database.rs
//! Deployment record store
//! One row per finished attempt; never holds plaintext or ciphertext

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::reporter::DeploymentSummary;

#[derive(Clone)]
pub struct DeploymentRecords {
    pool: SqlitePool,
}

/// Aggregate view over all recorded attempts
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeploymentStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_gas_used: u64,
}

impl DeploymentRecords {
    pub async fn new(path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Self::create_tables(&pool).await?;

        info!("Deployment records initialized at {}", path);

        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS deployments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                attempt_id INTEGER NOT NULL,
                contract_type TEXT NOT NULL,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                success INTEGER NOT NULL,
                contract_address TEXT,
                tx_hash TEXT,
                gas_used INTEGER,
                error_kind TEXT,
                error_message TEXT,
                started_at INTEGER NOT NULL,
                completed_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_deployments_completed
             ON deployments(completed_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a finished attempt
    pub async fn record(&self, summary: &DeploymentSummary) -> Result<()> {
        sqlx::query(
            "INSERT INTO deployments
             (attempt_id, contract_type, name, symbol, success, contract_address, tx_hash,
              gas_used, error_kind, error_message, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(summary.attempt_id as i64)
        .bind(summary.contract_type.as_str())
        .bind(&summary.name)
        .bind(&summary.symbol)
        .bind(summary.success as i32)
        .bind(&summary.contract_address)
        .bind(&summary.transaction_hash)
        .bind(summary.gas_used.map(|g| g as i64))
        .bind(summary.error_kind.map(|k| k.to_string()))
        .bind(&summary.error_message)
        .bind(summary.started_at.timestamp())
        .bind(summary.completed_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_stats(&self) -> Result<DeploymentStats> {
        let (total, succeeded, gas): (i64, Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), SUM(success), SUM(gas_used) FROM deployments",
        )
        .fetch_one(&self.pool)
        .await?;

        let succeeded = succeeded.unwrap_or(0) as u64;
        Ok(DeploymentStats {
            total: total as u64,
            succeeded,
            failed: total as u64 - succeeded,
            total_gas_used: gas.unwrap_or(0) as u64,
        })
    }

    /// Most recent successful deployments: (contract_type, name, address, tx_hash)
    pub async fn recent_deployments(&self, limit: u32) -> Result<Vec<(String, String, String, String)>> {
        let rows = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT contract_type, name, contract_address, tx_hash
             FROM deployments
             WHERE success = 1
             ORDER BY completed_at DESC, id DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeployError, ErrorKind};
    use crate::types::ContractType;
    use chrono::Utc;

    fn summary(attempt_id: u64, error: Option<DeployError>) -> DeploymentSummary {
        DeploymentSummary {
            attempt_id,
            contract_type: ContractType::Token,
            name: "Token".to_string(),
            symbol: "TKN".to_string(),
            success: error.is_none(),
            contract_address: error.is_none().then(|| format!("0x{:040x}", attempt_id)),
            transaction_hash: error.is_none().then(|| format!("0x{:064x}", attempt_id)),
            gas_used: error.is_none().then_some(1_000),
            error_kind: error.as_ref().map(DeployError::kind),
            error_message: error.map(|e| e.to_string()),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.db");
        let records = DeploymentRecords::new(path.to_str().unwrap()).await.unwrap();

        records.record(&summary(1, None)).await.unwrap();
        records.record(&summary(2, Some(DeployError::UserRejected))).await.unwrap();
        records.record(&summary(3, None)).await.unwrap();

        let stats = records.get_stats().await.unwrap();
        assert_eq!(
            stats,
            DeploymentStats {
                total: 3,
                succeeded: 2,
                failed: 1,
                total_gas_used: 2_000,
            }
        );

        let recent = records.recent_deployments(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].0, "token");
        assert_eq!(ErrorKind::UserRejected.to_string(), "user_rejected");
    }

    #[tokio::test]
    async fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let records = DeploymentRecords::new(path.to_str().unwrap()).await.unwrap();

        assert_eq!(records.get_stats().await.unwrap(), DeploymentStats::default());
        assert!(records.recent_deployments(5).await.unwrap().is_empty());
    }
}
