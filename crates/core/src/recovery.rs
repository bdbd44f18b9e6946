//! Re-driving stuck transactions
//!
//! A recovery pass scans the repository for records whose last update is
//! older than the recover duration and re-drives their phase. Scheduling
//! the pass (timer, job runner) belongs to the embedder; this module owns
//! the pass itself and its retry bounds.

use crate::dispatch::ParticipantInvoker;
use crate::error::Result;
use crate::executor::{Phase, execute_phase};
use crate::repository::{RepositoryError, TransactionRepository};
use crate::transaction::Transaction;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tcc_common::{TransactionStatus, TransactionType};

/// Bounds for recovery passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Re-drive attempts before a record is quarantined
    pub max_retry_count: u32,
    /// Minimum age in seconds of a record before recovery touches it
    pub recover_duration_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 30,
            recover_duration_secs: 120,
        }
    }
}

/// Outcome counts of one recovery pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Records driven to deletion
    pub recovered: usize,
    /// Records intentionally left alone (quarantined, lost races, branches
    /// waiting for their root)
    pub skipped: usize,
    /// Records whose re-driven phase failed again
    pub failed: usize,
}

/// Re-drives stuck transactions against the repository
pub struct TransactionRecovery {
    repository: Arc<dyn TransactionRepository>,
    invoker: Arc<dyn ParticipantInvoker>,
    config: RecoveryConfig,
}

impl TransactionRecovery {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        invoker: Arc<dyn ParticipantInvoker>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            repository,
            invoker,
            config,
        }
    }

    /// Run one pass over stuck transactions
    pub async fn recover(&self) -> Result<RecoveryStats> {
        let cutoff = Utc::now() - Duration::seconds(self.config.recover_duration_secs as i64);
        let stale = self.repository.find_stale_since(cutoff).await?;

        let mut stats = RecoveryStats::default();
        for transaction in stale {
            match self.recover_one(transaction).await {
                Ok(true) => stats.recovered += 1,
                Ok(false) => stats.skipped += 1,
                Err(error) => {
                    stats.failed += 1;
                    tracing::warn!(%error, "recovery attempt failed, will retry next pass");
                }
            }
        }
        Ok(stats)
    }

    async fn recover_one(&self, mut transaction: Transaction) -> Result<bool> {
        if transaction.retried_count > self.config.max_retry_count {
            tracing::error!(
                xid = %transaction.xid,
                retried = transaction.retried_count,
                "transaction exceeded max retries, quarantined until handled manually"
            );
            return Ok(false);
        }

        let phase = match (transaction.status, transaction.transaction_type) {
            (TransactionStatus::Confirming, _) => Phase::Confirm,
            (TransactionStatus::Cancelling, _)
            | (TransactionStatus::Trying, TransactionType::Root) => Phase::Cancel,
            // A branch still in TRYING is driven by its root.
            (TransactionStatus::Trying, TransactionType::Branch) => return Ok(false),
        };

        transaction.add_retried_count();
        if phase == Phase::Cancel {
            transaction.change_status(TransactionStatus::Cancelling)?;
        }
        match self.repository.update(&mut transaction).await {
            Ok(()) => {}
            // Another node raced us to this record; it owns the re-drive.
            Err(RepositoryError::OptimisticLock { .. }) => {
                tracing::debug!(
                    xid = %transaction.xid,
                    "recovery lost the record to a concurrent writer"
                );
                return Ok(false);
            }
            Err(other) => return Err(other.into()),
        }

        execute_phase(
            self.repository.as_ref(),
            self.invoker.as_ref(),
            transaction,
            phase,
        )
        .await?;
        Ok(true)
    }
}
