//! Persistence contract for transaction records

use crate::transaction::Transaction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tcc_common::{BranchId, Xid};
use thiserror::Error;

/// Errors surfaced by transaction repositories
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Insert collided with an existing record
    #[error("transaction already exists for xid {0}")]
    DuplicateXid(Xid),

    /// Compare-and-set failed because another writer got there first
    ///
    /// On the live path this typically means a recovery pass raced the
    /// transaction; the loser backs off.
    #[error("optimistic lock conflict for xid {xid} at version {version}")]
    OptimisticLock { xid: Xid, version: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence seam for transaction records
///
/// One record per (xid, branch id) pair. Updates are compare-and-set on
/// `version`; implementations bump `version` and `last_update_time` into
/// both the stored record and the caller's copy. Records are deleted only
/// after a phase completes, so any record still present after a crash is
/// recoverable.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a new record; fails if the key already exists
    async fn create(&self, transaction: &Transaction) -> Result<(), RepositoryError>;

    /// Compare-and-set by version
    async fn update(&self, transaction: &mut Transaction) -> Result<(), RepositoryError>;

    /// Load a record by global and branch identity
    async fn find_by_xid(
        &self,
        xid: Xid,
        branch_id: Option<BranchId>,
    ) -> Result<Option<Transaction>, RepositoryError>;

    /// Remove a record; removing an absent record is not an error
    async fn delete(&self, transaction: &Transaction) -> Result<(), RepositoryError>;

    /// Records not updated since the cutoff, for recovery scans
    async fn find_stale_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, RepositoryError>;
}
