//! In-memory transaction repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tcc_common::{BranchId, Xid};
use tcc_core::{RepositoryError, Transaction, TransactionRepository};

type Key = (Xid, Option<BranchId>);

/// Concurrent map-backed repository
///
/// Keyed by (xid, branch id); versions are checked and bumped under the
/// map's per-entry lock.
pub struct MemoryTransactionRepository {
    records: DashMap<Key, Transaction>,
}

impl MemoryTransactionRepository {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    fn key(transaction: &Transaction) -> Key {
        (transaction.xid, transaction.branch_id)
    }
}

impl Default for MemoryTransactionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionRepository for MemoryTransactionRepository {
    async fn create(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        match self.records.entry(Self::key(transaction)) {
            Entry::Occupied(_) => Err(RepositoryError::DuplicateXid(transaction.xid)),
            Entry::Vacant(entry) => {
                entry.insert(transaction.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, transaction: &mut Transaction) -> Result<(), RepositoryError> {
        let mut entry = self.records.get_mut(&Self::key(transaction)).ok_or(
            RepositoryError::OptimisticLock {
                xid: transaction.xid,
                version: transaction.version,
            },
        )?;
        if entry.version != transaction.version {
            return Err(RepositoryError::OptimisticLock {
                xid: transaction.xid,
                version: transaction.version,
            });
        }
        transaction.version += 1;
        transaction.last_update_time = Utc::now();
        *entry = transaction.clone();
        Ok(())
    }

    async fn find_by_xid(
        &self,
        xid: Xid,
        branch_id: Option<BranchId>,
    ) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self
            .records
            .get(&(xid, branch_id))
            .map(|record| record.value().clone()))
    }

    async fn delete(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        self.records.remove(&Self::key(transaction));
        Ok(())
    }

    async fn find_stale_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.last_update_time <= cutoff)
            .map(|record| record.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_find() {
        let repository = MemoryTransactionRepository::new();
        let transaction = Transaction::root();

        repository.create(&transaction).await.unwrap();
        let found = repository
            .find_by_xid(transaction.xid, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.xid, transaction.xid);
        assert_eq!(found.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let repository = MemoryTransactionRepository::new();
        let transaction = Transaction::root();

        repository.create(&transaction).await.unwrap();
        let err = repository.create(&transaction).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateXid(xid) if xid == transaction.xid));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let repository = MemoryTransactionRepository::new();
        let mut transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();

        repository.update(&mut transaction).await.unwrap();
        assert_eq!(transaction.version, 2);
        repository.update(&mut transaction).await.unwrap();
        assert_eq!(transaction.version, 3);

        let stored = repository
            .find_by_xid(transaction.xid, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let repository = MemoryTransactionRepository::new();
        let mut transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();

        let mut stale = transaction.clone();
        repository.update(&mut transaction).await.unwrap();

        let err = repository.update(&mut stale).await.unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLock { version: 1, .. }));
    }

    #[tokio::test]
    async fn test_update_after_delete_conflicts() {
        let repository = MemoryTransactionRepository::new();
        let mut transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();
        repository.delete(&transaction).await.unwrap();

        let err = repository.update(&mut transaction).await.unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLock { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repository = MemoryTransactionRepository::new();
        let transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();
        repository.delete(&transaction).await.unwrap();
        repository.delete(&transaction).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_scan_filters_by_age() {
        let repository = MemoryTransactionRepository::new();
        let transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();

        let future = Utc::now() + chrono::Duration::seconds(60);
        let past = Utc::now() - chrono::Duration::seconds(60);

        assert_eq!(repository.find_stale_since(future).await.unwrap().len(), 1);
        assert!(repository.find_stale_since(past).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_branches_are_distinct_records() {
        let repository = MemoryTransactionRepository::new();
        let root = Transaction::root();
        repository.create(&root).await.unwrap();

        let context = tcc_common::TransactionContext::new(
            root.xid,
            BranchId::new(),
            tcc_common::TransactionStatus::Trying,
        );
        let branch = Transaction::branch(&context);
        repository.create(&branch).await.unwrap();

        assert!(
            repository
                .find_by_xid(root.xid, None)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            repository
                .find_by_xid(root.xid, Some(context.branch_id))
                .await
                .unwrap()
                .is_some()
        );
    }
}
