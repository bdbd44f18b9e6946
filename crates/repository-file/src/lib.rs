//! Filesystem-based transaction repository
//!
//! One JSON file per record, named by xid and branch id. Suited to
//! single-node deployments and durability tests; relational and cache
//! backends plug in behind the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tcc_common::{BranchId, Xid};
use tcc_core::{RepositoryError, Transaction, TransactionRepository};

/// Filesystem-backed repository
pub struct FileTransactionRepository {
    /// Base directory holding one file per record
    base_path: PathBuf,
    // Serializes the read-compare-write update cycle within this process.
    write_lock: Mutex<()>,
}

impl FileTransactionRepository {
    /// Create a repository rooted at the given directory
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, xid: Xid, branch_id: Option<BranchId>) -> PathBuf {
        match branch_id {
            Some(branch) => self.base_path.join(format!("{}-{}.json", xid, branch)),
            None => self.base_path.join(format!("{}.json", xid)),
        }
    }

    fn read_record(&self, path: &Path) -> Result<Option<Transaction>, RepositoryError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, path: &Path, transaction: &Transaction) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec(transaction)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for FileTransactionRepository {
    async fn create(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock();
        let path = self.record_path(transaction.xid, transaction.branch_id);
        if path.exists() {
            return Err(RepositoryError::DuplicateXid(transaction.xid));
        }
        self.write_record(&path, transaction)
    }

    async fn update(&self, transaction: &mut Transaction) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock();
        let path = self.record_path(transaction.xid, transaction.branch_id);
        let stored = self
            .read_record(&path)?
            .ok_or(RepositoryError::OptimisticLock {
                xid: transaction.xid,
                version: transaction.version,
            })?;
        if stored.version != transaction.version {
            return Err(RepositoryError::OptimisticLock {
                xid: transaction.xid,
                version: transaction.version,
            });
        }
        transaction.version += 1;
        transaction.last_update_time = Utc::now();
        self.write_record(&path, transaction)
    }

    async fn find_by_xid(
        &self,
        xid: Xid,
        branch_id: Option<BranchId>,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.read_record(&self.record_path(xid, branch_id))
    }

    async fn delete(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock();
        let path = self.record_path(transaction.xid, transaction.branch_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_stale_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut stale = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match self.read_record(&path) {
                Ok(Some(transaction)) if transaction.last_update_time <= cutoff => {
                    stale.push(transaction);
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(?path, %error, "skipping unreadable transaction record");
                }
            }
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_repository() -> (FileTransactionRepository, PathBuf) {
        let dir = env::temp_dir().join(format!("tcc_repo_test_{}", uuid::Uuid::new_v4()));
        (FileTransactionRepository::new(&dir).unwrap(), dir)
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let (repository, dir) = temp_repository();
        let mut transaction = Transaction::root();
        transaction
            .attachments
            .insert("initiator".to_string(), serde_json::json!("orders"));

        repository.create(&transaction).await.unwrap();

        let found = repository
            .find_by_xid(transaction.xid, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.xid, transaction.xid);
        assert_eq!(found.attachments["initiator"], serde_json::json!("orders"));

        repository.update(&mut transaction).await.unwrap();
        assert_eq!(transaction.version, 2);

        repository.delete(&transaction).await.unwrap();
        assert!(
            repository
                .find_by_xid(transaction.xid, None)
                .await
                .unwrap()
                .is_none()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let (repository, dir) = temp_repository();
        let transaction = Transaction::root();

        repository.create(&transaction).await.unwrap();
        let err = repository.create(&transaction).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateXid(_)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let (repository, dir) = temp_repository();
        let mut transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();

        let mut stale = transaction.clone();
        repository.update(&mut transaction).await.unwrap();
        let err = repository.update(&mut stale).await.unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLock { .. }));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (repository, dir) = temp_repository();
        let transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();
        repository.delete(&transaction).await.unwrap();
        repository.delete(&transaction).await.unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_stale_scan_survives_restart() {
        let (repository, dir) = temp_repository();
        let transaction = Transaction::root();
        repository.create(&transaction).await.unwrap();
        drop(repository);

        // A fresh instance over the same directory still sees the record.
        let reopened = FileTransactionRepository::new(&dir).unwrap();
        let future = Utc::now() + chrono::Duration::seconds(60);
        let stale = reopened.find_stale_since(future).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].xid, transaction.xid);

        let _ = fs::remove_dir_all(&dir);
    }
}
