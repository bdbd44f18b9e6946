//! Error types for the transaction core

use crate::repository::RepositoryError;
use tcc_common::Xid;
use thiserror::Error;

/// Boxed error used for business and participant failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, TccError>;

/// Errors raised while driving a transaction through its phases
#[derive(Debug, Error)]
pub enum TccError {
    /// No record exists for the context's identifiers
    ///
    /// Expected while a provider is driven through CONFIRMING or CANCELLING
    /// after the branch already terminated; the interceptor swallows it.
    #[error("no existing transaction for xid {0}")]
    NoExistedTransaction(Xid),

    /// Confirm phase failed; the record remains for recovery
    #[error("confirming failed: {0}")]
    Confirming(#[source] BoxError),

    /// Cancel phase failed; the record remains for recovery
    #[error("cancelling failed: {0}")]
    Cancelling(#[source] BoxError),

    /// The business try phase failed and was rethrown
    #[error("trying failed: {0}")]
    Trying(#[source] BoxError),

    /// Repository failure, including optimistic lock conflicts
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Programmer-facing invariant violation; fatal to the current call
    #[error("system error: {0}")]
    System(String),
}
