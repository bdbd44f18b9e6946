//! Try-Confirm-Cancel transaction core
//!
//! This crate drives multi-party business transactions through the three
//! canonical TCC phases (TRY, then CONFIRM or CANCEL) with crash-safe
//! persistence:
//!
//! - The [`TransactionManager`] is the state-machine driver: it opens root
//!   and branch transactions, enlists participants, flips phases
//!   persist-before-execute, and dispatches confirm/cancel bodies inline or
//!   onto a bounded worker pool.
//! - The [`CompensableInterceptor`] wraps each compensable business method,
//!   resolving its role (root, provider, or normal) and routing the call
//!   through the matching lifecycle.
//! - A root transaction on the initiator and branch transactions on remote
//!   providers share one global xid, stitched together by the propagated
//!   [`TransactionContext`].
//! - [`TransactionRecovery`] re-drives records a crash or failure left
//!   behind.
//!
//! Persistence and RPC stay behind the [`TransactionRepository`] and
//! [`ParticipantInvoker`] traits.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod interceptor;
pub mod manager;
pub mod method_context;
pub mod participant;
pub mod recovery;
pub mod repository;
pub mod transaction;

pub use dispatch::ParticipantInvoker;
pub use error::{BoxError, Result, TccError};
pub use executor::{Phase, PhaseExecutor, PhaseJob};
pub use interceptor::CompensableInterceptor;
pub use manager::{SharedTransaction, TransactionManager};
pub use method_context::{Compensable, ErrorMatcher, MethodInvocation, MethodRole, delay_cancel};
pub use participant::{Invocation, Participant};
pub use recovery::{RecoveryConfig, RecoveryStats, TransactionRecovery};
pub use repository::{RepositoryError, TransactionRepository};
pub use transaction::Transaction;

// Re-export the shared context types for convenience
pub use tcc_common::{
    BranchId, Propagation, TransactionContext, TransactionStatus, TransactionType, Xid,
};
