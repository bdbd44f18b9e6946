//! Transaction state-machine driver
//!
//! The manager owns the per-call-chain transaction stack and drives every
//! transaction through begin, enlist, and phase execution against the
//! repository. Phase transitions are persist-before-execute: the status
//! flip is durable before any participant is invoked, so a crash between
//! the two steps is resumable by recovery re-reading the record.

use crate::dispatch::ParticipantInvoker;
use crate::error::{BoxError, Result, TccError};
use crate::executor::{Phase, PhaseExecutor, PhaseJob, execute_phase};
use crate::participant::Participant;
use crate::repository::TransactionRepository;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tcc_common::{TransactionContext, TransactionStatus};

/// Shared handle to a live transaction on the stack
pub type SharedTransaction = Arc<Mutex<Transaction>>;

tokio::task_local! {
    // One logical call chain owns one stack; tasks spawned inside a
    // business body do not inherit it.
    static TX_STACK: RefCell<Vec<SharedTransaction>>;
}

/// Drives transactions through begin, enlist, confirm, and cancel
pub struct TransactionManager {
    repository: Arc<dyn TransactionRepository>,
    invoker: Arc<dyn ParticipantInvoker>,
    executor: PhaseExecutor,
}

impl TransactionManager {
    /// Default number of phase worker tasks
    pub const DEFAULT_PHASE_WORKERS: usize = 4;
    /// Default capacity of the deferred-phase queue
    pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

    /// Create a manager with the default phase pool
    ///
    /// Must be called inside a tokio runtime; the pool spawns its workers
    /// immediately.
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        invoker: Arc<dyn ParticipantInvoker>,
    ) -> Self {
        Self::with_pool(
            repository,
            invoker,
            Self::DEFAULT_PHASE_WORKERS,
            Self::DEFAULT_QUEUE_CAPACITY,
        )
    }

    /// Create a manager with an explicitly sized phase pool
    pub fn with_pool(
        repository: Arc<dyn TransactionRepository>,
        invoker: Arc<dyn ParticipantInvoker>,
        workers: usize,
        queue_capacity: usize,
    ) -> Self {
        let executor = PhaseExecutor::new(
            repository.clone(),
            invoker.clone(),
            workers,
            queue_capacity,
        );
        Self {
            repository,
            invoker,
            executor,
        }
    }

    /// Establish a transaction stack for one logical call chain
    ///
    /// Everything that touches the ambient transaction must run inside a
    /// scope. The interceptor opens one automatically at the outermost
    /// compensable call of a chain; embedders driving the manager directly
    /// wrap each request in this.
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        TX_STACK.scope(RefCell::new(Vec::new()), fut).await
    }

    /// Whether the current task already carries a transaction stack
    pub fn in_scope() -> bool {
        TX_STACK.try_with(|_| ()).is_ok()
    }

    /// Open a root transaction and push it onto the stack
    ///
    /// A `unique_id` seeds a stable xid so client retries reuse the same
    /// root identity.
    pub async fn begin(&self, unique_id: Option<&str>) -> Result<SharedTransaction> {
        let transaction = match unique_id {
            Some(identity) => Transaction::root_with_identity(identity),
            None => Transaction::root(),
        };
        self.repository.create(&transaction).await?;
        self.register(transaction)
    }

    /// Open a branch transaction for an inbound TRYING context
    pub async fn propagation_new_begin(
        &self,
        context: &TransactionContext,
    ) -> Result<SharedTransaction> {
        let transaction = Transaction::branch(context);
        self.repository.create(&transaction).await?;
        self.register(transaction)
    }

    /// Attach to the existing branch for an inbound CONFIRMING or
    /// CANCELLING context
    ///
    /// An absent record is an expected condition: the branch already ran
    /// its phase and deleted itself.
    pub async fn propagation_exist_begin(
        &self,
        context: &TransactionContext,
    ) -> Result<SharedTransaction> {
        let Some(mut transaction) = self
            .repository
            .find_by_xid(context.xid, Some(context.branch_id))
            .await?
        else {
            return Err(TccError::NoExistedTransaction(context.xid));
        };
        transaction.change_status(context.status)?;
        self.register(transaction)
    }

    /// Flip the current transaction to CONFIRMING and run its confirm phase
    pub async fn commit(&self, async_confirm: bool) -> Result<()> {
        self.run_phase(Phase::Confirm, async_confirm).await
    }

    /// Flip the current transaction to CANCELLING and run its cancel phase
    pub async fn rollback(&self, async_cancel: bool) -> Result<()> {
        self.run_phase(Phase::Cancel, async_cancel).await
    }

    async fn run_phase(&self, phase: Phase, deferred: bool) -> Result<()> {
        let shared = self.require_current()?;
        let status = match phase {
            Phase::Confirm => TransactionStatus::Confirming,
            Phase::Cancel => TransactionStatus::Cancelling,
        };

        let mut snapshot = {
            let mut transaction = shared.lock();
            transaction.change_status(status)?;
            transaction.clone()
        };
        // The status flip is durable before any participant runs.
        self.repository.update(&mut snapshot).await?;
        {
            let mut transaction = shared.lock();
            transaction.version = snapshot.version;
            transaction.last_update_time = snapshot.last_update_time;
        }

        if deferred {
            self.executor
                .submit(PhaseJob {
                    transaction: snapshot,
                    phase,
                })
                .map_err(|rejection| {
                    tracing::warn!(
                        %rejection,
                        "async phase dispatch failed, recovery will drive the phase later"
                    );
                    let source: BoxError = Box::new(rejection);
                    match phase {
                        Phase::Confirm => TccError::Confirming(source),
                        Phase::Cancel => TccError::Cancelling(source),
                    }
                })
        } else {
            execute_phase(
                self.repository.as_ref(),
                self.invoker.as_ref(),
                snapshot,
                phase,
            )
            .await
        }
    }

    /// Append a participant to the current transaction and persist it
    pub async fn enlist_participant(&self, participant: Participant) -> Result<()> {
        let shared = self.require_current()?;
        let mut snapshot = {
            let mut transaction = shared.lock();
            transaction.enlist_participant(participant);
            transaction.clone()
        };
        self.repository.update(&mut snapshot).await?;
        let mut transaction = shared.lock();
        transaction.version = snapshot.version;
        transaction.last_update_time = snapshot.last_update_time;
        Ok(())
    }

    /// Head of the current chain's stack, if any
    pub fn current_transaction(&self) -> Option<SharedTransaction> {
        TX_STACK
            .try_with(|stack| stack.borrow().last().cloned())
            .ok()
            .flatten()
    }

    /// Whether the current chain has an active transaction
    pub fn is_transaction_active(&self) -> bool {
        TX_STACK
            .try_with(|stack| !stack.borrow().is_empty())
            .unwrap_or(false)
    }

    /// Pop a completed transaction off the stack
    ///
    /// Pops iff `transaction` is the stack head; anything else is a
    /// mis-nesting bug that fails loudly and leaves the stack unchanged.
    /// A `None` transaction or an inactive stack is a no-op.
    pub fn clean_after_completion(&self, transaction: Option<&SharedTransaction>) -> Result<()> {
        let Some(transaction) = transaction else {
            return Ok(());
        };
        if !self.is_transaction_active() {
            return Ok(());
        }
        TX_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last() {
                Some(top) if Arc::ptr_eq(top, transaction) => {
                    stack.pop();
                    Ok(())
                }
                _ => Err(TccError::System(
                    "illegal transaction when clean after completion".to_string(),
                )),
            }
        })
    }

    fn register(&self, transaction: Transaction) -> Result<SharedTransaction> {
        let shared = Arc::new(Mutex::new(transaction));
        TX_STACK
            .try_with(|stack| stack.borrow_mut().push(shared.clone()))
            .map_err(|_| {
                TccError::System("no transaction scope on this call chain".to_string())
            })?;
        Ok(shared)
    }

    fn require_current(&self) -> Result<SharedTransaction> {
        self.current_transaction()
            .ok_or_else(|| TccError::System("no active transaction".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_establishes_a_stack() {
        assert!(!TransactionManager::in_scope());
        TransactionManager::scope(async {
            assert!(TransactionManager::in_scope());
        })
        .await;
        assert!(!TransactionManager::in_scope());
    }

    #[tokio::test]
    async fn test_stack_is_empty_without_transactions() {
        TransactionManager::scope(async {
            assert!(
                TX_STACK
                    .try_with(|stack| stack.borrow().is_empty())
                    .unwrap()
            );
        })
        .await;
    }
}
