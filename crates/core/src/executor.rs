//! Bounded worker pool for asynchronous phase execution
//!
//! Confirm and cancel bodies dispatched asynchronously run here, away from
//! request-handling tasks, so a slow participant cannot block the head of
//! the request line. The queue is bounded with explicit rejection: a
//! rejected submission surfaces to the caller and the record stays put for
//! recovery to drive.

use crate::dispatch::ParticipantInvoker;
use crate::error::{BoxError, TccError};
use crate::repository::TransactionRepository;
use crate::transaction::Transaction;
use std::sync::Arc;
use tcc_common::Xid;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Direction a phase body drives its participants in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Confirm,
    Cancel,
}

/// A queued phase body
#[derive(Debug)]
pub struct PhaseJob {
    pub transaction: Transaction,
    pub phase: Phase,
}

/// Submission was rejected; the record stays in place for recovery
#[derive(Debug, Error)]
#[error("phase executor rejected {phase:?} for xid {xid}: {reason}")]
pub struct Rejected {
    pub xid: Xid,
    pub phase: Phase,
    pub reason: &'static str,
}

/// Worker pool draining a bounded queue of deferred phase bodies
pub struct PhaseExecutor {
    queue: mpsc::Sender<PhaseJob>,
    workers: Vec<JoinHandle<()>>,
}

impl PhaseExecutor {
    /// Spawn `workers` tasks draining a queue of `queue_capacity` jobs
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        invoker: Arc<dyn ParticipantInvoker>,
        workers: usize,
        queue_capacity: usize,
    ) -> Self {
        let (queue, receiver) = mpsc::channel::<PhaseJob>(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers)
            .map(|_| {
                let receiver = receiver.clone();
                let repository = repository.clone();
                let invoker = invoker.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        if let Err(error) = execute_phase(
                            repository.as_ref(),
                            invoker.as_ref(),
                            job.transaction,
                            job.phase,
                        )
                        .await
                        {
                            tracing::warn!(%error, "deferred phase failed, recovery will retry");
                        }
                    }
                })
            })
            .collect();

        Self { queue, workers }
    }

    /// Queue a phase body; a full or shut-down queue rejects loudly
    pub fn submit(&self, job: PhaseJob) -> Result<(), Rejected> {
        self.queue.try_send(job).map_err(|err| match err {
            TrySendError::Full(job) => Rejected {
                xid: job.transaction.xid,
                phase: job.phase,
                reason: "queue full",
            },
            TrySendError::Closed(job) => Rejected {
                xid: job.transaction.xid,
                phase: job.phase,
                reason: "executor shut down",
            },
        })
    }

    /// Stop accepting jobs, drain the queue, and wait for the workers
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Drive every participant through the phase, then delete the record
///
/// Participants run in enlistment order. Any failure leaves the record in
/// place and wraps into the phase's error kind so telemetry can split
/// confirm failures from cancel failures.
pub(crate) async fn execute_phase(
    repository: &dyn TransactionRepository,
    invoker: &dyn ParticipantInvoker,
    mut transaction: Transaction,
    phase: Phase,
) -> Result<(), TccError> {
    let outcome: Result<(), BoxError> = async {
        for participant in &mut transaction.participants {
            match phase {
                Phase::Confirm => participant.commit(invoker).await?,
                Phase::Cancel => participant.rollback(invoker).await?,
            }
        }
        repository
            .delete(&transaction)
            .await
            .map_err(BoxError::from)?;
        Ok(())
    }
    .await;

    outcome.map_err(|error| {
        tracing::warn!(
            xid = %transaction.xid,
            phase = ?phase,
            %error,
            "phase failed, record kept for recovery"
        );
        match phase {
            Phase::Confirm => TccError::Confirming(error),
            Phase::Cancel => TccError::Cancelling(error),
        }
    })
}
