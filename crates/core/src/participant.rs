//! Participants and their confirm/cancel invocation descriptors

use crate::dispatch::ParticipantInvoker;
use crate::error::BoxError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tcc_common::{BranchId, TransactionContext, TransactionStatus, Xid};

/// By-value descriptor of one confirm or cancel call
///
/// Arguments are captured as opaque JSON so the descriptor can be persisted
/// with its transaction and replayed by recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Identifier of the component or service to call
    pub target: String,
    /// Method to invoke on the target
    pub method: String,
    /// Argument list, captured by value
    pub args: Value,
}

impl Invocation {
    /// Create a new invocation descriptor
    pub fn new(target: impl Into<String>, method: impl Into<String>, args: Value) -> Self {
        Self {
            target: target.into(),
            method: method.into(),
            args,
        }
    }
}

/// One party enlisted in a transaction
///
/// Invocations are immutable once the participant is enlisted. Each is
/// invoked exactly once per successful phase, in enlistment order; user
/// confirm/cancel code carries the idempotence guarantee under retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Global transaction this participant belongs to
    pub xid: Xid,
    /// Branch identity minted at enlistment
    pub branch_id: BranchId,
    /// Confirm invocation descriptor
    pub confirm: Invocation,
    /// Cancel invocation descriptor
    pub cancel: Invocation,
    /// Phase this participant was last driven through
    pub status: TransactionStatus,
}

impl Participant {
    /// Enlist a new participant under the given global transaction
    ///
    /// A fresh branch id is minted here; the context propagated on this
    /// participant's behalf carries it to the provider.
    pub fn new(xid: Xid, confirm: Invocation, cancel: Invocation) -> Self {
        Self {
            xid,
            branch_id: BranchId::new(),
            confirm,
            cancel,
            status: TransactionStatus::Trying,
        }
    }

    /// Context to propagate with this participant's calls in the given phase
    pub fn context(&self, status: TransactionStatus) -> TransactionContext {
        TransactionContext::new(self.xid, self.branch_id, status)
    }

    /// Drive this participant's confirm invocation
    pub async fn commit(&mut self, invoker: &dyn ParticipantInvoker) -> Result<(), BoxError> {
        self.status = TransactionStatus::Confirming;
        invoker
            .invoke(&self.context(TransactionStatus::Confirming), &self.confirm)
            .await
    }

    /// Drive this participant's cancel invocation
    pub async fn rollback(&mut self, invoker: &dyn ParticipantInvoker) -> Result<(), BoxError> {
        self.status = TransactionStatus::Cancelling;
        invoker
            .invoke(&self.context(TransactionStatus::Cancelling), &self.cancel)
            .await
    }
}
