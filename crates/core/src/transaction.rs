//! The transaction aggregate

use crate::error::{Result, TccError};
use crate::participant::Participant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tcc_common::{BranchId, TransactionContext, TransactionStatus, TransactionType, Xid};

/// Aggregate root for one root or branch transaction
///
/// The record is persisted on every state change. `version` backs the
/// repository's optimistic concurrency check and increases on every
/// successful update; `retried_count` is advanced by recovery passes.
/// Participants hold only value-copied invocation descriptors, never a
/// reference back to their transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Global transaction id, inherited by every branch
    pub xid: Xid,
    /// Branch identity; `None` for a root transaction
    pub branch_id: Option<BranchId>,
    /// Root or branch
    pub transaction_type: TransactionType,
    /// Current phase
    pub status: TransactionStatus,
    /// Times recovery has re-driven this record
    pub retried_count: u32,
    pub create_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    /// Optimistic concurrency version, starting at 1
    pub version: u64,
    /// Enlistment order is invocation order during confirm and cancel
    pub participants: Vec<Participant>,
    /// Opaque caller data persisted with the record
    pub attachments: HashMap<String, Value>,
}

impl Transaction {
    /// Open a root transaction with a generated xid
    pub fn root() -> Self {
        Self::with_identity(Xid::new(), None, TransactionType::Root)
    }

    /// Open a root transaction whose xid derives from a stable identity
    pub fn root_with_identity(identity: &str) -> Self {
        Self::with_identity(Xid::from_identity(identity), None, TransactionType::Root)
    }

    /// Open a branch transaction adopting the inbound context's identifiers
    pub fn branch(context: &TransactionContext) -> Self {
        Self::with_identity(
            context.xid,
            Some(context.branch_id),
            TransactionType::Branch,
        )
    }

    fn with_identity(
        xid: Xid,
        branch_id: Option<BranchId>,
        transaction_type: TransactionType,
    ) -> Self {
        let now = Utc::now();
        Self {
            xid,
            branch_id,
            transaction_type,
            status: TransactionStatus::Trying,
            retried_count: 0,
            create_time: now,
            last_update_time: now,
            version: 1,
            participants: Vec::new(),
            attachments: HashMap::new(),
        }
    }

    /// Advance the status
    ///
    /// Only TRYING -> CONFIRMING, TRYING -> CANCELLING, and idempotent
    /// re-sets (recovery re-drives) are legal; anything else is a
    /// programming error and fails loudly.
    pub fn change_status(&mut self, status: TransactionStatus) -> Result<()> {
        use TransactionStatus::*;
        match (self.status, status) {
            (current, next) if current == next => {}
            (Trying, Confirming) | (Trying, Cancelling) => {}
            (current, next) => {
                return Err(TccError::System(format!(
                    "illegal status transition {:?} -> {:?} for xid {}",
                    current, next, self.xid
                )));
            }
        }
        self.status = status;
        Ok(())
    }

    /// Append a participant; enlistment order is preserved
    pub fn enlist_participant(&mut self, participant: Participant) {
        self.participants.push(participant);
    }

    /// Bump the recovery retry counter
    pub fn add_retried_count(&mut self) {
        self.retried_count += 1;
    }
}
