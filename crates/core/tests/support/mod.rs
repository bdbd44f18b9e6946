//! Shared fixtures for coordinator integration tests

// Not every test binary uses every fixture.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tcc_core::{
    BoxError, BranchId, Invocation, ParticipantInvoker, TransactionContext, TransactionStatus,
};
use thiserror::Error;

/// One delivered phase invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub target: String,
    pub method: String,
    pub status: TransactionStatus,
    pub branch_id: BranchId,
}

#[derive(Debug, Error)]
#[error("invocation of {0} failed")]
pub struct InvokeFailed(pub String);

/// Invoker that records every delivery and can fail selected methods
#[derive(Default)]
pub struct RecordingInvoker {
    calls: Mutex<Vec<RecordedCall>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future invocation of `method` fail
    pub fn fail_method(&self, method: &str) {
        self.failing.lock().insert(method.to_string());
    }

    /// Let previously failing methods succeed again
    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Methods delivered so far, in order
    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.method.clone()).collect()
    }
}

#[async_trait]
impl ParticipantInvoker for RecordingInvoker {
    async fn invoke(
        &self,
        context: &TransactionContext,
        invocation: &Invocation,
    ) -> Result<(), BoxError> {
        if self.failing.lock().contains(&invocation.method) {
            return Err(Box::new(InvokeFailed(invocation.method.clone())));
        }
        self.calls.lock().push(RecordedCall {
            target: invocation.target.clone(),
            method: invocation.method.clone(),
            status: context.status,
            branch_id: context.branch_id,
        });
        Ok(())
    }
}

/// Participant descriptor pair for a named target
pub fn participant_invocations(target: &str) -> (Invocation, Invocation) {
    (
        Invocation::new(
            target,
            format!("{}_confirm", target),
            serde_json::json!({"amount": 50}),
        ),
        Invocation::new(
            target,
            format!("{}_cancel", target),
            serde_json::json!({"amount": 50}),
        ),
    )
}

/// Wiring shared by the scenarios
pub fn fixture() -> (
    Arc<tcc_repository_memory::MemoryTransactionRepository>,
    Arc<RecordingInvoker>,
    Arc<tcc_core::TransactionManager>,
) {
    let repository = Arc::new(tcc_repository_memory::MemoryTransactionRepository::new());
    let invoker = Arc::new(RecordingInvoker::new());
    let manager = Arc::new(tcc_core::TransactionManager::new(
        repository.clone(),
        invoker.clone(),
    ));
    (repository, invoker, manager)
}
