//! Example: a money transfer driven through the full TCC lifecycle
//!
//! The initiator opens a root transaction, enlists a debit and a credit
//! participant during TRY, and the manager confirms both once the business
//! body returns.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tcc_core::{
    BoxError, Compensable, CompensableInterceptor, Invocation, MethodInvocation, Participant,
    ParticipantInvoker, TransactionContext, TransactionManager,
};
use tcc_repository_memory::MemoryTransactionRepository;

/// Invoker that just prints what a real transport would deliver
struct PrintingInvoker;

#[async_trait]
impl ParticipantInvoker for PrintingInvoker {
    async fn invoke(
        &self,
        context: &TransactionContext,
        invocation: &Invocation,
    ) -> Result<(), BoxError> {
        println!(
            "-> {}.{}({}) [xid {} branch {} {:?}]",
            invocation.target,
            invocation.method,
            invocation.args,
            context.xid,
            context.branch_id,
            context.status,
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let repository = Arc::new(MemoryTransactionRepository::new());
    let manager = Arc::new(TransactionManager::new(repository, Arc::new(PrintingInvoker)));
    let interceptor = CompensableInterceptor::new(manager.clone());

    let body_manager = manager.clone();
    let transferred = interceptor
        .intercept(
            MethodInvocation::new(
                "transfer",
                Compensable::new("transfer_confirm", "transfer_cancel"),
            )
            .with_unique_id("transfer-1-2-50"),
            || async move {
                let shared = body_manager
                    .current_transaction()
                    .expect("active transaction");
                let xid = shared.lock().xid;
                println!("TRY: reserving funds under xid {}", xid);

                body_manager
                    .enlist_participant(Participant::new(
                        xid,
                        Invocation::new("account", "debit_confirm", json!({"from": 1, "amount": 50})),
                        Invocation::new("account", "debit_cancel", json!({"from": 1, "amount": 50})),
                    ))
                    .await?;
                body_manager
                    .enlist_participant(Participant::new(
                        xid,
                        Invocation::new("account", "credit_confirm", json!({"to": 2, "amount": 50})),
                        Invocation::new("account", "credit_cancel", json!({"to": 2, "amount": 50})),
                    ))
                    .await?;
                Ok(50u64)
            },
        )
        .await
        .expect("transfer failed");

    println!("transferred {} units", transferred);
}
