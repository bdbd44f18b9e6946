//! The seam between the coordinator core and the RPC transport

use crate::error::BoxError;
use crate::participant::Invocation;
use async_trait::async_trait;
use tcc_common::TransactionContext;

/// Carries confirm/cancel invocations to their targets
///
/// The transport behind this trait owns delivery and serialization of the
/// invocation; the context must round-trip bit-exact so the provider can
/// attach to the right branch.
#[async_trait]
pub trait ParticipantInvoker: Send + Sync {
    /// Deliver one phase invocation together with its context
    async fn invoke(
        &self,
        context: &TransactionContext,
        invocation: &Invocation,
    ) -> Result<(), BoxError>;
}
