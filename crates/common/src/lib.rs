//! Common types for the TCC coordinator
//!
//! This crate defines:
//! - Global and branch transaction identifiers (UUID-based)
//! - Transaction status, type, and propagation enums
//! - The transaction context record propagated across process boundaries,
//!   with its fixed-width wire codec and header-map helpers

mod context;
mod ids;
mod propagation;
mod status;

pub use context::{CONTEXT_WIRE_LEN, ContextCodecError, TransactionContext};
pub use ids::{BranchId, Xid};
pub use propagation::Propagation;
pub use status::{TransactionStatus, TransactionType};
