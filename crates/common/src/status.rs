//! Transaction status and type enums

use serde::{Deserialize, Serialize};

/// Phase a transaction is currently in
///
/// Status only ever advances TRYING -> CONFIRMING or TRYING -> CANCELLING;
/// the terminal state is deletion of the persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// The try phase is reserving resources
    Trying,
    /// The coordinator decided to confirm
    Confirming,
    /// The coordinator decided to cancel
    Cancelling,
}

impl TransactionStatus {
    /// Wire encoding used by the context codec
    pub fn as_u8(self) -> u8 {
        match self {
            TransactionStatus::Trying => 1,
            TransactionStatus::Confirming => 2,
            TransactionStatus::Cancelling => 3,
        }
    }

    /// Decode from the wire encoding
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TransactionStatus::Trying),
            2 => Some(TransactionStatus::Confirming),
            3 => Some(TransactionStatus::Cancelling),
            _ => None,
        }
    }
}

/// Whether a transaction was opened at the initiator or by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// Opened at the initiator of a call chain; owns the commit/rollback
    /// decision
    Root,
    /// Opened by a provider receiving an inbound context; driven by its root
    Branch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_mapping() {
        for status in [
            TransactionStatus::Trying,
            TransactionStatus::Confirming,
            TransactionStatus::Cancelling,
        ] {
            assert_eq!(TransactionStatus::from_u8(status.as_u8()), Some(status));
        }
        assert_eq!(TransactionStatus::from_u8(0), None);
        assert_eq!(TransactionStatus::from_u8(4), None);
    }
}
