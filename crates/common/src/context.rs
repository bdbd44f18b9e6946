//! Transaction context propagated across process boundaries
//!
//! The context is the three-field record carried with every call between a
//! compensable caller and a compensable provider. Transports may wrap it in
//! whatever envelope they use (headers, metadata, trailers) but must
//! round-trip it bit-exact; the fixed-width codec here is the canonical
//! encoding, with string header helpers for transports that carry metadata
//! as key/value pairs.

use crate::{BranchId, TransactionStatus, Xid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Length in bytes of the fixed wire encoding
pub const CONTEXT_WIRE_LEN: usize = 33;

const XID_HEADER: &str = "tcc-xid";
const BRANCH_HEADER: &str = "tcc-branch-id";
const STATUS_HEADER: &str = "tcc-status";

/// Transaction context carried across every RPC boundary
///
/// Immutable after construction except `status`, which advances
/// monotonically TRYING -> CONFIRMING or TRYING -> CANCELLING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    /// Global transaction id shared by all branches
    pub xid: Xid,
    /// Identity of the current branch within the global transaction
    pub branch_id: BranchId,
    /// Phase the caller is driving
    pub status: TransactionStatus,
}

impl TransactionContext {
    /// Create a new context
    pub fn new(xid: Xid, branch_id: BranchId, status: TransactionStatus) -> Self {
        Self {
            xid,
            branch_id,
            status,
        }
    }

    /// Copy of this context advanced to the given phase
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    /// Encode to the fixed 33-byte wire format
    pub fn to_bytes(&self) -> [u8; CONTEXT_WIRE_LEN] {
        let mut buf = [0u8; CONTEXT_WIRE_LEN];
        buf[..16].copy_from_slice(&self.xid.to_bytes());
        buf[16..32].copy_from_slice(&self.branch_id.to_bytes());
        buf[32] = self.status.as_u8();
        buf
    }

    /// Decode from the fixed wire format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContextCodecError> {
        if bytes.len() != CONTEXT_WIRE_LEN {
            return Err(ContextCodecError::Length(bytes.len()));
        }
        let mut xid = [0u8; 16];
        xid.copy_from_slice(&bytes[..16]);
        let mut branch = [0u8; 16];
        branch.copy_from_slice(&bytes[16..32]);
        let status =
            TransactionStatus::from_u8(bytes[32]).ok_or(ContextCodecError::Status(bytes[32]))?;
        Ok(Self {
            xid: Xid::from_bytes(xid),
            branch_id: BranchId::from_bytes(branch),
            status,
        })
    }

    /// Insert this context into a string header map
    pub fn write_headers(&self, headers: &mut HashMap<String, String>) {
        headers.insert(XID_HEADER.to_string(), self.xid.to_string());
        headers.insert(BRANCH_HEADER.to_string(), self.branch_id.to_string());
        headers.insert(STATUS_HEADER.to_string(), self.status.as_u8().to_string());
    }

    /// Extract a context from a string header map
    ///
    /// Returns `Ok(None)` when no context headers are present at all, which
    /// is how a provider distinguishes a plain call from a propagated one.
    pub fn from_headers(
        headers: &HashMap<String, String>,
    ) -> Result<Option<Self>, ContextCodecError> {
        let Some(xid) = headers.get(XID_HEADER) else {
            return Ok(None);
        };
        let branch = headers
            .get(BRANCH_HEADER)
            .ok_or_else(|| ContextCodecError::Header(BRANCH_HEADER.to_string()))?;
        let status = headers
            .get(STATUS_HEADER)
            .ok_or_else(|| ContextCodecError::Header(STATUS_HEADER.to_string()))?;

        let xid = Xid::parse(xid).map_err(ContextCodecError::Header)?;
        let branch_id = BranchId::parse(branch).map_err(ContextCodecError::Header)?;
        let status = status
            .parse::<u8>()
            .ok()
            .and_then(TransactionStatus::from_u8)
            .ok_or_else(|| ContextCodecError::Header(STATUS_HEADER.to_string()))?;

        Ok(Some(Self {
            xid,
            branch_id,
            status,
        }))
    }
}

/// Errors produced by the context codec
#[derive(Debug, thiserror::Error)]
pub enum ContextCodecError {
    #[error("context must be {CONTEXT_WIRE_LEN} bytes, got {0}")]
    Length(usize),

    #[error("unknown status byte: {0}")]
    Status(u8),

    #[error("invalid or missing header: {0}")]
    Header(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: TransactionStatus) -> TransactionContext {
        TransactionContext::new(Xid::new(), BranchId::new(), status)
    }

    #[test]
    fn test_bytes_roundtrip() {
        for status in [
            TransactionStatus::Trying,
            TransactionStatus::Confirming,
            TransactionStatus::Cancelling,
        ] {
            let context = sample(status);
            let decoded = TransactionContext::from_bytes(&context.to_bytes()).unwrap();
            assert_eq!(context, decoded);
        }
    }

    #[test]
    fn test_rejects_bad_length() {
        let err = TransactionContext::from_bytes(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, ContextCodecError::Length(12)));
    }

    #[test]
    fn test_rejects_unknown_status() {
        let mut bytes = sample(TransactionStatus::Trying).to_bytes();
        bytes[32] = 9;
        let err = TransactionContext::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ContextCodecError::Status(9)));
    }

    #[test]
    fn test_header_roundtrip() {
        let context = sample(TransactionStatus::Confirming);
        let mut headers = HashMap::new();
        context.write_headers(&mut headers);
        let decoded = TransactionContext::from_headers(&headers).unwrap();
        assert_eq!(decoded, Some(context));
    }

    #[test]
    fn test_absent_headers_mean_no_context() {
        let headers = HashMap::new();
        assert_eq!(TransactionContext::from_headers(&headers).unwrap(), None);
    }

    #[test]
    fn test_partial_headers_are_an_error() {
        let context = sample(TransactionStatus::Trying);
        let mut headers = HashMap::new();
        context.write_headers(&mut headers);
        headers.remove("tcc-status");
        assert!(TransactionContext::from_headers(&headers).is_err());
    }

    #[test]
    fn test_with_status_advances_phase() {
        let context = sample(TransactionStatus::Trying);
        let confirming = context.with_status(TransactionStatus::Confirming);
        assert_eq!(confirming.xid, context.xid);
        assert_eq!(confirming.branch_id, context.branch_id);
        assert_eq!(confirming.status, TransactionStatus::Confirming);
    }
}
