//! etcd adapter error mapping.
//!
//! Bridge errors map to gRPC status codes the way etcd reports them:
//! - Unsupported / InvalidRequest → INVALID_ARGUMENT
//! - Compacted / FutureRevision → OUT_OF_RANGE
//! - Unavailable → UNAVAILABLE
//! - any other storage failure → INTERNAL

use crate::backend::BackendError;
use crate::core::error::BridgeError;
use tonic::{Code, Status};

/// etcd's client-visible message for a read below the compaction floor.
pub const ERR_COMPACTED: &str = "etcdserver: mvcc: required revision has been compacted";

/// etcd's client-visible message for a read above the current revision.
pub const ERR_FUTURE_REV: &str = "etcdserver: mvcc: required revision is a future revision";

/// Status code for a bridge error.
pub fn status_code(err: &BridgeError) -> Code {
    match err {
        BridgeError::Unsupported { .. } | BridgeError::InvalidRequest { .. } => {
            Code::InvalidArgument
        }
        BridgeError::Backend { source, .. } => match source {
            BackendError::Compacted { .. } | BackendError::FutureRevision { .. } => {
                Code::OutOfRange
            }
            BackendError::Unavailable(_) => Code::Unavailable,
            BackendError::Storage(_) => Code::Internal,
        },
    }
}

impl From<BridgeError> for Status {
    fn from(err: BridgeError) -> Self {
        let code = status_code(&err);
        let message = match &err {
            BridgeError::Backend {
                source: BackendError::Compacted { .. },
                ..
            } => ERR_COMPACTED.to_string(),
            BridgeError::Backend {
                source: BackendError::FutureRevision { .. },
                ..
            } => ERR_FUTURE_REV.to_string(),
            other => other.to_string(),
        };
        Status::new(code, message)
    }
}
