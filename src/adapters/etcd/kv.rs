//! KV request gatekeeping.
//!
//! [`KvServerBridge`] sits between the gRPC service and [`LimitedServer`].
//! It rejects every request option the emulation does not implement before
//! any storage is touched, then delegates and wraps the records for the
//! wire. Ignoring an option would hand the client a result that silently
//! differs from etcd, so rejection is explicit.

use super::convert::{self, display_key};
use super::limited::LimitedServer;
use super::proto::{self, compare, range_request, request_op};
use crate::core::error::{BridgeError, BridgeResult};

/// Validates requests and forwards them to a [`LimitedServer`].
#[derive(Clone)]
pub struct KvServerBridge {
    limited: LimitedServer,
}

impl KvServerBridge {
    pub fn new(limited: LimitedServer) -> Self {
        Self { limited }
    }

    pub fn limited(&self) -> &LimitedServer {
        &self.limited
    }

    pub async fn range(&self, req: proto::RangeRequest) -> BridgeResult<proto::RangeResponse> {
        let result = match check_range(&req) {
            Ok(()) => self.limited.range(&req).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(resp) => Ok(proto::RangeResponse {
                header: Some(resp.header),
                kvs: convert::to_kvs(resp.kvs),
                more: resp.more,
                count: resp.count,
            }),
            Err(err) => {
                tracing::error!(
                    key = %display_key(&req.key),
                    range_end = %display_key(&req.range_end),
                    error = %err,
                    "range failed"
                );
                Err(err)
            }
        }
    }

    pub async fn put(&self, req: proto::PutRequest) -> BridgeResult<proto::PutResponse> {
        let result = match check_put(&req) {
            Ok(()) => self.limited.put(&req).await,
            Err(err) => Err(err),
        };
        result.inspect_err(|err| {
            tracing::error!(key = %display_key(&req.key), error = %err, "put failed");
        })
    }

    pub async fn delete_range(
        &self,
        req: proto::DeleteRangeRequest,
    ) -> BridgeResult<proto::DeleteRangeResponse> {
        self.limited.delete_range(&req).await.inspect_err(|err| {
            tracing::error!(
                key = %display_key(&req.key),
                range_end = %display_key(&req.range_end),
                error = %err,
                "delete range failed"
            );
        })
    }

    pub async fn txn(&self, req: proto::TxnRequest) -> BridgeResult<proto::TxnResponse> {
        let result = match check_txn(&req) {
            Ok(()) => self.limited.txn(&req).await,
            Err(err) => Err(err),
        };
        result.inspect_err(|err| {
            let key = req
                .compare
                .first()
                .map(|cmp| display_key(&cmp.key))
                .unwrap_or_default();
            tracing::error!(
                key = %key,
                compares = req.compare.len(),
                success = req.success.len(),
                failure = req.failure.len(),
                error = %err,
                "txn failed"
            );
        })
    }

    pub async fn compact(
        &self,
        req: proto::CompactionRequest,
    ) -> BridgeResult<proto::CompactionResponse> {
        self.limited.compact(&req).await.inspect_err(|err| {
            tracing::error!(revision = req.revision, error = %err, "compact failed");
        })
    }
}

// ============================================================================
// Capability checks
// ============================================================================

fn reject_if(cond: bool, what: &str) -> BridgeResult<()> {
    if cond {
        Err(BridgeError::unsupported(what))
    } else {
        Ok(())
    }
}

fn check_range(req: &proto::RangeRequest) -> BridgeResult<()> {
    reject_if(req.keys_only, "keys_only")?;
    reject_if(req.serializable, "serializable")?;
    reject_if(
        req.sort_order != range_request::SortOrder::None as i32,
        "sort_order",
    )?;
    reject_if(
        req.sort_target != range_request::SortTarget::Key as i32,
        "sort_target",
    )?;
    reject_if(req.min_mod_revision != 0, "min_mod_revision")?;
    reject_if(req.max_mod_revision != 0, "max_mod_revision")?;
    reject_if(req.min_create_revision != 0, "min_create_revision")?;
    reject_if(req.max_create_revision != 0, "max_create_revision")?;
    Ok(())
}

fn check_put(req: &proto::PutRequest) -> BridgeResult<()> {
    reject_if(req.lease != 0, "lease")?;
    check_put_options(req, "")
}

fn check_put_options(req: &proto::PutRequest, scope: &str) -> BridgeResult<()> {
    reject_if(req.prev_kv, &format!("{scope}prev_kv"))?;
    reject_if(req.ignore_value, &format!("{scope}ignore_value"))?;
    reject_if(req.ignore_lease, &format!("{scope}ignore_lease"))?;
    Ok(())
}

fn check_txn(req: &proto::TxnRequest) -> BridgeResult<()> {
    for cmp in &req.compare {
        // Raw fields: prost's getters turn unknown values into the default.
        match compare::CompareTarget::try_from(cmp.target) {
            Ok(compare::CompareTarget::Value) => {
                return Err(BridgeError::unsupported("compare.value"))
            }
            Ok(compare::CompareTarget::Version) => {
                return Err(BridgeError::unsupported("compare.version"))
            }
            Ok(compare::CompareTarget::Lease) => {
                return Err(BridgeError::unsupported("compare.lease"))
            }
            Ok(compare::CompareTarget::Create | compare::CompareTarget::Mod) => {}
            Err(_) => return Err(BridgeError::unsupported("compare.target")),
        }
        reject_if(
            cmp.result != compare::CompareResult::Equal as i32,
            "compare.result",
        )?;
        reject_if(!cmp.range_end.is_empty(), "compare.range_end")?;
    }

    for op in &req.success {
        match op.request.as_ref() {
            None => return Err(BridgeError::unsupported("txn.success.empty")),
            Some(request_op::Request::RequestRange(_)) => {
                return Err(BridgeError::unsupported("txn.success.range"))
            }
            Some(request_op::Request::RequestTxn(_)) => {
                return Err(BridgeError::unsupported("txn.success.txn"))
            }
            Some(request_op::Request::RequestPut(put)) => {
                check_put_options(put, "txn.success.put.")?
            }
            Some(request_op::Request::RequestDeleteRange(del)) => reject_if(
                !del.range_end.is_empty(),
                "txn.success.delete_range.range_end",
            )?,
        }
    }

    reject_if(!req.failure.is_empty(), "txn.failure")?;
    Ok(())
}
