//! Revision-aware request handling over the [`Backend`] contract.
//!
//! [`LimitedServer`] turns the KV RPCs into backend calls and builds the
//! etcd-shaped replies. It keeps no state between calls besides the header
//! identity; every revision it reports comes from the backend.
//!
//! Conditional writes go straight to the backend's conditional primitives.
//! There are no retries and no read-then-write pairs.

use super::convert::{self, HeaderIdentity};
use super::proto;
use super::txn::{self, TxnShape};
use crate::backend::{Backend, KeyValue, WatchResult, WriteOutcome};
use crate::core::error::{BridgeError, BridgeResult};
use std::sync::Arc;

/// Range result before records are wrapped for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeResult {
    pub header: proto::ResponseHeader,
    pub kvs: Vec<KeyValue>,
    pub more: bool,
    pub count: i64,
}

/// Executes KV requests against a backend.
#[derive(Clone)]
pub struct LimitedServer {
    backend: Arc<dyn Backend>,
    identity: HeaderIdentity,
}

impl LimitedServer {
    pub fn new(backend: Arc<dyn Backend>, identity: HeaderIdentity) -> Self {
        Self { backend, identity }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn identity(&self) -> HeaderIdentity {
        self.identity
    }

    // ========================================================================
    // Range
    // ========================================================================

    /// Single-key get when `range_end` is empty, prefix list otherwise.
    pub async fn range(&self, req: &proto::RangeRequest) -> BridgeResult<RangeResult> {
        if req.range_end.is_empty() {
            self.get(req).await
        } else {
            self.list(req).await
        }
    }

    async fn get(&self, req: &proto::RangeRequest) -> BridgeResult<RangeResult> {
        let key = convert::key_str("key", &req.key)?;
        let (revision, kv) = self
            .backend
            .get(key, "", req.limit, req.revision)
            .await
            .map_err(BridgeError::backend("get"))?;

        let count = i64::from(kv.is_some());
        let kvs = if req.count_only {
            Vec::new()
        } else {
            kv.into_iter().collect()
        };

        Ok(RangeResult {
            header: self.identity.header(revision),
            kvs,
            more: false,
            count,
        })
    }

    async fn list(&self, req: &proto::RangeRequest) -> BridgeResult<RangeResult> {
        let prefix_bytes = list_prefix(&req.key, &req.range_end)?;
        let prefix = convert::key_str("range_end", &prefix_bytes)?;
        // Continuation requests send the last key seen plus "\0", which sorts
        // directly after it, so `key` works unchanged as an inclusive start.
        let start_key = convert::key_str("key", &req.key)?;

        if req.count_only {
            let (revision, count) = self
                .backend
                .count(prefix, start_key, req.revision)
                .await
                .map_err(BridgeError::backend("count"))?;
            return Ok(RangeResult {
                header: self.identity.header(revision),
                kvs: Vec::new(),
                more: false,
                count,
            });
        }

        let limit = if req.limit > 0 {
            req.limit.saturating_add(1)
        } else {
            0
        };
        let (revision, mut kvs) = self
            .backend
            .list(prefix, start_key, limit, req.revision)
            .await
            .map_err(BridgeError::backend("list"))?;

        let mut more = false;
        let mut count = kvs.len() as i64;
        if req.limit > 0 && count > req.limit {
            more = true;
            kvs.truncate(req.limit as usize);
            // Re-count at the list's revision so the total matches the page.
            let (_, total) = self
                .backend
                .count(prefix, start_key, revision)
                .await
                .map_err(BridgeError::backend("count"))?;
            count = total;
        }

        tracing::debug!(prefix, start_key, revision, count, more, "list");

        Ok(RangeResult {
            header: self.identity.header(revision),
            kvs,
            more,
            count,
        })
    }

    // ========================================================================
    // Put / DeleteRange
    // ========================================================================

    /// Unconditional put. The header carries the revision after the write.
    ///
    /// The revision is read in a second backend call, so with concurrent
    /// writers it may already include a later write.
    pub async fn put(&self, req: &proto::PutRequest) -> BridgeResult<proto::PutResponse> {
        let key = convert::key_str("key", &req.key)?;
        self.backend
            .put(key, &req.value)
            .await
            .map_err(BridgeError::backend("put"))?;
        let revision = self.current_revision().await?;

        Ok(proto::PutResponse {
            header: Some(self.identity.header(revision)),
            prev_kv: None,
        })
    }

    /// Unconditional interval delete.
    ///
    /// As with [`put`](Self::put), the header revision is read after the
    /// delete and may include a concurrent later write.
    pub async fn delete_range(
        &self,
        req: &proto::DeleteRangeRequest,
    ) -> BridgeResult<proto::DeleteRangeResponse> {
        let start = convert::key_str("key", &req.key)?;
        let end = match req.range_end.as_slice() {
            [] => format!("{start}\0"),
            [0] => String::new(),
            range_end => convert::key_str("range_end", range_end)?.to_string(),
        };

        let removed = self
            .backend
            .delete_range(start, &end)
            .await
            .map_err(BridgeError::backend("delete_range"))?;
        let revision = self.current_revision().await?;

        let deleted = removed.len() as i64;
        let prev_kvs = if req.prev_kv {
            convert::to_kvs(removed)
        } else {
            Vec::new()
        };

        Ok(proto::DeleteRangeResponse {
            header: Some(self.identity.header(revision)),
            deleted,
            prev_kvs,
        })
    }

    // ========================================================================
    // Txn
    // ========================================================================

    /// Run a recognised transaction shape; anything else is unsupported.
    pub async fn txn(&self, req: &proto::TxnRequest) -> BridgeResult<proto::TxnResponse> {
        let Some(shape) = txn::classify(req) else {
            return Err(BridgeError::unsupported("txn"));
        };
        tracing::debug!(shape = shape.name(), "txn");

        match shape {
            TxnShape::Create { key, value, lease } => {
                self.create(convert::key_str("key", key)?, value, lease)
                    .await
            }
            TxnShape::Delete {
                key,
                revision,
                prev_kv,
            } => {
                self.delete(convert::key_str("key", key)?, revision, prev_kv)
                    .await
            }
            TxnShape::Update {
                key,
                value,
                revision,
                lease,
            } => {
                self.update(convert::key_str("key", key)?, value, revision, lease)
                    .await
            }
            TxnShape::Compact { revision } => self.compact_txn(revision).await,
        }
    }

    /// Create `key` only if it does not exist.
    pub async fn create(
        &self,
        key: &str,
        value: &[u8],
        lease: i64,
    ) -> BridgeResult<proto::TxnResponse> {
        let outcome = self
            .backend
            .update(key, value, 0, lease)
            .await
            .map_err(BridgeError::backend("create"))?;
        Ok(self.put_outcome(outcome))
    }

    /// Replace `key` if its mod revision is still `revision`.
    pub async fn update(
        &self,
        key: &str,
        value: &[u8],
        revision: i64,
        lease: i64,
    ) -> BridgeResult<proto::TxnResponse> {
        let outcome = self
            .backend
            .update(key, value, revision, lease)
            .await
            .map_err(BridgeError::backend("update"))?;
        Ok(self.put_outcome(outcome))
    }

    /// Delete `key` if its mod revision is still `revision`.
    pub async fn delete(
        &self,
        key: &str,
        revision: i64,
        prev_kv: bool,
    ) -> BridgeResult<proto::TxnResponse> {
        let outcome = self
            .backend
            .delete(key, revision)
            .await
            .map_err(BridgeError::backend("delete"))?;

        Ok(match outcome {
            WriteOutcome::Applied { revision, kv } => {
                let prev_kvs = match kv {
                    Some(kv) if prev_kv => vec![convert::to_kv(kv)],
                    _ => Vec::new(),
                };
                let header = self.identity.header(revision);
                proto::TxnResponse {
                    header: Some(header.clone()),
                    succeeded: true,
                    responses: vec![proto::ResponseOp::delete_range(
                        proto::DeleteRangeResponse {
                            header: Some(header),
                            deleted: 1,
                            prev_kvs,
                        },
                    )],
                }
            }
            WriteOutcome::Conflict { revision, .. } => self.not_met(revision),
        })
    }

    async fn compact_txn(&self, revision: i64) -> BridgeResult<proto::TxnResponse> {
        let current = self
            .backend
            .compact(revision)
            .await
            .map_err(BridgeError::backend("compact"))?;
        let header = self.identity.header(current);

        Ok(proto::TxnResponse {
            header: Some(header.clone()),
            succeeded: true,
            responses: vec![proto::ResponseOp::put(proto::PutResponse {
                header: Some(header),
                prev_kv: None,
            })],
        })
    }

    fn put_outcome(&self, outcome: WriteOutcome) -> proto::TxnResponse {
        match outcome {
            WriteOutcome::Applied { revision, .. } => {
                let header = self.identity.header(revision);
                proto::TxnResponse {
                    header: Some(header.clone()),
                    succeeded: true,
                    responses: vec![proto::ResponseOp::put(proto::PutResponse {
                        header: Some(header),
                        prev_kv: None,
                    })],
                }
            }
            WriteOutcome::Conflict { revision, .. } => self.not_met(revision),
        }
    }

    /// Lost precondition. The failure branch is always empty, so there is
    /// nothing to execute.
    fn not_met(&self, revision: i64) -> proto::TxnResponse {
        proto::TxnResponse {
            header: Some(self.identity.header(revision)),
            succeeded: false,
            responses: Vec::new(),
        }
    }

    // ========================================================================
    // Compact / Watch
    // ========================================================================

    pub async fn compact(
        &self,
        req: &proto::CompactionRequest,
    ) -> BridgeResult<proto::CompactionResponse> {
        let revision = self
            .backend
            .compact(req.revision)
            .await
            .map_err(BridgeError::backend("compact"))?;
        Ok(proto::CompactionResponse {
            header: Some(self.identity.header(revision)),
        })
    }

    /// Change notification under `prefix`. Empty when the backend has none.
    pub async fn watch(&self, prefix: &str, revision: i64) -> WatchResult {
        let result = self.backend.watch(prefix, revision).await;
        if !result.is_supported() {
            tracing::debug!(prefix, revision, "backend does not support watch");
        }
        result
    }

    async fn current_revision(&self) -> BridgeResult<i64> {
        self.backend
            .current_revision()
            .await
            .map_err(BridgeError::backend("current_revision"))
    }
}

/// Prefix selected by a list's `range_end`.
///
/// `"\0"` selects every key. Otherwise `range_end` must be the prefix with
/// its last byte incremented, and `key` must fall under that prefix.
fn list_prefix(key: &[u8], range_end: &[u8]) -> BridgeResult<Vec<u8>> {
    if range_end == [0] {
        return Ok(Vec::new());
    }
    let Some((&last, head)) = range_end.split_last() else {
        return Err(BridgeError::unsupported("range_end"));
    };
    if last == 0 {
        return Err(BridgeError::unsupported("range_end"));
    }
    let mut prefix = head.to_vec();
    prefix.push(last - 1);
    if !key.starts_with(&prefix) {
        return Err(BridgeError::unsupported("range_end"));
    }
    Ok(prefix)
}
