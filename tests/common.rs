//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use async_trait::async_trait;
use kvbridge::backend::{
    Backend, BackendResult, KeyValue, MemoryBackend, WriteOutcome,
};
use kvbridge::etcd::proto::{
    Compare, DeleteRangeRequest, PutRequest, RangeRequest, RequestOp, TxnRequest,
};
use kvbridge::etcd::{HeaderIdentity, KvServerBridge, LimitedServer};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

// ============================================================================
// Config files
// ============================================================================

/// Write `content` to a temporary config file.
pub fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// A complete configuration with every section set.
pub fn create_full_config(bind: &str, member_id: u64, log_level: &str) -> NamedTempFile {
    config_file(&format!(
        r#"
[listener]
bind = "{bind}"

[cluster]
cluster_id = 100
member_id = {member_id}

[backend]
kind = "memory"

[telemetry]
log_level = "{log_level}"
"#
    ))
}

// ============================================================================
// Backends
// ============================================================================

/// Backend wrapper that counts every call reaching storage.
///
/// Does not override `watch`, so it also stands in for a backend without
/// change notification.
pub struct CountingBackend {
    inner: MemoryBackend,
    calls: AtomicUsize,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for CountingBackend {
    async fn start(&self) -> BackendResult<()> {
        self.hit();
        self.inner.start().await
    }

    async fn get(
        &self,
        key: &str,
        range_end: &str,
        limit: i64,
        revision: i64,
    ) -> BackendResult<(i64, Option<KeyValue>)> {
        self.hit();
        self.inner.get(key, range_end, limit, revision).await
    }

    async fn list(
        &self,
        prefix: &str,
        start_key: &str,
        limit: i64,
        revision: i64,
    ) -> BackendResult<(i64, Vec<KeyValue>)> {
        self.hit();
        self.inner.list(prefix, start_key, limit, revision).await
    }

    async fn count(
        &self,
        prefix: &str,
        start_key: &str,
        revision: i64,
    ) -> BackendResult<(i64, i64)> {
        self.hit();
        self.inner.count(prefix, start_key, revision).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        self.hit();
        self.inner.put(key, value).await
    }

    async fn update(
        &self,
        key: &str,
        value: &[u8],
        revision: i64,
        lease: i64,
    ) -> BackendResult<WriteOutcome> {
        self.hit();
        self.inner.update(key, value, revision, lease).await
    }

    async fn delete(&self, key: &str, revision: i64) -> BackendResult<WriteOutcome> {
        self.hit();
        self.inner.delete(key, revision).await
    }

    async fn delete_range(&self, start_key: &str, end_key: &str) -> BackendResult<Vec<KeyValue>> {
        self.hit();
        self.inner.delete_range(start_key, end_key).await
    }

    async fn compact(&self, revision: i64) -> BackendResult<i64> {
        self.hit();
        self.inner.compact(revision).await
    }

    async fn current_revision(&self) -> BackendResult<i64> {
        self.hit();
        self.inner.current_revision().await
    }

    async fn db_size(&self) -> BackendResult<i64> {
        self.hit();
        self.inner.db_size().await
    }
}

/// Bridge over a fresh in-memory backend.
pub fn memory_bridge() -> KvServerBridge {
    bridge_over(Arc::new(MemoryBackend::new()))
}

pub fn bridge_over(backend: Arc<dyn Backend>) -> KvServerBridge {
    KvServerBridge::new(LimitedServer::new(backend, HeaderIdentity::default()))
}

/// Bridge over a counting backend, returning both.
pub fn counting_bridge() -> (KvServerBridge, Arc<CountingBackend>) {
    let backend = Arc::new(CountingBackend::new());
    (bridge_over(backend.clone()), backend)
}

// ============================================================================
// Request builders
// ============================================================================

pub fn get(key: &str) -> RangeRequest {
    RangeRequest {
        key: key.as_bytes().to_vec(),
        ..Default::default()
    }
}

/// List every key under `prefix`, the way etcd clients encode it.
pub fn list(prefix: &str, limit: i64) -> RangeRequest {
    let mut range_end = prefix.as_bytes().to_vec();
    if let Some(last) = range_end.last_mut() {
        *last += 1;
    }
    RangeRequest {
        key: prefix.as_bytes().to_vec(),
        range_end,
        limit,
        ..Default::default()
    }
}

pub fn put(key: &str, value: &str) -> PutRequest {
    PutRequest {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
        ..Default::default()
    }
}

pub fn delete(key: &str) -> DeleteRangeRequest {
    DeleteRangeRequest {
        key: key.as_bytes().to_vec(),
        ..Default::default()
    }
}

/// Create-if-absent transaction.
pub fn create_txn(key: &str, value: &str) -> TxnRequest {
    TxnRequest {
        compare: vec![Compare::mod_revision(key.as_bytes().to_vec(), 0)],
        success: vec![RequestOp::put(put(key, value))],
        failure: vec![],
    }
}

/// Compare-and-swap transaction.
pub fn update_txn(key: &str, value: &str, revision: i64) -> TxnRequest {
    TxnRequest {
        compare: vec![Compare::mod_revision(key.as_bytes().to_vec(), revision)],
        success: vec![RequestOp::put(put(key, value))],
        failure: vec![],
    }
}

/// Compare-and-delete transaction.
pub fn delete_txn(key: &str, revision: i64) -> TxnRequest {
    TxnRequest {
        compare: vec![Compare::mod_revision(key.as_bytes().to_vec(), revision)],
        success: vec![RequestOp::delete_range(delete(key))],
        failure: vec![],
    }
}
