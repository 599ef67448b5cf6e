//! Storage contract consumed by the etcd emulation.
//!
//! The core never touches a concrete store. Everything it needs is expressed
//! by [`Backend`]: point reads, prefix scans, counts, an unconditional put,
//! conditional update/delete, interval delete, and compaction. Revision
//! assignment is the backend's job; the core only threads the numbers it is
//! given back to the client.
//!
//! Every method returns a future that is cancelled by dropping it. A backend
//! must leave no partial write behind when that happens.
//!
//! Implementations:
//! - [`memory`] - in-process MVCC store used by the binary and the tests

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;

pub use memory::MemoryBackend;

/// A stored record as seen through the backend contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Lease identifier, carried through untouched.
    pub lease: i64,
    /// Revision at which the current lifetime of the key began.
    pub create_revision: i64,
    /// Revision of the last create or update.
    pub mod_revision: i64,
}

/// Result of a conditional write.
///
/// A lost precondition is a normal outcome, not a [`BackendError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write happened.
    ///
    /// For an update `kv` is the new record; for a delete it is the record
    /// that was removed.
    Applied {
        revision: i64,
        kv: Option<KeyValue>,
    },
    /// The guard did not hold. `current` is what the key looks like now.
    Conflict {
        revision: i64,
        current: Option<KeyValue>,
    },
}

impl WriteOutcome {
    /// Revision reported by the backend for this outcome.
    pub fn revision(&self) -> i64 {
        match self {
            Self::Applied { revision, .. } | Self::Conflict { revision, .. } => *revision,
        }
    }

    /// Whether the write was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// A change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The key did not exist before this event.
    pub create: bool,
    /// The key was removed by this event.
    pub delete: bool,
    pub kv: KeyValue,
    pub prev_kv: Option<KeyValue>,
}

/// What a backend hands back for a watch.
///
/// Backends without change notification return [`WatchResult::default`]:
/// no stream, no error. Callers treat that as reduced functionality.
/// A watch starting below the compaction floor also gets no stream, with
/// `compact_revision` set so the caller can tell history is missing.
#[derive(Debug, Default)]
pub struct WatchResult {
    pub current_revision: i64,
    pub compact_revision: i64,
    /// Batches of events in revision order. `None` when unsupported.
    pub events: Option<mpsc::UnboundedReceiver<Vec<Event>>>,
}

impl WatchResult {
    /// Whether the backend actually produced an event stream.
    pub fn is_supported(&self) -> bool {
        self.events.is_some()
    }
}

/// Storage failures.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested revision is below the compaction floor.
    #[error("mvcc: required revision {revision} has been compacted (floor {compact_revision})")]
    Compacted { revision: i64, compact_revision: i64 },

    /// The requested revision has not been written yet.
    #[error("mvcc: required revision {revision} is a future revision (current {current})")]
    FutureRevision { revision: i64, current: i64 },

    /// The store could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Any other storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;

/// Abstract key/value store with revisions.
///
/// `revision == 0` on a read means "current". Any read taking a revision must
/// be consistent as of that revision or fail.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Lifecycle hook, called once before serving.
    async fn start(&self) -> BackendResult<()>;

    /// Point lookup. Absent keys are `Ok((rev, None))`.
    async fn get(
        &self,
        key: &str,
        range_end: &str,
        limit: i64,
        revision: i64,
    ) -> BackendResult<(i64, Option<KeyValue>)>;

    /// Keys starting with `prefix` and not below `start_key`, ascending.
    /// `limit == 0` means unlimited.
    async fn list(
        &self,
        prefix: &str,
        start_key: &str,
        limit: i64,
        revision: i64,
    ) -> BackendResult<(i64, Vec<KeyValue>)>;

    /// Number of records [`Backend::list`] would return without a limit.
    async fn count(&self, prefix: &str, start_key: &str, revision: i64)
        -> BackendResult<(i64, i64)>;

    /// Unconditional upsert.
    async fn put(&self, key: &str, value: &[u8]) -> BackendResult<()>;

    /// Conditional replace.
    ///
    /// `revision == 0` creates the key and conflicts if it already exists.
    /// Otherwise the key's `mod_revision` must equal `revision`.
    async fn update(
        &self,
        key: &str,
        value: &[u8],
        revision: i64,
        lease: i64,
    ) -> BackendResult<WriteOutcome>;

    /// Conditional delete. `revision == 0` skips the revision check.
    async fn delete(&self, key: &str, revision: i64) -> BackendResult<WriteOutcome>;

    /// Unconditional delete of `[start_key, end_key)`; empty `end_key` is
    /// unbounded. Returns the removed records when the backend can tell.
    async fn delete_range(&self, start_key: &str, end_key: &str)
        -> BackendResult<Vec<KeyValue>>;

    /// Allow history at or below `revision` to be discarded.
    async fn compact(&self, revision: i64) -> BackendResult<i64>;

    async fn current_revision(&self) -> BackendResult<i64>;

    /// Approximate storage footprint in bytes.
    async fn db_size(&self) -> BackendResult<i64>;

    /// Change notification for keys under `prefix` newer than `revision`.
    async fn watch(&self, _prefix: &str, _revision: i64) -> WatchResult {
        WatchResult::default()
    }
}
