//! In-process MVCC backend.
//!
//! Every key owns a chain of versions ordered by revision. A deletion appends
//! a tombstone so that reads pinned to an older revision still see the key.
//! One global counter hands out revisions; each mutating call consumes
//! exactly one of them, including `delete_range` over many keys.
//!
//! Not persisted. Used by the `start` command and the test-suite.

use super::{
    Backend, BackendError, BackendResult, Event, KeyValue, WatchResult, WriteOutcome,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Version {
    /// Revision that wrote this version.
    revision: i64,
    create_revision: i64,
    lease: i64,
    /// `None` marks a tombstone.
    value: Option<Vec<u8>>,
}

impl Version {
    fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    fn to_kv(&self, key: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: self.value.clone().unwrap_or_default(),
            lease: self.lease,
            create_revision: self.create_revision,
            mod_revision: self.revision,
        }
    }
}

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<Vec<Event>>,
}

#[derive(Default)]
struct Inner {
    revision: i64,
    compact_revision: i64,
    keys: BTreeMap<String, Vec<Version>>,
    watchers: Vec<Watcher>,
}

impl Inner {
    /// Map a requested read revision onto a concrete one.
    fn resolve(&self, revision: i64) -> BackendResult<i64> {
        if revision == 0 {
            return Ok(self.revision);
        }
        if revision < self.compact_revision {
            return Err(BackendError::Compacted {
                revision,
                compact_revision: self.compact_revision,
            });
        }
        if revision > self.revision {
            return Err(BackendError::FutureRevision {
                revision,
                current: self.revision,
            });
        }
        Ok(revision)
    }

    /// The live record for `key` as of `revision`.
    fn visible(&self, key: &str, revision: i64) -> Option<KeyValue> {
        let versions = self.keys.get(key)?;
        let version = versions.iter().rev().find(|v| v.revision <= revision)?;
        if version.is_tombstone() {
            None
        } else {
            Some(version.to_kv(key))
        }
    }

    fn latest(&self, key: &str) -> Option<KeyValue> {
        self.visible(key, self.revision)
    }

    fn scan(&self, prefix: &str, start_key: &str, revision: i64) -> Vec<KeyValue> {
        let from = if start_key > prefix { start_key } else { prefix };
        self.keys
            .range::<str, _>((Bound::Included(from), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, _)| self.visible(key, revision))
            .collect()
    }

    fn next_revision(&mut self) -> i64 {
        self.revision += 1;
        self.revision
    }

    fn write(
        &mut self,
        key: &str,
        revision: i64,
        create_revision: i64,
        lease: i64,
        value: Option<Vec<u8>>,
    ) {
        self.keys.entry(key.to_string()).or_default().push(Version {
            revision,
            create_revision,
            lease,
            value,
        });
    }

    fn notify(&mut self, events: Vec<Event>) {
        if self.watchers.is_empty() {
            return;
        }
        self.watchers.retain(|watcher| {
            if watcher.tx.is_closed() {
                return false;
            }
            let batch: Vec<Event> = events
                .iter()
                .filter(|e| e.kv.key.starts_with(&watcher.prefix))
                .cloned()
                .collect();
            batch.is_empty() || watcher.tx.send(batch).is_ok()
        });
    }

    /// Rebuild events for retained history newer than `after`.
    fn replay(&self, prefix: &str, after: i64) -> Vec<Event> {
        let mut events = Vec::new();
        for (key, versions) in self
            .keys
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            let mut prev: Option<KeyValue> = None;
            for version in versions {
                let kv = version.to_kv(key);
                if version.revision > after {
                    events.push(Event {
                        create: prev.is_none() && !version.is_tombstone(),
                        delete: version.is_tombstone(),
                        kv: kv.clone(),
                        prev_kv: prev.clone(),
                    });
                }
                prev = if version.is_tombstone() { None } else { Some(kv) };
            }
        }
        events.sort_by_key(|e| e.kv.mod_revision);
        events
    }
}

/// In-memory implementation of [`Backend`].
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest revision still readable.
    pub fn compact_revision(&self) -> i64 {
        self.inner.read().compact_revision
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn start(&self) -> BackendResult<()> {
        tracing::debug!("memory backend started");
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        _range_end: &str,
        _limit: i64,
        revision: i64,
    ) -> BackendResult<(i64, Option<KeyValue>)> {
        let inner = self.inner.read();
        let revision = inner.resolve(revision)?;
        Ok((revision, inner.visible(key, revision)))
    }

    async fn list(
        &self,
        prefix: &str,
        start_key: &str,
        limit: i64,
        revision: i64,
    ) -> BackendResult<(i64, Vec<KeyValue>)> {
        let inner = self.inner.read();
        let revision = inner.resolve(revision)?;
        let mut kvs = inner.scan(prefix, start_key, revision);
        if limit > 0 {
            kvs.truncate(limit as usize);
        }
        Ok((revision, kvs))
    }

    async fn count(
        &self,
        prefix: &str,
        start_key: &str,
        revision: i64,
    ) -> BackendResult<(i64, i64)> {
        let inner = self.inner.read();
        let revision = inner.resolve(revision)?;
        Ok((revision, inner.scan(prefix, start_key, revision).len() as i64))
    }

    async fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let mut inner = self.inner.write();
        let prev = inner.latest(key);
        let revision = inner.next_revision();
        let (create_revision, lease) = prev
            .as_ref()
            .map(|kv| (kv.create_revision, kv.lease))
            .unwrap_or((revision, 0));
        inner.write(key, revision, create_revision, lease, Some(value.to_vec()));

        let kv = inner.latest(key).unwrap_or_default();
        inner.notify(vec![Event {
            create: prev.is_none(),
            delete: false,
            kv,
            prev_kv: prev,
        }]);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        value: &[u8],
        revision: i64,
        lease: i64,
    ) -> BackendResult<WriteOutcome> {
        let mut inner = self.inner.write();
        let current = inner.latest(key);

        let guard_holds = match &current {
            None => revision == 0,
            Some(kv) => revision != 0 && kv.mod_revision == revision,
        };
        if !guard_holds {
            return Ok(WriteOutcome::Conflict {
                revision: inner.revision,
                current,
            });
        }

        let create_revision = current.as_ref().map(|kv| kv.create_revision);
        let new_revision = inner.next_revision();
        inner.write(
            key,
            new_revision,
            create_revision.unwrap_or(new_revision),
            lease,
            Some(value.to_vec()),
        );
        let kv = inner.latest(key);
        if let Some(ref kv) = kv {
            inner.notify(vec![Event {
                create: current.is_none(),
                delete: false,
                kv: kv.clone(),
                prev_kv: current,
            }]);
        }
        Ok(WriteOutcome::Applied {
            revision: new_revision,
            kv,
        })
    }

    async fn delete(&self, key: &str, revision: i64) -> BackendResult<WriteOutcome> {
        let mut inner = self.inner.write();
        let current = match inner.latest(key) {
            Some(kv) if revision == 0 || kv.mod_revision == revision => kv,
            other => {
                return Ok(WriteOutcome::Conflict {
                    revision: inner.revision,
                    current: other,
                })
            }
        };

        let new_revision = inner.next_revision();
        inner.write(key, new_revision, current.create_revision, current.lease, None);
        inner.notify(vec![Event {
            create: false,
            delete: true,
            kv: KeyValue {
                key: key.to_string(),
                value: Vec::new(),
                lease: current.lease,
                create_revision: current.create_revision,
                mod_revision: new_revision,
            },
            prev_kv: Some(current.clone()),
        }]);
        Ok(WriteOutcome::Applied {
            revision: new_revision,
            kv: Some(current),
        })
    }

    async fn delete_range(&self, start_key: &str, end_key: &str) -> BackendResult<Vec<KeyValue>> {
        let mut inner = self.inner.write();
        let upper = if end_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end_key)
        };
        let current = inner.revision;
        let removed: Vec<KeyValue> = inner
            .keys
            .range::<str, _>((Bound::Included(start_key), upper))
            .filter_map(|(key, _)| inner.visible(key, current))
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }

        let revision = inner.next_revision();
        let mut events = Vec::with_capacity(removed.len());
        for kv in &removed {
            inner.write(&kv.key, revision, kv.create_revision, kv.lease, None);
            events.push(Event {
                create: false,
                delete: true,
                kv: KeyValue {
                    value: Vec::new(),
                    mod_revision: revision,
                    ..kv.clone()
                },
                prev_kv: Some(kv.clone()),
            });
        }
        inner.notify(events);
        Ok(removed)
    }

    async fn compact(&self, revision: i64) -> BackendResult<i64> {
        let mut inner = self.inner.write();
        if revision <= inner.compact_revision {
            return Err(BackendError::Compacted {
                revision,
                compact_revision: inner.compact_revision,
            });
        }
        if revision > inner.revision {
            return Err(BackendError::FutureRevision {
                revision,
                current: inner.revision,
            });
        }

        inner.keys.retain(|_, versions| {
            if let Some(floor) = versions.iter().rposition(|v| v.revision <= revision) {
                let keep_from = if versions[floor].is_tombstone() {
                    floor + 1
                } else {
                    floor
                };
                versions.drain(..keep_from);
            }
            !versions.is_empty()
        });
        inner.compact_revision = revision;
        tracing::debug!(revision, keys = inner.keys.len(), "memory backend compacted");
        Ok(inner.revision)
    }

    async fn current_revision(&self) -> BackendResult<i64> {
        Ok(self.inner.read().revision)
    }

    async fn db_size(&self) -> BackendResult<i64> {
        let inner = self.inner.read();
        let size: usize = inner
            .keys
            .iter()
            .map(|(key, versions)| {
                versions
                    .iter()
                    .map(|v| key.len() + v.value.as_ref().map_or(0, Vec::len))
                    .sum::<usize>()
            })
            .sum();
        Ok(size as i64)
    }

    async fn watch(&self, prefix: &str, revision: i64) -> WatchResult {
        let mut inner = self.inner.write();
        inner.watchers.retain(|watcher| !watcher.tx.is_closed());
        if revision > 0 && revision < inner.compact_revision {
            tracing::debug!(
                prefix,
                revision,
                compact_revision = inner.compact_revision,
                "watch below compaction floor"
            );
            return WatchResult {
                current_revision: inner.revision,
                compact_revision: inner.compact_revision,
                events: None,
            };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if revision > 0 {
            let history = inner.replay(prefix, revision);
            if !history.is_empty() && tx.send(history).is_err() {
                return WatchResult::default();
            }
        }
        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        WatchResult {
            current_revision: inner.revision,
            compact_revision: inner.compact_revision,
            events: Some(rx),
        }
    }
}
