//! Conversions between backend records and wire messages.

use super::proto;
use crate::backend::KeyValue;
use crate::core::error::{BridgeError, BridgeResult};

/// Identity stamped into every response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderIdentity {
    pub cluster_id: u64,
    pub member_id: u64,
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self {
            cluster_id: 1,
            member_id: 1,
        }
    }
}

impl HeaderIdentity {
    pub fn new(cluster_id: u64, member_id: u64) -> Self {
        Self {
            cluster_id,
            member_id,
        }
    }

    /// Build a response header at `revision`.
    pub fn header(&self, revision: i64) -> proto::ResponseHeader {
        proto::ResponseHeader {
            cluster_id: self.cluster_id,
            member_id: self.member_id,
            revision,
            raft_term: 1,
        }
    }
}

/// Backend record to wire record. `version` is not tracked and stays 0.
pub fn to_kv(kv: KeyValue) -> proto::KeyValue {
    proto::KeyValue {
        key: kv.key.into_bytes(),
        create_revision: kv.create_revision,
        mod_revision: kv.mod_revision,
        version: 0,
        value: kv.value,
        lease: kv.lease,
    }
}

pub fn to_kvs(kvs: Vec<KeyValue>) -> Vec<proto::KeyValue> {
    kvs.into_iter().map(to_kv).collect()
}

/// Decode a wire key into the textual form the backend works with.
pub fn key_str<'a>(field: &'static str, bytes: &'a [u8]) -> BridgeResult<&'a str> {
    std::str::from_utf8(bytes)
        .map_err(|_| BridgeError::invalid(format!("{field} is not valid UTF-8")))
}

/// Lossy rendering of a wire key for log fields.
pub fn display_key(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
