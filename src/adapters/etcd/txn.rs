//! Transaction shape recognition.
//!
//! etcd clients issue a handful of fixed compare-then-act transactions. Each
//! one maps onto a single conditional backend primitive, so the emulation
//! can honour it without a read-then-write pair. [`classify`] turns a
//! request into one of those shapes, or `None` for anything else.
//!
//! | Shape   | Compare                                   | Success            |
//! |---------|-------------------------------------------|--------------------|
//! | Create  | `create_revision == 0` or `mod == 0`      | one put            |
//! | Delete  | `mod_revision == R`, `R > 0`              | one delete (key)   |
//! | Update  | `mod_revision == R`, `R > 0`              | one put            |
//! | Compact | none                                      | put `compact_rev_key` |
//!
//! The failure branch must be empty in every shape.

use super::proto::{self, compare, request_op};

/// Reserved key whose put inside a comparator-free transaction requests a
/// compaction. The value is the target revision in decimal.
pub const COMPACT_REV_KEY: &str = "compact_rev_key";

/// A recognised transaction, borrowing from the request.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnShape<'a> {
    /// Create `key` if absent.
    Create {
        key: &'a [u8],
        value: &'a [u8],
        lease: i64,
    },
    /// Delete `key` if its mod revision is still `revision`.
    Delete {
        key: &'a [u8],
        revision: i64,
        prev_kv: bool,
    },
    /// Replace `key` if its mod revision is still `revision`.
    Update {
        key: &'a [u8],
        value: &'a [u8],
        revision: i64,
        lease: i64,
    },
    /// Compact history up to `revision`.
    Compact { revision: i64 },
}

impl TxnShape<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Delete { .. } => "delete",
            Self::Update { .. } => "update",
            Self::Compact { .. } => "compact",
        }
    }
}

/// Classify a transaction. Never partially accepts: any deviation from a
/// known shape yields `None`.
pub fn classify(txn: &proto::TxnRequest) -> Option<TxnShape<'_>> {
    if !txn.failure.is_empty() {
        return None;
    }
    let [op] = txn.success.as_slice() else {
        return None;
    };
    let action = op.request.as_ref()?;

    match txn.compare.as_slice() {
        [] => classify_compact(action),
        [cmp] => classify_guarded(cmp, action),
        _ => None,
    }
}

fn classify_compact(action: &request_op::Request) -> Option<TxnShape<'_>> {
    let request_op::Request::RequestPut(put) = action else {
        return None;
    };
    if put.key != COMPACT_REV_KEY.as_bytes() || has_put_options(put) {
        return None;
    }
    let revision = std::str::from_utf8(&put.value)
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    Some(TxnShape::Compact { revision })
}

fn classify_guarded<'a>(
    cmp: &'a proto::Compare,
    action: &'a request_op::Request,
) -> Option<TxnShape<'a>> {
    if cmp.result != compare::CompareResult::Equal as i32 || !cmp.range_end.is_empty() {
        return None;
    }
    let target = compare::CompareTarget::try_from(cmp.target).ok()?;

    let guard = match (target, cmp.target_union.as_ref()) {
        (compare::CompareTarget::Create, Some(compare::TargetUnion::CreateRevision(0))) => {
            Guard::Absent
        }
        (compare::CompareTarget::Mod, Some(compare::TargetUnion::ModRevision(0))) => {
            Guard::Absent
        }
        (compare::CompareTarget::Mod, Some(compare::TargetUnion::ModRevision(rev))) if *rev > 0 => {
            Guard::ModRevision(*rev)
        }
        // A zero comparison is encoded by omitting the union entirely.
        (compare::CompareTarget::Create | compare::CompareTarget::Mod, None) => Guard::Absent,
        _ => return None,
    };

    match (guard, action) {
        (Guard::Absent, request_op::Request::RequestPut(put))
            if put.key == cmp.key && !has_put_options(put) =>
        {
            Some(TxnShape::Create {
                key: &put.key,
                value: &put.value,
                lease: put.lease,
            })
        }
        (Guard::ModRevision(revision), request_op::Request::RequestPut(put))
            if put.key == cmp.key && !has_put_options(put) =>
        {
            Some(TxnShape::Update {
                key: &put.key,
                value: &put.value,
                revision,
                lease: put.lease,
            })
        }
        (Guard::ModRevision(revision), request_op::Request::RequestDeleteRange(del))
            if del.key == cmp.key && del.range_end.is_empty() =>
        {
            Some(TxnShape::Delete {
                key: &del.key,
                revision,
                prev_kv: del.prev_kv,
            })
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Guard {
    Absent,
    ModRevision(i64),
}

fn has_put_options(put: &proto::PutRequest) -> bool {
    put.prev_kv || put.ignore_value || put.ignore_lease
}
