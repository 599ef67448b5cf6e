//! End-to-end behaviour of the KV emulation over the in-memory backend.

mod common;

use common::{create_txn, delete, delete_txn, get, list, memory_bridge, put, update_txn};
use kvbridge::etcd::proto::{
    request_op, response_op, CompactionRequest, PutRequest, RequestOp, ResponseHeader,
    TxnRequest,
};
use kvbridge::etcd::COMPACT_REV_KEY;
use kvbridge::error::BridgeError;
use tonic::Code;

fn header_rev(header: &Option<ResponseHeader>) -> i64 {
    header.as_ref().map_or(0, |h| h.revision)
}

// ============================================================================
// Revisions
// ============================================================================

#[tokio::test]
async fn revisions_increase_across_mutations() {
    let kv = memory_bridge();
    let mut last = 0;

    let p = kv.put(put("/a", "1")).await.unwrap();
    assert!(header_rev(&p.header) > last);
    last = header_rev(&p.header);

    let c = kv.txn(create_txn("/b", "1")).await.unwrap();
    assert!(c.succeeded);
    assert!(header_rev(&c.header) > last);
    last = header_rev(&c.header);

    let u = kv.txn(update_txn("/b", "2", last)).await.unwrap();
    assert!(u.succeeded);
    assert!(header_rev(&u.header) > last);
    last = header_rev(&u.header);

    let d = kv.delete_range(delete("/a")).await.unwrap();
    assert_eq!(d.deleted, 1);
    assert!(header_rev(&d.header) > last);
}

#[tokio::test]
async fn create_then_get_round_trip() {
    let kv = memory_bridge();
    kv.put(put("/other", "x")).await.unwrap();

    let created = kv.txn(create_txn("/k", "v")).await.unwrap();
    assert!(created.succeeded);
    let rev = header_rev(&created.header);

    let resp = kv.range(get("/k")).await.unwrap();
    assert_eq!(resp.count, 1);
    assert_eq!(resp.kvs.len(), 1);
    let record = &resp.kvs[0];
    assert_eq!(record.key, b"/k");
    assert_eq!(record.value, b"v");
    assert_eq!(record.create_revision, rev);
    assert_eq!(record.mod_revision, rev);
}

#[tokio::test]
async fn create_existing_key_not_met() {
    let kv = memory_bridge();
    kv.txn(create_txn("/k", "v1")).await.unwrap();

    let again = kv.txn(create_txn("/k", "v2")).await.unwrap();
    assert!(!again.succeeded);
    assert!(again.responses.is_empty());

    let resp = kv.range(get("/k")).await.unwrap();
    assert_eq!(resp.kvs[0].value, b"v1");
}

#[tokio::test]
async fn get_missing_key_is_empty() {
    let kv = memory_bridge();
    let resp = kv.range(get("/missing")).await.unwrap();
    assert_eq!(resp.count, 0);
    assert!(resp.kvs.is_empty());
    assert!(!resp.more);
}

// ============================================================================
// Compare-and-swap
// ============================================================================

#[tokio::test]
async fn stale_update_is_not_applied() {
    let kv = memory_bridge();
    let created = kv.txn(create_txn("/k", "v1")).await.unwrap();
    let r1 = header_rev(&created.header);

    let updated = kv.txn(update_txn("/k", "v2", r1)).await.unwrap();
    assert!(updated.succeeded);
    let r2 = header_rev(&updated.header);
    assert!(r2 > r1);
    match &updated.responses[0].response {
        Some(response_op::Response::ResponsePut(p)) => assert_eq!(header_rev(&p.header), r2),
        other => panic!("unexpected response: {other:?}"),
    }

    let stale = kv.txn(update_txn("/k", "v3", r1)).await.unwrap();
    assert!(!stale.succeeded);
    assert!(stale.responses.is_empty());

    let resp = kv.range(get("/k")).await.unwrap();
    assert_eq!(resp.kvs[0].value, b"v2");
    assert_eq!(resp.kvs[0].mod_revision, r2);
    assert_eq!(resp.kvs[0].create_revision, r1);
}

#[tokio::test]
async fn compare_and_delete() {
    let kv = memory_bridge();
    let created = kv.txn(create_txn("/k", "v")).await.unwrap();
    let rev = header_rev(&created.header);

    let wrong = kv.txn(delete_txn("/k", rev + 10)).await.unwrap();
    assert!(!wrong.succeeded);
    assert_eq!(kv.range(get("/k")).await.unwrap().count, 1);

    let mut right = delete_txn("/k", rev);
    if let Some(request_op::Request::RequestDeleteRange(del)) = right.success[0].request.as_mut() {
        del.prev_kv = true;
    }
    let deleted = kv.txn(right).await.unwrap();
    assert!(deleted.succeeded);
    match &deleted.responses[0].response {
        Some(response_op::Response::ResponseDeleteRange(d)) => {
            assert_eq!(d.deleted, 1);
            assert_eq!(d.prev_kvs.len(), 1);
            assert_eq!(d.prev_kvs[0].value, b"v");
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(kv.range(get("/k")).await.unwrap().count, 0);
}

#[tokio::test]
async fn recreate_after_delete_gets_new_create_revision() {
    let kv = memory_bridge();
    let first = kv.txn(create_txn("/k", "v")).await.unwrap();
    let r1 = header_rev(&first.header);
    kv.txn(delete_txn("/k", r1)).await.unwrap();

    let second = kv.txn(create_txn("/k", "v")).await.unwrap();
    assert!(second.succeeded);
    let record = kv.range(get("/k")).await.unwrap().kvs.remove(0);
    assert!(record.create_revision > r1);
}

// ============================================================================
// Lists
// ============================================================================

#[tokio::test]
async fn list_is_ordered_and_paginated() {
    let kv = memory_bridge();
    for key in ["/p/c", "/p/a", "/p/b"] {
        kv.put(put(key, "x")).await.unwrap();
    }
    kv.put(put("/q/a", "x")).await.unwrap();

    let page = kv.range(list("/p/", 2)).await.unwrap();
    assert_eq!(page.kvs.len(), 2);
    assert!(page.more);
    assert_eq!(page.count, 3);
    assert_eq!(page.kvs[0].key, b"/p/a");
    assert_eq!(page.kvs[1].key, b"/p/b");

    // Continue after the last key seen, as paging clients do.
    let mut next = list("/p/", 2);
    next.key = b"/p/b\0".to_vec();
    next.revision = header_rev(&page.header);
    let rest = kv.range(next).await.unwrap();
    assert_eq!(rest.kvs.len(), 1);
    assert!(!rest.more);
    assert_eq!(rest.kvs[0].key, b"/p/c");
}

#[tokio::test]
async fn list_all_keys_with_nul_range_end() {
    let kv = memory_bridge();
    kv.put(put("/a", "1")).await.unwrap();
    kv.put(put("/b", "2")).await.unwrap();

    let mut req = get("/");
    req.range_end = vec![0];
    let resp = kv.range(req).await.unwrap();
    assert_eq!(resp.count, 2);
}

#[tokio::test]
async fn list_count_only() {
    let kv = memory_bridge();
    for key in ["/p/a", "/p/b", "/p/c"] {
        kv.put(put(key, "x")).await.unwrap();
    }
    let mut req = list("/p/", 0);
    req.count_only = true;
    let resp = kv.range(req).await.unwrap();
    assert_eq!(resp.count, 3);
    assert!(resp.kvs.is_empty());
}

#[tokio::test]
async fn list_reads_at_historical_revision() {
    let kv = memory_bridge();
    kv.put(put("/p/a", "1")).await.unwrap();
    let at = header_rev(&kv.put(put("/p/b", "1")).await.unwrap().header);
    kv.put(put("/p/c", "1")).await.unwrap();
    kv.delete_range(delete("/p/a")).await.unwrap();

    let mut req = list("/p/", 0);
    req.revision = at;
    let resp = kv.range(req).await.unwrap();
    let keys: Vec<_> = resp.kvs.iter().map(|kv| kv.key.clone()).collect();
    assert_eq!(keys, vec![b"/p/a".to_vec(), b"/p/b".to_vec()]);
    assert_eq!(header_rev(&resp.header), at);
}

#[tokio::test]
async fn range_end_that_is_not_a_prefix_is_unsupported() {
    let kv = memory_bridge();
    let mut req = get("/a");
    req.range_end = b"/z".to_vec();
    let err = kv.range(req).await.unwrap_err();
    assert!(matches!(err, BridgeError::Unsupported { .. }));
}

// ============================================================================
// Delete range
// ============================================================================

#[tokio::test]
async fn delete_range_over_prefix() {
    let kv = memory_bridge();
    for key in ["/p/a", "/p/b", "/q/a"] {
        kv.put(put(key, "x")).await.unwrap();
    }
    let mut req = delete("/p/");
    req.range_end = b"/p0".to_vec();
    req.prev_kv = true;
    let resp = kv.delete_range(req).await.unwrap();
    assert_eq!(resp.deleted, 2);
    assert_eq!(resp.prev_kvs.len(), 2);
    assert_eq!(kv.range(list("/p/", 0)).await.unwrap().count, 0);
    assert_eq!(kv.range(get("/q/a")).await.unwrap().count, 1);
}

#[tokio::test]
async fn delete_range_without_prev_kv_omits_records() {
    let kv = memory_bridge();
    kv.put(put("/a", "x")).await.unwrap();
    let resp = kv.delete_range(delete("/a")).await.unwrap();
    assert_eq!(resp.deleted, 1);
    assert!(resp.prev_kvs.is_empty());
}

// ============================================================================
// Compaction
// ============================================================================

#[tokio::test]
async fn compaction_floor_rejects_old_reads() {
    let kv = memory_bridge();
    for value in ["1", "2", "3"] {
        kv.put(put("/k", value)).await.unwrap();
    }

    let resp = kv
        .compact(CompactionRequest {
            revision: 2,
            physical: false,
        })
        .await
        .unwrap();
    assert_eq!(header_rev(&resp.header), 3);

    let mut old = get("/k");
    old.revision = 1;
    let err = kv.range(old).await.unwrap_err();
    assert_eq!(tonic::Status::from(err).code(), Code::OutOfRange);

    let mut at_floor = get("/k");
    at_floor.revision = 2;
    let resp = kv.range(at_floor).await.unwrap();
    assert_eq!(resp.kvs[0].value, b"2");
}

#[tokio::test]
async fn compaction_as_transaction() {
    let kv = memory_bridge();
    for value in ["1", "2", "3"] {
        kv.put(put("/k", value)).await.unwrap();
    }
    let txn = TxnRequest {
        compare: vec![],
        success: vec![RequestOp::put(PutRequest {
            key: COMPACT_REV_KEY.as_bytes().to_vec(),
            value: b"3".to_vec(),
            ..Default::default()
        })],
        failure: vec![],
    };
    let resp = kv.txn(txn).await.unwrap();
    assert!(resp.succeeded);

    let mut old = get("/k");
    old.revision = 2;
    assert!(kv.range(old).await.is_err());
}

#[tokio::test]
async fn future_revision_is_out_of_range() {
    let kv = memory_bridge();
    kv.put(put("/k", "1")).await.unwrap();
    let mut req = get("/k");
    req.revision = 99;
    let status = tonic::Status::from(kv.range(req).await.unwrap_err());
    assert_eq!(status.code(), Code::OutOfRange);
    assert_eq!(
        status.message(),
        "etcdserver: mvcc: required revision is a future revision"
    );
}
