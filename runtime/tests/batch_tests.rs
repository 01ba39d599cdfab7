//! Integration tests for batch caps and batch policies on update and delete.

#![allow(clippy::unwrap_used)] // Test code

mod common;

use common::{client, client_with, fast_config};
use docquery_core::doc;
use docquery_runtime::{BatchPolicy, Data, QueryError, StoreError};
use docquery_testing::{InMemoryDocumentStore, StoreOp};

fn seed_tickets(store: &InMemoryDocumentStore, count: usize) {
    for n in 0..count {
        store.seed("tickets", format!("t{n:04}"), doc!({ "n": n, "state": "held" }));
    }
}

fn batch_sizes(store: &InMemoryDocumentStore, op: StoreOp) -> Vec<usize> {
    store
        .calls()
        .into_iter()
        .filter(|call| call.op == op)
        .map(|call| call.size)
        .collect()
}

#[tokio::test]
async fn chunked_delete_splits_at_the_driver_cap() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 600);

    let result = client(&store).collection("tickets").delete().resolve().await;

    assert_eq!(result, Ok(Data::Empty));
    assert!(store.is_empty("tickets"));
    assert_eq!(batch_sizes(&store, StoreOp::BatchDelete), vec![500, 100]);
}

#[tokio::test]
async fn fail_fast_delete_refuses_oversized_batches() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 600);
    let config = fast_config().with_batch_policy(BatchPolicy::FailFast);

    let result = client_with(&store, config)
        .collection("tickets")
        .delete()
        .resolve()
        .await;

    assert_eq!(result, Err(QueryError::BatchTooLarge { size: 600, max: 500 }));
    assert_eq!(store.len("tickets"), 600);
    assert_eq!(store.call_count(StoreOp::BatchDelete), 0);
}

#[tokio::test]
async fn fail_fast_allows_batches_within_the_cap() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 500);
    let config = fast_config().with_batch_policy(BatchPolicy::FailFast);

    let result = client_with(&store, config)
        .collection("tickets")
        .delete()
        .resolve()
        .await;

    assert_eq!(result, Ok(Data::Empty));
    assert_eq!(batch_sizes(&store, StoreOp::BatchDelete), vec![500]);
}

#[tokio::test]
async fn chunked_update_touches_every_document() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 600);

    let data = client(&store)
        .collection("tickets")
        .update(doc!({ "state": "released" }))
        .resolve()
        .await
        .unwrap();

    assert_eq!(data.len(), 600);
    assert!(
        store
            .snapshot("tickets")
            .iter()
            .all(|stored| stored.data.get("state") == Some(&"released".into()))
    );
    assert_eq!(batch_sizes(&store, StoreOp::BatchUpdate), vec![500, 100]);
}

#[tokio::test]
async fn effective_cap_is_the_smaller_of_config_and_driver() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 250);
    let config = fast_config().with_max_batch_size(100);
    client_with(&store, config)
        .collection("tickets")
        .delete()
        .resolve()
        .await
        .unwrap();
    assert_eq!(batch_sizes(&store, StoreOp::BatchDelete), vec![100, 100, 50]);

    let store = InMemoryDocumentStore::new().with_max_batch_size(40);
    seed_tickets(&store, 100);
    let data = client(&store)
        .collection("tickets")
        .update(doc!({ "state": "sold" }))
        .resolve()
        .await
        .unwrap();
    assert_eq!(data.len(), 100);
    assert_eq!(batch_sizes(&store, StoreOp::BatchUpdate), vec![40, 40, 20]);
}

#[tokio::test]
async fn failure_after_a_committed_chunk_reports_progress() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 600);
    store.fail_after(
        StoreOp::BatchDelete,
        1,
        StoreError::Unavailable("connection reset".into()),
    );

    let result = client(&store).collection("tickets").delete().resolve().await;

    assert_eq!(
        result,
        Err(QueryError::IncompleteBatch {
            committed: 500,
            total: 600,
            source: StoreError::Unavailable("connection reset".into()),
        })
    );
    assert_eq!(store.len("tickets"), 100);
}

#[tokio::test]
async fn failure_of_the_first_chunk_is_reported_as_is() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 600);
    store.fail_next(StoreOp::BatchDelete, StoreError::PermissionDenied("read-only".into()));

    let result = client(&store).collection("tickets").delete().resolve().await;

    assert_eq!(result, Err(QueryError::PermissionDenied("read-only".into())));
    assert_eq!(store.len("tickets"), 600);
    assert_eq!(store.call_count(StoreOp::BatchDelete), 1);
}

#[tokio::test]
async fn vanished_target_fails_the_update_batch() {
    let store = InMemoryDocumentStore::new();
    seed_tickets(&store, 3);
    store.fail_next(
        StoreOp::BatchUpdate,
        StoreError::NotFound {
            collection: "tickets".into(),
            id: "t0001".into(),
        },
    );

    let result = client(&store)
        .collection("tickets")
        .update(doc!({ "state": "sold" }))
        .resolve()
        .await;

    assert!(matches!(result, Err(QueryError::NotFound(_))));
    assert!(
        store
            .snapshot("tickets")
            .iter()
            .all(|stored| stored.data.get("state") == Some(&"held".into()))
    );
}
