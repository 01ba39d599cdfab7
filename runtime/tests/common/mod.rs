//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)] // Each test binary uses a different subset

use chrono::{DateTime, Utc};
use docquery_core::doc;
use docquery_runtime::{Client, ExecutorConfig, RetryPolicy};
use docquery_testing::{InMemoryDocumentStore, SequentialIdGenerator, test_clock};
use std::time::Duration;

/// `created_at` / `updated_at` written under [`test_clock`].
pub const T0: &str = "2025-01-01T00:00:00.000000Z";

/// Client over `store` with a fixed clock and `doc-N` identifiers.
pub fn client(store: &InMemoryDocumentStore) -> Client {
    client_with(store, fast_config())
}

/// Same as [`client`] with an explicit config.
pub fn client_with(store: &InMemoryDocumentStore, config: ExecutorConfig) -> Client {
    Client::builder(store.clone())
        .clock(test_clock())
        .id_generator(SequentialIdGenerator::new("doc"))
        .config(config)
        .build()
}

/// Default config with millisecond retry delays.
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig::default().with_read_retry(
        RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .build(),
    )
}

/// Parse an RFC 3339 timestamp.
pub fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .unwrap()
        .with_timezone(&Utc)
}

/// Four events: three published, one draft.
pub fn seed_events(store: &InMemoryDocumentStore) {
    store.seed(
        "events",
        "e1",
        doc!({
            "name": "Opera",
            "status": "published",
            "price": 50,
            "tags": ["music", "classical"],
            "venue": { "city": "Lyon" }
        }),
    );
    store.seed(
        "events",
        "e2",
        doc!({
            "name": "Jazz Night",
            "status": "published",
            "price": 10,
            "tags": ["music", "jazz"],
            "venue": { "city": "Paris" }
        }),
    );
    store.seed(
        "events",
        "e3",
        doc!({
            "name": "Draft",
            "status": "draft",
            "price": 30,
            "tags": [],
            "venue": { "city": "Lyon" }
        }),
    );
    store.seed(
        "events",
        "e4",
        doc!({
            "name": "Comedy",
            "status": "published",
            "price": 30,
            "tags": ["comedy"],
            "venue": { "city": "Paris" }
        }),
    );
}

/// Identifiers of returned documents, in order.
pub fn ids(docs: &[docquery_core::Document]) -> Vec<String> {
    docs.iter()
        .map(|doc| doc.id().map(|id| id.to_string()).unwrap_or_default())
        .collect()
}
