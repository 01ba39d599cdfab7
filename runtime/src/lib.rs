//! # docquery Runtime
//!
//! The query builder and the execution engine behind it.
//!
//! Application code gets a [`Client`] for a document store, starts a builder
//! with [`Client::collection`], chains relational-style intents and resolves
//! the builder exactly once. All I/O is deferred to resolution.
//!
//! ## Core Components
//!
//! - **Client**: owns the driver, clock, id generator, config and logger
//! - **Query / Mutation**: the fluent builder; a `Mutation` carries one write intent
//! - **Executor**: picks the upsert, delete, update, insert or read path and
//!   turns it into driver calls
//!
//! ## Example
//!
//! ```ignore
//! use docquery_runtime::Client;
//! use docquery_core::doc;
//!
//! let client = Client::new(store);
//! let events = client.collection("events");
//!
//! // Read
//! let upcoming = events
//!     .clone()
//!     .select("id, name, starts_at")
//!     .eq("status", "published")
//!     .order_asc("starts_at")
//!     .limit(20)
//!     .resolve()
//!     .await?;
//!
//! // Write
//! events.eq("id", "evt-1").update(doc!({ "status": "cancelled" })).resolve().await?;
//! ```

/// Client handle and builder
pub mod client;

/// Executor configuration
pub mod config;

/// Execution engine
pub mod executor;

/// Metrics for observability
pub mod metrics;

/// Query and mutation builders
pub mod query;

/// Retry logic with exponential backoff
pub mod retry;

pub use client::{Client, ClientBuilder};
pub use config::{BatchPolicy, ConfigError, ExecutorConfig};
pub use executor::Executor;
pub use query::{Mutation, MutationIntent, Operation, Payload, Query, QueryPlan};
pub use retry::RetryPolicy;

// Re-export the shared vocabulary so most callers only depend on this crate.
pub use docquery_core::{
    Constraint, Data, Direction, Document, DocumentId, DocumentStore, ItemFailure, Operator,
    OrderSpec, QueryError, QueryResult, StoreError, Value, doc,
};
