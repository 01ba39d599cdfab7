//! `PostgreSQL` driver for the docquery builder.
//!
//! This crate provides a [`DocumentStore`](docquery_core::store::DocumentStore)
//! backed by a single `JSONB` table. It supports:
//!
//! - Dotted field paths translated to `jsonb` path expressions
//! - Every constraint operator, type-guarded so mixed types never match
//! - Atomic batches via transactions, bounded by a configurable cap
//! - Connection pooling and embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use docquery_postgres::{PostgresConfig, PostgresDocumentStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresDocumentStore::connect(&PostgresConfig::from_env()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod filter;
pub mod store;

pub use config::PostgresConfig;
pub use store::{PostgresDocumentStore, map_sqlx_error};
