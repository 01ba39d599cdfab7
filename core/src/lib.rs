//! # docquery Core
//!
//! Core types and traits for the docquery builder.
//!
//! docquery lets application code express relational-style intents
//! (`select`, `eq`, `order`, `limit`, `insert`, `update`, `upsert`, `delete`)
//! against a document store. This crate holds everything the builder and the
//! drivers share; the builder itself lives in `docquery-runtime`.
//!
//! ## Core Concepts
//!
//! - **Document**: a schemaless map of field name to JSON value
//! - **Constraint**: one `(field, operator, value)` filter, ANDed with the rest
//! - **`DocumentStore`**: the narrow driver interface the builder consumes
//! - **Result Envelope**: `Result<Data, QueryError>`, returned by every resolution
//! - **Environment**: injected `Clock` and `IdGenerator`
//!
//! ## Example
//!
//! ```
//! use docquery_core::constraint::{Constraint, Operator};
//! use docquery_core::doc;
//!
//! let listing = doc!({ "name": "Jazz Night", "price": 10 });
//! assert!(Constraint::new("price", Operator::Lte, 20).matches(&listing));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

#[doc(hidden)]
pub use serde_json;

/// Documents, identifiers and stored-document wrappers
pub mod document;

/// Filter constraints and ordering
pub mod constraint;

/// Document store driver trait and driver errors
pub mod store;

/// Result envelope and query error taxonomy
pub mod envelope;

pub use constraint::{Constraint, Direction, Operator, OrderSpec};
pub use document::{Document, DocumentId, StoredDocument, Value};
pub use envelope::{Data, ItemFailure, QueryError, QueryResult};
pub use store::{DocumentStore, StoreError, StoreFuture};

/// Environment module - injected dependencies
///
/// Time and identifier generation are abstracted behind traits so the
/// execution engine stays deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use docquery_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of fresh document identifiers.
    ///
    /// Every call must return an identifier not returned before; inserts and
    /// upserts without a caller-supplied id rely on it.
    pub trait IdGenerator: Send + Sync {
        /// Produce a new identifier.
        fn generate(&self) -> String;
    }

    /// Random 128-bit identifiers (UUID v4, hyphenated).
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn generate(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{IdGenerator, UuidGenerator};

    #[test]
    fn uuid_generator_produces_distinct_ids() {
        let generator = UuidGenerator;
        let a = generator.generate();
        let b = generator.generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
