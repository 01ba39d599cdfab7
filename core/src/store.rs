//! Document store driver trait and related types.
//!
//! This module defines the narrow interface the query builder consumes: single
//! document reads and writes by collection and id, collection-scoped filtered
//! queries, and atomic batched writes bounded by a maximum batch size.
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `docquery-postgres`): `JSONB`-backed production driver
//! - `InMemoryDocumentStore` (in `docquery-testing`): fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use docquery_core::store::{DocumentStore, StoreError};
//! use docquery_core::constraint::{Constraint, Operator};
//! use docquery_core::document::DocumentId;
//!
//! async fn example<S: DocumentStore>(store: &S) -> Result<(), StoreError> {
//!     let filters = vec![Constraint::new("status", Operator::Eq, "published")];
//!     let events = store.query("events", &filters, None, Some(20)).await?;
//!
//!     let ids: Vec<DocumentId> = events.into_iter().map(|doc| doc.id).collect();
//!     store.batch_delete("events", ids).await?;
//!     Ok(())
//! }
//! ```

use crate::constraint::{Constraint, OrderSpec};
use crate::document::{Document, DocumentId, StoredDocument};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`DocumentStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Batch cap used when a driver has no tighter limit of its own.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Errors reported by a document store driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound {
        /// Collection that was addressed.
        collection: String,
        /// Identifier that was addressed.
        id: DocumentId,
    },

    /// A create targeted an identifier that is already taken.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists {
        /// Collection that was addressed.
        collection: String,
        /// Identifier that was addressed.
        id: DocumentId,
    },

    /// The caller is not allowed to perform the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend could not be reached (network, pool exhaustion, shutdown).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete in time.
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// A precondition on the stored state did not hold.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// A batch exceeded the driver's maximum size.
    #[error("Batch of {size} operations exceeds maximum of {max}")]
    BatchTooLarge {
        /// Requested number of operations.
        size: usize,
        /// Driver maximum.
        max: usize,
    },

    /// The request itself was malformed (bad field path, unsupported value).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Encoding or decoding stored data failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Document store driver.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one driver can back many
/// concurrently resolving queries.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can
/// be used as `Arc<dyn DocumentStore>`, which is how the query client holds it.
///
/// # Batches
///
/// `batch_delete` and `batch_update` are atomic: either every operation in
/// the batch applies or none does. A batch larger than
/// [`max_batch_size`](Self::max_batch_size) must be rejected with
/// [`StoreError::BatchTooLarge`] without applying anything.
pub trait DocumentStore: Send + Sync {
    /// Load one document.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no document with this id in the collection
    /// - `Unavailable` / `Timeout` / `PermissionDenied`: backend failures
    fn get<'a>(&'a self, collection: &'a str, id: &'a DocumentId) -> StoreFuture<'a, StoredDocument>;

    /// Run a filtered query over one collection.
    ///
    /// All constraints must hold (AND). Results follow `order` when given;
    /// otherwise their order is driver-defined. At most `limit` documents are
    /// returned when a limit is given. A query matching nothing returns an
    /// empty vector, not an error.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: a constraint cannot be expressed by the backend
    /// - `Unavailable` / `Timeout` / `PermissionDenied`: backend failures
    fn query<'a>(
        &'a self,
        collection: &'a str,
        constraints: &'a [Constraint],
        order: Option<&'a OrderSpec>,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<StoredDocument>>;

    /// Write one document.
    ///
    /// With `merge == false` the stored document is replaced. With
    /// `merge == true` the given top-level fields overwrite the stored ones and
    /// all other stored fields are preserved; a missing document is created.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Timeout` / `PermissionDenied`: backend failures
    fn set<'a>(
        &'a self,
        collection: &'a str,
        id: &'a DocumentId,
        document: Document,
        merge: bool,
    ) -> StoreFuture<'a, ()>;

    /// Create a document that must not exist yet.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists`: the id is taken; the stored document is unchanged
    /// - `Unavailable` / `Timeout` / `PermissionDenied`: backend failures
    fn create<'a>(
        &'a self,
        collection: &'a str,
        id: &'a DocumentId,
        document: Document,
    ) -> StoreFuture<'a, ()>;

    /// Atomically delete a set of documents. Ids that do not exist are ignored.
    ///
    /// # Errors
    ///
    /// - `BatchTooLarge`: more ids than [`max_batch_size`](Self::max_batch_size)
    /// - `Unavailable` / `Timeout` / `PermissionDenied`: backend failures
    fn batch_delete<'a>(&'a self, collection: &'a str, ids: Vec<DocumentId>) -> StoreFuture<'a, ()>;

    /// Atomically merge a partial document into each listed document.
    ///
    /// # Errors
    ///
    /// - `NotFound`: one of the targets no longer exists; nothing is applied
    /// - `BatchTooLarge`: more updates than [`max_batch_size`](Self::max_batch_size)
    /// - `Unavailable` / `Timeout` / `PermissionDenied`: backend failures
    fn batch_update<'a>(
        &'a self,
        collection: &'a str,
        updates: Vec<(DocumentId, Document)>,
    ) -> StoreFuture<'a, ()>;

    /// Maximum number of operations in one atomic batch.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}
