//! Result envelope returned by every resolved query.
//!
//! Resolution never panics for expected failures. The outcome is a
//! [`QueryResult`]: `Ok(Data)` on success, `Err(QueryError)` on failure.
//! "No result" is a success: a `single()` read that matches nothing yields
//! `Ok(Data::Empty)`, and a list read that matches nothing yields
//! `Ok(Data::Many(vec![]))`.

use crate::document::{Document, DocumentId};
use crate::store::StoreError;
use thiserror::Error;

/// Outcome of resolving a query or mutation.
pub type QueryResult = Result<Data, QueryError>;

/// Successful payload of a resolved query.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    /// No data: a `single()` read without a match, or a delete.
    Empty,
    /// One document: a `single()` read, or a single-document write.
    One(Document),
    /// A list of documents: a list read, an update, or a multi-document write.
    Many(Vec<Document>),
}

impl Data {
    /// Whether no document is carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::One(_) => false,
            Self::Many(docs) => docs.is_empty(),
        }
    }

    /// Number of documents carried.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Many(docs) => docs.len(),
        }
    }

    /// The single document, or the first of a list.
    #[must_use]
    pub fn into_one(self) -> Option<Document> {
        match self {
            Self::Empty => None,
            Self::One(doc) => Some(doc),
            Self::Many(docs) => docs.into_iter().next(),
        }
    }

    /// All carried documents as a list.
    #[must_use]
    pub fn into_many(self) -> Vec<Document> {
        match self {
            Self::Empty => Vec::new(),
            Self::One(doc) => vec![doc],
            Self::Many(docs) => docs,
        }
    }
}

/// Failure of one item in a multi-document insert or upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemFailure {
    /// Position of the item in the submitted payload.
    pub index: usize,
    /// Identifier the item was written under.
    pub id: DocumentId,
    /// Driver failure for this item.
    pub error: StoreError,
}

/// Errors surfaced in the result envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The chain was used with an invalid argument (for example `limit(0)`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The driver could not reach its backend.
    #[error("Driver unavailable: {0}")]
    DriverUnavailable(String),

    /// A driver call did not finish in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The backend refused the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A write addressed a document that no longer exists.
    ///
    /// Reads never produce this: a read without a match is `Ok`.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An insert addressed an identifier that is already taken.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A precondition on stored state did not hold.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The discovered document set exceeds the batch cap and the executor is
    /// configured to fail instead of chunking.
    #[error("Batch of {size} operations exceeds maximum of {max}")]
    BatchTooLarge {
        /// Number of operations required.
        size: usize,
        /// Effective batch cap.
        max: usize,
    },

    /// A chunked batch write failed after some chunks had committed.
    #[error("Batch write stopped after {committed} of {total} operations: {source}")]
    IncompleteBatch {
        /// Operations committed before the failure.
        committed: usize,
        /// Operations that were to be committed.
        total: usize,
        /// Failure of the chunk that did not commit.
        source: StoreError,
    },

    /// Some items of a multi-document insert or upsert failed.
    #[error("{} of {} writes failed", .failures.len(), .failures.len() + .written.len())]
    PartialFailure {
        /// Documents that were written, in payload order.
        written: Vec<Document>,
        /// Items that failed, in payload order.
        failures: Vec<ItemFailure>,
    },

    /// Any other driver failure.
    #[error("Driver error: {0}")]
    Driver(String),
}

impl QueryError {
    /// Whether the failure may go away on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DriverUnavailable(_) | Self::Timeout(_))
    }

    /// Stable short name of the error kind, used as a metrics label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::DriverUnavailable(_) => "driver_unavailable",
            Self::Timeout(_) => "timeout",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::FailedPrecondition(_) => "failed_precondition",
            Self::BatchTooLarge { .. } => "batch_too_large",
            Self::IncompleteBatch { .. } => "incomplete_batch",
            Self::PartialFailure { .. } => "partial_failure",
            Self::Driver(_) => "driver",
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => Self::NotFound(error.to_string()),
            StoreError::AlreadyExists { .. } => Self::AlreadyExists(error.to_string()),
            StoreError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            StoreError::Unavailable(msg) => Self::DriverUnavailable(msg),
            StoreError::Timeout(msg) => Self::Timeout(msg),
            StoreError::FailedPrecondition(msg) => Self::FailedPrecondition(msg),
            StoreError::BatchTooLarge { size, max } => Self::BatchTooLarge { size, max },
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            StoreError::Serialization(_) | StoreError::Backend(_) => Self::Driver(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn empty_and_empty_list_are_distinct() {
        assert_ne!(Data::Empty, Data::Many(vec![]));
        assert!(Data::Empty.is_empty());
        assert!(Data::Many(vec![]).is_empty());
    }

    #[test]
    fn into_one_takes_first_of_list() {
        let data = Data::Many(vec![doc!({ "n": 1 }), doc!({ "n": 2 })]);
        assert_eq!(data.into_one(), Some(doc!({ "n": 1 })));
        assert_eq!(Data::Empty.into_one(), None);
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(
            QueryError::from(StoreError::Unavailable("connection reset".into())),
            QueryError::DriverUnavailable("connection reset".into())
        );
        assert_eq!(
            QueryError::from(StoreError::BatchTooLarge { size: 600, max: 500 }),
            QueryError::BatchTooLarge { size: 600, max: 500 }
        );
        assert!(matches!(
            QueryError::from(StoreError::Backend("boom".into())),
            QueryError::Driver(msg) if msg.contains("boom")
        ));
        assert!(QueryError::from(StoreError::Timeout("slow".into())).is_transient());
    }

    #[test]
    fn partial_failure_display_counts_items() {
        let error = QueryError::PartialFailure {
            written: vec![doc!({ "id": "a" })],
            failures: vec![ItemFailure {
                index: 1,
                id: DocumentId::new("b"),
                error: StoreError::AlreadyExists {
                    collection: "items".into(),
                    id: DocumentId::new("b"),
                },
            }],
        };
        assert_eq!(error.to_string(), "1 of 2 writes failed");
        assert_eq!(error.kind(), "partial_failure");
    }
}
