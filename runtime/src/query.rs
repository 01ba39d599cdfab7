//! The fluent query/mutation builder.
//!
//! A [`Query`] accumulates filters, ordering, a limit and a projection. Chain
//! methods take the builder by value and hand it back, so a chain is a
//! sequence of cheap in-place edits on one owned value. Nothing is sent to
//! the store until [`Query::resolve`] is awaited.
//!
//! Attaching a mutation intent (`insert`, `upsert`, `update`, `delete`)
//! borrows the query and returns a separate [`Mutation`] that owns a copy of
//! the filters accumulated so far. A `Mutation` has no filter methods and no
//! further mutation-entry methods, so a filter cannot be added after the
//! intent and a second intent cannot be attached to the same lineage. The
//! originating `Query` stays usable as a read.
//!
//! ```ignore
//! let events = client.collection("events");
//! let published = events.clone().eq("status", "published");
//!
//! // Read
//! let upcoming = published.clone().order_asc("starts_at").limit(20).resolve().await?;
//!
//! // Mutation built from the same filters
//! published.update(doc!({ "featured": true })).resolve().await?;
//! ```
//!
//! # Consistency
//!
//! `update` and `delete` first query for the matching documents, then write
//! to exactly those documents in atomic batches. These are two separate round
//! trips: a document that starts matching after discovery is not touched, and
//! one that stops matching after discovery is still written. Callers needing
//! cross-document consistency must not rely on this layer.
//!
//! `upsert` has the same shape per item: an existence read, then a merge
//! write. Two clients upserting the same new `id` can both see it as missing.

use crate::executor::Executor;
use docquery_core::constraint::{Constraint, Direction, Operator, OrderSpec};
use docquery_core::document::{Document, Value};
use docquery_core::envelope::QueryResult;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Payload of an insert or upsert: one document or a list.
///
/// The shape of the payload fixes the shape of the result: one document in,
/// `Data::One` out; a list in, `Data::Many` out.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A single document.
    One(Document),
    /// A list of documents.
    Many(Vec<Document>),
}

impl Payload {
    /// Number of documents in the payload.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(docs) => docs.len(),
        }
    }

    /// Whether the payload holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The payload's documents as a list.
    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Self::One(doc) => vec![doc],
            Self::Many(docs) => docs,
        }
    }
}

impl From<Document> for Payload {
    fn from(doc: Document) -> Self {
        Self::One(doc)
    }
}

impl From<Vec<Document>> for Payload {
    fn from(docs: Vec<Document>) -> Self {
        Self::Many(docs)
    }
}

/// The pending write attached to a [`Mutation`].
#[derive(Clone, Debug, PartialEq)]
pub enum MutationIntent {
    /// Create new documents; fails on identifier collisions.
    Insert(Payload),
    /// Merge a partial document into every matching document.
    Update(Document),
    /// Create-or-merge documents keyed by their `id` (generated if absent).
    Upsert(Payload),
    /// Remove every matching document.
    Delete,
}

/// The kind of work a resolution performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Plain read.
    Read,
    /// Insert.
    Insert,
    /// Update.
    Update,
    /// Upsert.
    Upsert,
    /// Delete.
    Delete,
}

impl Operation {
    /// Lowercase name, used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a builder has accumulated; what the executor runs.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    /// Target collection.
    pub collection: String,
    /// Filters, combined with AND.
    pub constraints: Vec<Constraint>,
    /// Result ordering.
    pub order: Option<OrderSpec>,
    /// Result cap.
    pub limit: Option<usize>,
    /// Unwrap the read to one document or nothing.
    pub single: bool,
    /// Fields to keep on read results; `None` keeps everything.
    pub projection: Option<Vec<String>>,
    /// Pending write, if any.
    pub mutation: Option<MutationIntent>,
    /// First argument error recorded while chaining.
    pub invalid: Option<String>,
}

impl QueryPlan {
    /// Create an empty read plan for a collection.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            constraints: Vec::new(),
            order: None,
            limit: None,
            single: false,
            projection: None,
            mutation: None,
            invalid: None,
        }
    }

    /// The operation this plan resolves to.
    ///
    /// Mirrors the executor's branch priority: upsert, delete, update,
    /// insert, then read.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match &self.mutation {
            Some(MutationIntent::Upsert(_)) => Operation::Upsert,
            Some(MutationIntent::Delete) => Operation::Delete,
            Some(MutationIntent::Update(_)) => Operation::Update,
            Some(MutationIntent::Insert(_)) => Operation::Insert,
            None => Operation::Read,
        }
    }

    fn record_invalid(&mut self, reason: String) {
        if self.invalid.is_none() {
            self.invalid = Some(reason);
        }
    }
}

/// A read query under construction.
///
/// Cloning a `Query` forks it: the clones evolve independently.
#[derive(Clone)]
pub struct Query {
    executor: Arc<Executor>,
    plan: QueryPlan,
}

impl Query {
    pub(crate) fn new(executor: Arc<Executor>, collection: String) -> Self {
        Self {
            executor,
            plan: QueryPlan::new(collection),
        }
    }

    /// Record a projection.
    ///
    /// `columns` is a comma-separated field list (`"id, name, price"`).
    /// `"*"` or an empty string selects everything. The `id` field is always
    /// returned. Projection is applied to read results only and never fails.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        let fields: Vec<String> = columns
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect();

        self.plan.projection = if fields.is_empty() || fields.iter().any(|f| f == "*") {
            None
        } else {
            Some(fields)
        };
        self
    }

    /// Append a constraint.
    #[must_use]
    pub fn filter(mut self, constraint: Constraint) -> Self {
        self.plan.constraints.push(constraint);
        self
    }

    fn constrain(self, field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.filter(Constraint::new(field, operator, value))
    }

    /// Field equals value.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constrain(field, Operator::Eq, value)
    }

    /// Field is present and differs from value.
    #[must_use]
    pub fn neq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constrain(field, Operator::Neq, value)
    }

    /// Field is greater than value.
    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constrain(field, Operator::Gt, value)
    }

    /// Field is greater than or equal to value.
    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constrain(field, Operator::Gte, value)
    }

    /// Field is less than value.
    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constrain(field, Operator::Lt, value)
    }

    /// Field is less than or equal to value.
    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constrain(field, Operator::Lte, value)
    }

    /// Field equals one of `values`.
    #[must_use]
    pub fn in_<V: Into<Value>>(self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.constrain(field, Operator::In, Value::Array(values))
    }

    /// Field is an array containing value.
    #[must_use]
    pub fn contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constrain(field, Operator::ArrayContains, value)
    }

    /// Order results by a field. Replaces any earlier ordering.
    #[must_use]
    pub fn order(mut self, field: impl Into<String>, ascending: bool) -> Self {
        let direction = if ascending { Direction::Asc } else { Direction::Desc };
        self.plan.order = Some(OrderSpec::new(field, direction));
        self
    }

    /// Order results by a field, smallest first.
    #[must_use]
    pub fn order_asc(self, field: impl Into<String>) -> Self {
        self.order(field, true)
    }

    /// Order results by a field, largest first.
    #[must_use]
    pub fn order_desc(self, field: impl Into<String>) -> Self {
        self.order(field, false)
    }

    /// Return at most `n` documents.
    ///
    /// `n` must be positive. `limit(0)` is recorded as an invalid argument
    /// and the query resolves to `QueryError::InvalidArgument` without
    /// contacting the store.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        if n == 0 {
            self.plan
                .record_invalid("limit must be a positive integer, got 0".to_string());
        } else {
            self.plan.limit = Some(n);
        }
        self
    }

    /// Return the first matching document, or `Data::Empty` if none match.
    ///
    /// Sets the limit to 1.
    #[must_use]
    pub fn single(mut self) -> Self {
        self.plan.single = true;
        self.plan.limit = Some(1);
        self
    }

    /// Insert one document or a list of documents.
    ///
    /// A caller-supplied `id` is honoured and must not already exist; an
    /// absent or `null` `id` gets a fresh identifier. Any other `id` that is
    /// not a non-empty string or an integer fails the whole query with
    /// `QueryError::InvalidArgument` before anything is written. `created_at`
    /// and `updated_at` are stamped with the current time.
    #[must_use]
    pub fn insert(&self, payload: impl Into<Payload>) -> Mutation {
        self.mutate(MutationIntent::Insert(payload.into()))
    }

    /// Create-or-merge one document or a list of documents keyed by `id`.
    ///
    /// `id` follows the same rules as [`Query::insert`]: absent or `null`
    /// gets a fresh one, an unusable value is rejected. Fields not in the
    /// payload are preserved on existing documents. `created_at` is only
    /// stamped when neither the payload nor the stored document has one;
    /// `updated_at` is always refreshed.
    ///
    /// Items of one list are written concurrently; two items sharing an `id`
    /// race and the last write wins.
    ///
    /// The existence read and the merge write are separate round trips, not
    /// one atomic operation. Concurrent upserts of the same new `id` from
    /// different clients can both treat it as missing; both stamp
    /// `created_at` and the later write's value is kept.
    #[must_use]
    pub fn upsert(&self, payload: impl Into<Payload>) -> Mutation {
        self.mutate(MutationIntent::Upsert(payload.into()))
    }

    /// Merge `patch` into every document matching the filters.
    ///
    /// An `id` field in the patch is ignored. Each matched document gets a
    /// strictly later `updated_at`. See the module docs for the consistency
    /// caveat.
    #[must_use]
    pub fn update(&self, patch: Document) -> Mutation {
        self.mutate(MutationIntent::Update(patch))
    }

    /// Delete every document matching the filters.
    ///
    /// See the module docs for the consistency caveat.
    #[must_use]
    pub fn delete(&self) -> Mutation {
        self.mutate(MutationIntent::Delete)
    }

    fn mutate(&self, intent: MutationIntent) -> Mutation {
        let mut plan = self.plan.clone();
        plan.mutation = Some(intent);
        Mutation {
            executor: Arc::clone(&self.executor),
            plan,
        }
    }

    /// The accumulated plan.
    #[must_use]
    pub const fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Execute the read.
    ///
    /// This is the only point at which the store is contacted. The builder
    /// is consumed, so each query runs at most once.
    pub fn resolve(self) -> impl Future<Output = QueryResult> + Send {
        let Self { executor, plan } = self;
        async move { executor.execute(plan).await }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("plan", &self.plan).finish_non_exhaustive()
    }
}

/// A query carrying exactly one mutation intent.
///
/// Produced by [`Query::insert`], [`Query::upsert`], [`Query::update`] and
/// [`Query::delete`]. It owns a copy of the filters taken when the intent was
/// attached and cannot be modified further.
#[derive(Clone)]
pub struct Mutation {
    executor: Arc<Executor>,
    plan: QueryPlan,
}

impl Mutation {
    /// The pending write.
    #[must_use]
    pub const fn intent(&self) -> Option<&MutationIntent> {
        self.plan.mutation.as_ref()
    }

    /// The accumulated plan.
    #[must_use]
    pub const fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Execute the mutation.
    ///
    /// This is the only point at which the store is contacted. The builder
    /// is consumed, so each mutation runs at most once.
    pub fn resolve(self) -> impl Future<Output = QueryResult> + Send {
        let Self { executor, plan } = self;
        async move { executor.execute(plan).await }
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation").field("plan", &self.plan).finish_non_exhaustive()
    }
}
