//! Execution engine.
//!
//! Turns a [`QueryPlan`] into driver calls. Exactly one of five paths runs,
//! chosen by the plan's mutation intent:
//!
//! 1. **Upsert**: per item, read the current document, stamp timestamps,
//!    merge-write.
//! 2. **Delete**: discovery read, then batched delete of the discovered ids.
//! 3. **Update**: discovery read, then batched merge of the patch into each
//!    discovered document.
//! 4. **Insert**: per item, create under the caller's id or a fresh one.
//! 5. **Read**: one filtered query.
//!
//! Reads (including discovery and the upsert existence check) are retried on
//! transient failures. Writes are never retried.
//!
//! # Atomicity
//!
//! Discovery and commit are separate round trips and are not linearizable.
//! Each batch is atomic on its own; a discovery set larger than the batch cap
//! is committed as several batches under [`BatchPolicy::Chunked`], and a
//! failure part way reports how many operations had already committed.

use crate::config::{BatchPolicy, ExecutorConfig};
use crate::metrics::QueryMetrics;
use crate::query::{MutationIntent, Operation, Payload, QueryPlan};
use crate::retry::retry_transient;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use docquery_core::document::{
    CREATED_AT_FIELD, Document, DocumentId, ID_FIELD, StoredDocument, UPDATED_AT_FIELD, Value,
};
use docquery_core::envelope::{Data, ItemFailure, QueryError, QueryResult};
use docquery_core::environment::{Clock, IdGenerator};
use docquery_core::store::{DocumentStore, StoreError, StoreFuture};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, debug, debug_span, warn};

/// Runs query plans against a driver.
///
/// Shared by every builder a [`Client`](crate::Client) hands out.
pub struct Executor {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ExecutorConfig,
    logger: Dispatch,
}

impl Executor {
    /// Create an executor.
    ///
    /// `logger` receives every tracing event emitted while resolving; pass
    /// `Dispatch::none()` to stay silent.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: ExecutorConfig,
        logger: Dispatch,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            config,
            logger,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Largest batch handed to the driver in one call.
    #[must_use]
    pub fn batch_cap(&self) -> usize {
        self.config
            .max_batch_size
            .min(self.store.max_batch_size())
            .max(1)
    }

    /// Resolve a plan.
    ///
    /// # Errors
    ///
    /// Returns the [`QueryError`] of the failing path. Expected failures are
    /// never panics.
    pub async fn execute(&self, plan: QueryPlan) -> QueryResult {
        let operation = plan.operation();
        let started = Instant::now();

        let result = async {
            let span = debug_span!(
                "resolve",
                collection = %plan.collection,
                operation = operation.as_str(),
            );
            self.run(plan).instrument(span).await
        }
        .with_subscriber(self.logger.clone())
        .await;

        QueryMetrics::record(operation.as_str(), started.elapsed(), &result);
        result
    }

    async fn run(&self, plan: QueryPlan) -> QueryResult {
        if let Some(reason) = &plan.invalid {
            warn!(%reason, "Rejected query before execution");
            return Err(QueryError::InvalidArgument(reason.clone()));
        }

        debug!(
            constraints = plan.constraints.len(),
            limit = ?plan.limit,
            single = plan.single,
            "Resolving query"
        );

        match &plan.mutation {
            Some(MutationIntent::Upsert(payload)) => self.upsert(&plan.collection, payload.clone()).await,
            Some(MutationIntent::Delete) => self.delete(&plan).await,
            Some(MutationIntent::Update(patch)) => self.update(&plan, patch).await,
            Some(MutationIntent::Insert(payload)) => self.insert(&plan.collection, payload.clone()).await,
            None => self.read(&plan).await,
        }
    }

    async fn read(&self, plan: &QueryPlan) -> QueryResult {
        let mut found = self.discover(plan).await?;
        // Drivers are not trusted to honour the limit.
        if let Some(limit) = plan.limit {
            found.truncate(limit);
        }
        debug!(matched = found.len(), "Read resolved");

        let mut docs = found.into_iter().map(|stored| {
            let doc = stored.into_document();
            match &plan.projection {
                Some(fields) => doc.project(fields),
                None => doc,
            }
        });

        if plan.single {
            return Ok(docs.next().map_or(Data::Empty, Data::One));
        }
        Ok(Data::Many(docs.collect()))
    }

    async fn delete(&self, plan: &QueryPlan) -> QueryResult {
        let targets = self.discover(plan).await?;
        if targets.is_empty() {
            debug!("Delete matched nothing");
            return Ok(Data::Empty);
        }

        let ids: Vec<DocumentId> = targets.into_iter().map(|stored| stored.id).collect();
        let total = ids.len();
        self.commit_in_batches(ids, |chunk| self.store.batch_delete(&plan.collection, chunk))
            .await?;

        debug!(deleted = total, "Delete resolved");
        Ok(Data::Empty)
    }

    async fn update(&self, plan: &QueryPlan, patch: &Document) -> QueryResult {
        let targets = self.discover(plan).await?;
        if targets.is_empty() {
            debug!("Update matched nothing");
            return Ok(Data::Many(Vec::new()));
        }

        let mut patch = patch.clone();
        patch.remove(ID_FIELD);
        let now = self.clock.now();

        let mut writes = Vec::with_capacity(targets.len());
        let mut updated = Vec::with_capacity(targets.len());
        for target in targets {
            let stamp = next_update_stamp(now, target.data.get(UPDATED_AT_FIELD));
            let mut change = patch.clone();
            change.insert(UPDATED_AT_FIELD, format_timestamp(stamp));

            let mut merged = target.data;
            merged.merge(&change);
            updated.push(StoredDocument::new(target.id.clone(), merged).into_document());
            writes.push((target.id, change));
        }

        let total = writes.len();
        self.commit_in_batches(writes, |chunk| self.store.batch_update(&plan.collection, chunk))
            .await?;

        QueryMetrics::record_written(Operation::Update.as_str(), total);
        debug!(updated = total, "Update resolved");
        Ok(Data::Many(updated))
    }

    async fn insert(&self, collection: &str, payload: Payload) -> QueryResult {
        let single = matches!(payload, Payload::One(_));
        let stamp = format_timestamp(self.clock.now());

        let prepared: Vec<(DocumentId, Document)> = payload
            .into_documents()
            .into_iter()
            .map(|mut doc| {
                let id = self.take_id(&mut doc)?;
                doc.insert(CREATED_AT_FIELD, stamp.as_str());
                doc.insert(UPDATED_AT_FIELD, stamp.as_str());
                Ok((id, doc))
            })
            .collect::<Result<_, QueryError>>()?;

        let outcomes: Vec<Result<Document, ItemFailure>> = stream::iter(prepared.into_iter().enumerate())
            .map(|(index, (id, doc))| async move {
                let outcome = self.insert_one(collection, &id, doc).await;
                outcome.map_err(|error| ItemFailure { index, id, error })
            })
            .buffered(self.config.write_concurrency.max(1))
            .collect()
            .await;

        settle(Operation::Insert, single, outcomes)
    }

    async fn insert_one(
        &self,
        collection: &str,
        id: &DocumentId,
        doc: Document,
    ) -> Result<Document, StoreError> {
        self.timed(self.store.create(collection, id, doc.clone()))
            .await?;
        Ok(StoredDocument::new(id.clone(), doc).into_document())
    }

    async fn upsert(&self, collection: &str, payload: Payload) -> QueryResult {
        let single = matches!(payload, Payload::One(_));
        let stamp = format_timestamp(self.clock.now());

        let prepared: Vec<(DocumentId, Document)> = payload
            .into_documents()
            .into_iter()
            .map(|mut doc| Ok((self.take_id(&mut doc)?, doc)))
            .collect::<Result<_, QueryError>>()?;

        let stamp = stamp.as_str();
        let outcomes: Vec<Result<Document, ItemFailure>> = stream::iter(prepared.into_iter().enumerate())
            .map(|(index, (id, doc))| async move {
                let outcome = self.upsert_one(collection, &id, doc, stamp).await;
                outcome.map_err(|error| ItemFailure { index, id, error })
            })
            .buffered(self.config.write_concurrency.max(1))
            .collect()
            .await;

        settle(Operation::Upsert, single, outcomes)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        id: &DocumentId,
        mut doc: Document,
        stamp: &str,
    ) -> Result<Document, StoreError> {
        let existing = match self.read_retrying(|| self.store.get(collection, id)).await {
            Ok(stored) => Some(stored.data),
            Err(StoreError::NotFound { .. }) => None,
            Err(error) => return Err(error),
        };

        let has_created_at = doc.contains_key(CREATED_AT_FIELD)
            || existing
                .as_ref()
                .is_some_and(|stored| stored.contains_key(CREATED_AT_FIELD));
        if !has_created_at {
            doc.insert(CREATED_AT_FIELD, stamp);
        }
        doc.insert(UPDATED_AT_FIELD, stamp);

        self.timed(self.store.set(collection, id, doc.clone(), true))
            .await?;

        let mut merged = existing.unwrap_or_default();
        merged.merge(&doc);
        Ok(StoredDocument::new(id.clone(), merged).into_document())
    }

    /// Strip the payload's `id`, generating one when it is absent or `null`.
    fn take_id(&self, doc: &mut Document) -> Result<DocumentId, QueryError> {
        match doc.remove(ID_FIELD) {
            None | Some(Value::Null) => Ok(DocumentId::new(self.ids.generate())),
            Some(value) => DocumentId::from_value(&value).ok_or_else(|| {
                QueryError::InvalidArgument(format!(
                    "unusable id {value}: expected a non-empty string or an integer"
                ))
            }),
        }
    }

    /// Filtered query for reads and for update/delete discovery.
    async fn discover(&self, plan: &QueryPlan) -> Result<Vec<StoredDocument>, StoreError> {
        self.read_retrying(|| {
            self.store.query(
                &plan.collection,
                &plan.constraints,
                plan.order.as_ref(),
                plan.limit,
            )
        })
        .await
    }

    async fn read_retrying<'a, T, F>(&'a self, call: F) -> Result<T, StoreError>
    where
        F: Fn() -> StoreFuture<'a, T>,
    {
        retry_transient(&self.config.read_retry, || self.timed(call())).await
    }

    /// Apply the per-call deadline, if one is configured.
    async fn timed<T>(&self, call: StoreFuture<'_, T>) -> Result<T, StoreError> {
        let Some(limit) = self.config.operation_timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!(
                "driver call exceeded {}ms",
                limit.as_millis()
            ))),
        }
    }

    /// Hand `items` to `commit` in slices no larger than the batch cap.
    async fn commit_in_batches<'a, T, F>(&'a self, items: Vec<T>, commit: F) -> Result<(), QueryError>
    where
        F: Fn(Vec<T>) -> StoreFuture<'a, ()>,
    {
        let total = items.len();
        let cap = self.batch_cap();

        if total > cap && self.config.batch_policy == BatchPolicy::FailFast {
            warn!(size = total, max = cap, "Batch exceeds cap, refusing to write");
            return Err(QueryError::BatchTooLarge {
                size: total,
                max: cap,
            });
        }

        let mut committed = 0;
        let mut remaining = items.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<T> = remaining.by_ref().take(cap).collect();
            let size = chunk.len();

            if let Err(source) = self.timed(commit(chunk)).await {
                if committed == 0 {
                    return Err(source.into());
                }
                warn!(committed, total, error = %source, "Batch write stopped part way");
                return Err(QueryError::IncompleteBatch {
                    committed,
                    total,
                    source,
                });
            }

            committed += size;
            debug!(committed, total, "Batch committed");
        }
        Ok(())
    }
}

/// Fold per-item outcomes into the result envelope.
///
/// A single-document payload reports its own error. A list reports
/// `PartialFailure` when any item failed.
fn settle(
    operation: Operation,
    single: bool,
    outcomes: Vec<Result<Document, ItemFailure>>,
) -> QueryResult {
    let mut written = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(doc) => written.push(doc),
            Err(failure) => failures.push(failure),
        }
    }

    QueryMetrics::record_written(operation.as_str(), written.len());

    if single {
        if let Some(failure) = failures.pop() {
            return Err(failure.error.into());
        }
        return Ok(written.pop().map_or(Data::Empty, Data::One));
    }

    if failures.is_empty() {
        debug!(written = written.len(), "Write resolved");
        return Ok(Data::Many(written));
    }

    warn!(
        written = written.len(),
        failed = failures.len(),
        "Some writes failed"
    );
    Err(QueryError::PartialFailure { written, failures })
}

/// Render a timestamp the way it is stored: RFC 3339, UTC, microseconds.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The `updated_at` to write over `previous`: `now`, or one microsecond after
/// `previous` when the clock has not moved past it.
fn next_update_stamp(now: DateTime<Utc>, previous: Option<&Value>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    previous
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|prev| (prev.with_timezone(&Utc) + Duration::microseconds(1)).trunc_subsecs(6))
        .map_or(now, |floor| now.max(floor))
}
