//! In-memory document store for fast, deterministic testing.
//!
//! [`InMemoryDocumentStore`] implements [`DocumentStore`] over nested maps and
//! adds the hooks tests need:
//! - a configurable batch cap,
//! - fault injection per operation ([`InMemoryDocumentStore::fail_next`]),
//! - artificial latency, for timeout tests,
//! - a log of every driver call, for asserting round trips and their order.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use docquery_core::constraint::{Constraint, OrderSpec, matches_all};
use docquery_core::document::{Document, DocumentId, StoredDocument};
use docquery_core::store::{DEFAULT_MAX_BATCH_SIZE, DocumentStore, StoreError, StoreFuture};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

type Collections = HashMap<String, BTreeMap<DocumentId, Document>>;

/// Driver operation, used for fault injection and the call log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`DocumentStore::get`]
    Get,
    /// [`DocumentStore::query`]
    Query,
    /// [`DocumentStore::set`]
    Set,
    /// [`DocumentStore::create`]
    Create,
    /// [`DocumentStore::batch_delete`]
    BatchDelete,
    /// [`DocumentStore::batch_update`]
    BatchUpdate,
}

/// One recorded driver call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCall {
    /// Operation invoked.
    pub op: StoreOp,
    /// Collection addressed.
    pub collection: String,
    /// Number of documents addressed (1 for single-document calls, batch
    /// length for batches, 0 for queries).
    pub size: usize,
}

/// In-memory document store.
///
/// Clones share the same underlying data, so a test can hand one clone to
/// the client and inspect another.
///
/// # Example
///
/// ```
/// use docquery_testing::InMemoryDocumentStore;
/// use docquery_core::store::DocumentStore;
/// use docquery_core::{doc, DocumentId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// store.set("events", &DocumentId::new("evt-1"), doc!({ "name": "Opera" }), false).await?;
///
/// let stored = store.get("events", &DocumentId::new("evt-1")).await?;
/// assert_eq!(stored.data.get("name"), Some(&"Opera".into()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    faults: Arc<Mutex<HashMap<StoreOp, VecDeque<Option<StoreError>>>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    max_batch_size: usize,
    latency: Option<Duration>,
}

impl InMemoryDocumentStore {
    /// Create an empty store with the default batch cap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            latency: None,
        }
    }

    /// Set the maximum number of operations per atomic batch.
    #[must_use]
    pub const fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Delay every call by `latency` before it runs.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next call of `op` fail with `error`.
    ///
    /// Faults queue up: calling this twice for the same operation fails the
    /// next two calls. The failing call is still recorded in the call log.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.fail_after(op, 0, error);
    }

    /// Let the next `successes` calls of `op` through, then fail one with
    /// `error`.
    pub fn fail_after(&self, op: StoreOp, successes: usize, error: StoreError) {
        let mut faults = self.faults.lock().unwrap();
        let queue = faults.entry(op).or_default();
        queue.extend(std::iter::repeat_n(None, successes));
        queue.push_back(Some(error));
    }

    /// Write a document directly, bypassing the call log and fault injection.
    pub fn seed(&self, collection: &str, id: impl Into<DocumentId>, document: Document) {
        self.collections
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), document);
    }

    /// Read a document directly, bypassing the call log and fault injection.
    #[must_use]
    pub fn peek(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.get(&DocumentId::new(id)))
            .cloned()
    }

    /// All documents of a collection in id order.
    #[must_use]
    pub fn snapshot(&self, collection: &str) -> Vec<StoredDocument> {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| StoredDocument::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Whether a collection holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Remove all documents, pending faults and recorded calls.
    pub fn clear(&self) {
        self.collections.write().unwrap().clear();
        self.faults.lock().unwrap().clear();
        self.calls.lock().unwrap().clear();
    }

    /// Every driver call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The operations of every driver call made so far, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.calls.lock().unwrap().iter().map(|c| c.op).collect()
    }

    /// Number of calls made for one operation.
    #[must_use]
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op == op).count()
    }

    /// Forget recorded calls, keeping data.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn enter(&self, op: StoreOp, collection: &str, size: usize) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(StoreCall {
            op,
            collection: collection.to_string(),
            size,
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let fault = self
            .faults
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .flatten();
        fault.map_or(Ok(()), Err)
    }

    fn check_batch(&self, size: usize) -> Result<(), StoreError> {
        if size > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size,
                max: self.max_batch_size,
            });
        }
        Ok(())
    }

    fn run_query(
        &self,
        collection: &str,
        constraints: &[Constraint],
        order: Option<&OrderSpec>,
        limit: Option<usize>,
    ) -> Vec<StoredDocument> {
        let collections = self.collections.read().unwrap();
        let Some(docs) = collections.get(collection) else {
            return Vec::new();
        };

        // Constraints and ordering see the id like any other field.
        let mut matched: Vec<(Document, StoredDocument)> = docs
            .iter()
            .map(|(id, data)| StoredDocument::new(id.clone(), data.clone()))
            .filter_map(|stored| {
                let view = stored.clone().into_document();
                matches_all(constraints, &view).then_some((view, stored))
            })
            .collect();

        if let Some(order) = order {
            // Stable sort keeps id order among equal keys.
            matched.sort_by(|(a, _), (b, _)| order.compare(a, b));
        }
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        matched.into_iter().map(|(_, stored)| stored).collect()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get<'a>(&'a self, collection: &'a str, id: &'a DocumentId) -> StoreFuture<'a, StoredDocument> {
        Box::pin(async move {
            self.enter(StoreOp::Get, collection, 1).await?;
            self.collections
                .read()
                .unwrap()
                .get(collection)
                .and_then(|docs| docs.get(id))
                .map(|data| StoredDocument::new(id.clone(), data.clone()))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.clone(),
                })
        })
    }

    fn query<'a>(
        &'a self,
        collection: &'a str,
        constraints: &'a [Constraint],
        order: Option<&'a OrderSpec>,
        limit: Option<usize>,
    ) -> StoreFuture<'a, Vec<StoredDocument>> {
        Box::pin(async move {
            self.enter(StoreOp::Query, collection, 0).await?;
            Ok(self.run_query(collection, constraints, order, limit))
        })
    }

    fn set<'a>(
        &'a self,
        collection: &'a str,
        id: &'a DocumentId,
        document: Document,
        merge: bool,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter(StoreOp::Set, collection, 1).await?;
            let mut collections = self.collections.write().unwrap();
            let docs = collections.entry(collection.to_string()).or_default();
            if merge {
                if let Some(existing) = docs.get_mut(id) {
                    existing.merge(&document);
                    return Ok(());
                }
            }
            docs.insert(id.clone(), document);
            Ok(())
        })
    }

    fn create<'a>(
        &'a self,
        collection: &'a str,
        id: &'a DocumentId,
        document: Document,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter(StoreOp::Create, collection, 1).await?;
            let mut collections = self.collections.write().unwrap();
            let docs = collections.entry(collection.to_string()).or_default();
            if docs.contains_key(id) {
                return Err(StoreError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.clone(),
                });
            }
            docs.insert(id.clone(), document);
            Ok(())
        })
    }

    fn batch_delete<'a>(&'a self, collection: &'a str, ids: Vec<DocumentId>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter(StoreOp::BatchDelete, collection, ids.len()).await?;
            self.check_batch(ids.len())?;
            let mut collections = self.collections.write().unwrap();
            if let Some(docs) = collections.get_mut(collection) {
                for id in &ids {
                    docs.remove(id);
                }
            }
            Ok(())
        })
    }

    fn batch_update<'a>(
        &'a self,
        collection: &'a str,
        updates: Vec<(DocumentId, Document)>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter(StoreOp::BatchUpdate, collection, updates.len()).await?;
            self.check_batch(updates.len())?;
            let mut collections = self.collections.write().unwrap();
            let docs = collections.entry(collection.to_string()).or_default();

            // All-or-nothing: verify every target before touching any.
            if let Some((missing, _)) = updates.iter().find(|(id, _)| !docs.contains_key(id)) {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: missing.clone(),
                });
            }
            for (id, patch) in &updates {
                if let Some(existing) = docs.get_mut(id) {
                    existing.merge(patch);
                }
            }
            Ok(())
        })
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
