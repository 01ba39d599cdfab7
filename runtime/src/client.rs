//! Entry point: a handle on a document store that hands out query builders.

use crate::config::ExecutorConfig;
use crate::executor::Executor;
use crate::query::Query;
use docquery_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use docquery_core::store::DocumentStore;
use std::fmt;
use std::sync::Arc;
use tracing::Dispatch;

/// Query client bound to one document store.
///
/// Cheap to clone; clones share the driver, clock, id generator, config and
/// logger.
///
/// # Example
///
/// ```
/// use docquery_runtime::Client;
/// use docquery_testing::InMemoryDocumentStore;
/// use docquery_core::doc;
///
/// # async fn example() -> Result<(), docquery_core::QueryError> {
/// let client = Client::new(InMemoryDocumentStore::new());
///
/// client
///     .collection("events")
///     .insert(doc!({ "name": "Opera", "price": 50 }))
///     .resolve()
///     .await?;
///
/// let cheap = client.collection("events").lte("price", 60).resolve().await?;
/// assert_eq!(cheap.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    executor: Arc<Executor>,
}

impl Client {
    /// Create a client with the wall clock, UUID identifiers, default config
    /// and no logging.
    #[must_use]
    pub fn new(store: impl DocumentStore + 'static) -> Self {
        Self::builder(store).build()
    }

    /// Start configuring a client.
    #[must_use]
    pub fn builder(store: impl DocumentStore + 'static) -> ClientBuilder {
        ClientBuilder::new(Arc::new(store))
    }

    /// Start configuring a client around a shared driver.
    #[must_use]
    pub fn builder_shared(store: Arc<dyn DocumentStore>) -> ClientBuilder {
        ClientBuilder::new(store)
    }

    /// Start a query against a collection.
    ///
    /// No I/O happens until the returned builder is resolved.
    #[must_use]
    pub fn collection(&self, name: impl Into<String>) -> Query {
        Query::new(Arc::clone(&self.executor), name.into())
    }

    /// Active executor configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        self.executor.config()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", self.executor.config())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Client`].
///
/// # Example
///
/// ```
/// use docquery_runtime::{Client, ExecutorConfig};
/// use docquery_testing::{InMemoryDocumentStore, SequentialIdGenerator, test_clock};
///
/// let client = Client::builder(InMemoryDocumentStore::new())
///     .clock(test_clock())
///     .id_generator(SequentialIdGenerator::new("evt"))
///     .config(ExecutorConfig::default().with_write_concurrency(1))
///     .build();
/// assert_eq!(client.config().write_concurrency, 1);
/// ```
pub struct ClientBuilder {
    store: Arc<dyn DocumentStore>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: Option<ExecutorConfig>,
    logger: Option<Dispatch>,
}

impl ClientBuilder {
    fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            clock: None,
            ids: None,
            config: None,
            logger: None,
        }
    }

    /// Set the clock used for `created_at` / `updated_at`.
    ///
    /// Default: the system clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Set the identifier source for documents written without an `id`.
    ///
    /// Default: random UUID v4.
    #[must_use]
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Set the executor configuration.
    ///
    /// Default: [`ExecutorConfig::default`].
    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Route the client's tracing events to `logger`.
    ///
    /// Events go to this dispatcher instead of the global subscriber.
    /// Default: discard everything.
    ///
    /// ```
    /// use docquery_runtime::Client;
    /// use docquery_testing::InMemoryDocumentStore;
    /// use tracing::Dispatch;
    ///
    /// let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).finish();
    /// let client = Client::builder(InMemoryDocumentStore::new())
    ///     .logger(Dispatch::new(subscriber))
    ///     .build();
    /// ```
    #[must_use]
    pub fn logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> Client {
        let executor = Executor::new(
            self.store,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.ids.unwrap_or_else(|| Arc::new(UuidGenerator)),
            self.config.unwrap_or_default(),
            self.logger.unwrap_or_else(Dispatch::none),
        );
        Client {
            executor: Arc::new(executor),
        }
    }
}
