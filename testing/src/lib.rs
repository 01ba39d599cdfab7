//! # docquery Testing
//!
//! Testing utilities for docquery.
//!
//! This crate provides:
//! - [`InMemoryDocumentStore`]: a deterministic driver with fault injection
//! - Deterministic `Clock` implementations
//! - Predictable identifier generation
//!
//! ## Example
//!
//! ```ignore
//! use docquery_core::doc;
//! use docquery_runtime::Client;
//! use docquery_testing::{InMemoryDocumentStore, SequentialIdGenerator, test_clock};
//!
//! #[tokio::test]
//! async fn test_listing_flow() {
//!     let store = InMemoryDocumentStore::new();
//!     let client = Client::builder(store.clone())
//!         .clock(test_clock())
//!         .id_generator(SequentialIdGenerator::new("evt"))
//!         .build();
//!
//!     client.collection("events").insert(doc!({ "name": "Opera" })).resolve().await.unwrap();
//!     assert_eq!(store.len("events"), 1);
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use docquery_core::environment::{Clock, IdGenerator};

/// In-memory document store driver
pub mod memory;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Duration, IdGenerator, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock frozen at one instant.
    ///
    /// Every write resolved under it gets the same `created_at`, so expected
    /// documents can be spelled out literally.
    ///
    /// ```
    /// use docquery_core::environment::Clock;
    /// use docquery_testing::test_clock;
    ///
    /// let clock = test_clock();
    /// assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that moves forward by a fixed step on every reading.
    ///
    /// The first reading returns the start time.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Create a clock starting at `start` and advancing by `step`.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        #[allow(clippy::unwrap_used)] // Poisoning only follows a panicking test
        fn now(&self) -> DateTime<Utc> {
            let mut next = self.next.lock().unwrap();
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Predictable identifiers: `{prefix}-1`, `{prefix}-2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        counter: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Create a generator with the given prefix.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                counter: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn generate(&self) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("{}-{n}", self.prefix)
        }
    }

    /// Clock frozen at 2025-01-01T00:00:00Z, the instant the integration
    /// fixtures are written against.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use memory::{InMemoryDocumentStore, StoreCall, StoreOp};
pub use mocks::{FixedClock, SequentialIdGenerator, SteppingClock, test_clock};
