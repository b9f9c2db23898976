//! # Stampcard Testing
//!
//! Testing utilities for the stampcard loyalty protocol.
//!
//! This crate provides:
//! - [`InMemoryDocumentStore`]: a transactional, conflict-detecting store
//! - Mock implementations of the environment traits ([`FixedClock`],
//!   [`SequentialIdGenerator`])
//! - [`init_test_tracing`] for readable logs under `cargo test`
//!
//! ## Example
//!
//! ```
//! use stampcard_core::environment::Clock;
//! use stampcard_testing::{InMemoryDocumentStore, test_clock};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(test_clock());
//! let store = InMemoryDocumentStore::with_clock(clock.clone());
//! assert!(store.is_empty());
//! assert_eq!(clock.now(), clock.now());
//! ```

use chrono::{DateTime, Utc};
use stampcard_core::environment::{Clock, IdGenerator};
use stampcard_core::ids::RecordId;

pub mod memory_store;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, RecordId, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use stampcard_testing::mocks::FixedClock;
    /// use stampcard_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
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

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is a literal.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `{prefix}-0001`, `{prefix}-0002`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start counting from 1 with the given prefix.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new("id")
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> RecordId {
            let n = self.next.fetch_add(1, Ordering::Relaxed);
            RecordId::new(format!("{}-{n:04}", self.prefix))
        }
    }
}

/// Install a test-friendly tracing subscriber (idempotent).
///
/// Honors `RUST_LOG`; defaults to `warn` so passing tests stay quiet.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use memory_store::{InMemoryDocumentStore, Operation};
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIdGenerator::new("card");
        assert_eq!(ids.next_id().as_str(), "card-0001");
        assert_eq!(ids.next_id().as_str(), "card-0002");
    }
}
