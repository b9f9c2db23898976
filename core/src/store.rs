//! Transactional document store abstraction.
//!
//! This module defines what the loyalty protocol needs from its database:
//!
//! - Plain (non-transactional) reads, batched reads and equality queries
//! - Plain writes for records that need no atomicity (audit notes, programs)
//! - Atomic multi-document transactions with optimistic conflict detection
//!
//! # Transaction semantics
//!
//! A [`Transaction`] observes a consistent snapshot through its reads and
//! buffers its writes. On [`Transaction::commit`] the backend verifies that no
//! document the transaction read was modified by another committed
//! transaction in the meantime. If one was, the commit fails with
//! [`StoreError::Aborted`] and nothing is written. [`run_atomic`] re-executes
//! the transaction body on that error after a jittered backoff, up to
//! [`TransactionOptions::max_attempts`].
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `stampcard-postgres`): JSONB table, SERIALIZABLE transactions
//! - `InMemoryDocumentStore` (in `stampcard-testing`): versioned `BTreeMap`, fast and deterministic
//!
//! # Dyn Compatibility
//!
//! Both traits return `BoxFuture` instead of using `async fn` so that services
//! can hold an `Arc<dyn DocumentStore>` chosen at startup from configuration.
//!
//! # Example
//!
//! ```no_run
//! use stampcard_core::document::{DocumentPath, Fields};
//! use stampcard_core::error::StoreError;
//! use stampcard_core::store::{DocumentStore, TransactionOptions, run_atomic};
//!
//! async fn bump(store: &dyn DocumentStore) -> Result<(), StoreError> {
//!     let path = DocumentPath::new("counters", "visits");
//!     run_atomic(store, TransactionOptions::default(), |tx| {
//!         let path = path.clone();
//!         Box::pin(async move {
//!             let _current = tx.get(&path).await?;
//!             tx.update(path, Fields::new().increment("count", 1));
//!             Ok(())
//!         })
//!     })
//!     .await
//! }
//! ```

use crate::document::{Document, DocumentPath, Fields, Query};
use crate::error::{StoreError, TransactionError};
use futures::future::BoxFuture;
use rand::Rng;
use std::time::Duration;

/// Result type for store futures.
pub type StoreResult<T> = Result<T, StoreError>;

/// A document database with atomic transactions.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// service and every concurrent request.
pub trait DocumentStore: Send + Sync {
    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open a transaction.
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn Transaction>>>;

    /// Read one document outside any transaction.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, path: &DocumentPath) -> BoxFuture<'_, StoreResult<Option<Document>>>;

    /// Read many documents in one round trip.
    ///
    /// Missing documents are skipped; order follows `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get_all(&self, paths: &[DocumentPath]) -> BoxFuture<'_, StoreResult<Vec<Document>>>;

    /// Return every document of `query.collection` matching all filters,
    /// ordered by document id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(&self, query: &Query) -> BoxFuture<'_, StoreResult<Vec<Document>>>;

    /// Create or replace a document outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, path: &DocumentPath, data: Fields) -> BoxFuture<'_, StoreResult<()>>;

    /// Merge fields into an existing document outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the document does not exist.
    fn update(&self, path: &DocumentPath, fields: Fields) -> BoxFuture<'_, StoreResult<()>>;
}

/// Handle to one attempt of an atomic transaction.
///
/// Reads go to the backend immediately; writes are buffered until
/// [`commit`](Transaction::commit). Dropping an uncommitted transaction
/// discards its writes.
pub trait Transaction: Send {
    /// Read a document and add it to the transaction's read set.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails. Some backends report conflicts
    /// here as [`StoreError::Aborted`].
    fn get<'a>(&'a mut self, path: &'a DocumentPath) -> BoxFuture<'a, StoreResult<Option<Document>>>;

    /// Create or replace a document.
    fn set(&mut self, path: DocumentPath, data: Fields);

    /// Merge fields into an existing document; the commit fails with
    /// [`StoreError::NotFound`] if it does not exist by then.
    fn update(&mut self, path: DocumentPath, fields: Fields);

    /// Delete a document (no-op if it does not exist).
    fn delete(&mut self, path: DocumentPath);

    /// Validate the read set and apply every buffered write, all or nothing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Aborted`]: a document in the read set changed
    /// - [`StoreError::NotFound`]: an update targeted a missing document
    /// - any backend failure
    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;
}

/// Tuning for [`run_atomic`].
///
/// Between attempts `run_atomic` sleeps for an exponentially growing,
/// jittered delay so that transactions racing on one document spread out
/// instead of colliding again in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Total number of attempts before a conflict is reported to the caller.
    pub max_attempts: u32,
    /// Delay before the first re-execution.
    pub initial_backoff: Duration,
    /// Cap for the doubling delay.
    pub max_backoff: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl TransactionOptions {
    /// Options with the given attempt ceiling (at least one attempt).
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replace the backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Delay before re-execution number `retry` (zero-based), before jitter.
    ///
    /// `delay = min(initial_backoff * 2^retry, max_backoff)`
    #[must_use]
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(retry))
            .min(self.max_backoff)
    }

    fn jittered_backoff(&self, retry: u32) -> Duration {
        self.backoff_for_retry(retry)
            .mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }
}

/// Run `body` inside a transaction, re-executing it on optimistic conflicts.
///
/// `body` receives a fresh transaction handle on every attempt and must
/// therefore be free of side effects outside the handle. Errors returned by
/// `body` abort the attempt (buffered writes are discarded); conflicts
/// (see [`TransactionError::is_conflict`]) trigger another attempt, every
/// other error is returned immediately.
///
/// # Errors
///
/// Returns the body's error, a backend error, or the last conflict once
/// `options.max_attempts` attempts have been used.
pub async fn run_atomic<S, T, E, F>(store: &S, options: TransactionOptions, mut body: F) -> Result<T, E>
where
    S: DocumentStore + ?Sized,
    E: TransactionError + std::fmt::Display,
    F: for<'t> FnMut(&'t mut dyn Transaction) -> BoxFuture<'t, Result<T, E>>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let mut tx = store.begin().await.map_err(E::from)?;

        let result = body(tx.as_mut()).await;
        let outcome = match result {
            Ok(value) => tx.commit().await.map(|()| value).map_err(E::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "Transaction committed after retry");
                }
                return Ok(value);
            },
            Err(err) if err.is_conflict() && attempt < max_attempts => {
                let delay = options.jittered_backoff(attempt - 1);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Transaction conflict, re-executing"
                );
                metrics::counter!("stampcard_transaction_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(err) => {
                if err.is_conflict() {
                    tracing::warn!(attempt, error = %err, "Transaction conflict persisted after max attempts");
                }
                return Err(err);
            },
        }
    }
}
