//! In-memory document store with optimistic concurrency.
//!
//! [`InMemoryDocumentStore`] implements the full transaction contract of
//! [`DocumentStore`]: every committed write stamps the document with a fresh
//! version, transactions remember the version of everything they read, and a
//! commit whose read set changed underneath it fails with
//! [`StoreError::Aborted`]. That makes it a faithful stand-in for the managed
//! database when testing races between concurrent clients.
//!
//! Transaction reads yield to the scheduler before touching state so that
//! concurrently spawned tasks actually interleave, even on a current-thread
//! runtime.
//!
//! Faults can be injected per [`Operation`] to exercise error translation and
//! retry paths.

use futures::future::BoxFuture;
use stampcard_core::document::{Document, DocumentData, DocumentPath, Fields, Query};
use stampcard_core::environment::{Clock, SystemClock};
use stampcard_core::error::StoreError;
use stampcard_core::store::{DocumentStore, StoreResult, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Opening a transaction.
    Begin,
    /// Any single-document or batched read, inside or outside a transaction.
    Get,
    /// Collection queries.
    Query,
    /// Non-transactional writes.
    Write,
    /// Transaction commits.
    Commit,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    error: StoreError,
    remaining: usize,
}

#[derive(Debug, Clone)]
struct Versioned {
    data: DocumentData,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<DocumentPath, Versioned>,
    last_version: u64,
    faults: Vec<Fault>,
    commits: u64,
    conflicts: u64,
}

impl State {
    fn take_fault(&mut self, operation: Operation) -> StoreResult<()> {
        let Some(index) = self.faults.iter().position(|f| f.operation == operation) else {
            return Ok(());
        };
        let fault = &mut self.faults[index];
        let error = fault.error.clone();
        fault.remaining = fault.remaining.saturating_sub(1);
        if fault.remaining == 0 {
            self.faults.remove(index);
        }
        Err(error)
    }

    fn version_of(&self, path: &DocumentPath) -> u64 {
        self.documents.get(path).map_or(0, |d| d.version)
    }

    fn snapshot(&self, path: &DocumentPath) -> Option<Document> {
        self.documents
            .get(path)
            .map(|d| Document::new(path.clone(), d.data.clone()))
    }

    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `BTreeMap`-backed document store for fast, deterministic tests.
///
/// # Example
///
/// ```
/// use stampcard_core::document::{DocumentPath, Fields};
/// use stampcard_core::store::DocumentStore;
/// use stampcard_testing::InMemoryDocumentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// let path = DocumentPath::new("businesses", "b1");
/// store.set(&path, Fields::new().set("name", "Bean There")).await?;
/// assert!(store.get(&path).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("documents", &self.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryDocumentStore {
    /// Create an empty store that stamps server timestamps with the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store that resolves server timestamps with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    /// Fail the next `times` calls of `operation` with `error`.
    pub fn fail_times(&self, operation: Operation, error: StoreError, times: usize) {
        if times == 0 {
            return;
        }
        lock(&self.state).faults.push(Fault {
            operation,
            error,
            remaining: times,
        });
    }

    /// Fail the next call of `operation` with `error`.
    pub fn fail_next(&self, operation: Operation, error: StoreError) {
        self.fail_times(operation, error, 1);
    }

    /// Write raw contents, bypassing field resolution (for malformed-data tests).
    pub fn insert_raw(&self, path: DocumentPath, data: DocumentData) {
        let mut state = lock(&self.state);
        let version = state.next_version();
        state.documents.insert(path, Versioned { data, version });
    }

    /// Current contents of a document.
    #[must_use]
    pub fn snapshot(&self, path: &DocumentPath) -> Option<DocumentData> {
        lock(&self.state).documents.get(path).map(|d| d.data.clone())
    }

    /// Every document of a collection, ordered by id.
    #[must_use]
    pub fn documents_in(&self, collection: &str) -> Vec<Document> {
        lock(&self.state)
            .documents
            .iter()
            .filter(|(path, _)| path.collection() == collection)
            .map(|(path, d)| Document::new(path.clone(), d.data.clone()))
            .collect()
    }

    /// Number of documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        lock(&self.state)
            .documents
            .keys()
            .filter(|path| path.collection() == collection)
            .count()
    }

    /// Total number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).documents.len()
    }

    /// Whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successfully committed transactions.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        lock(&self.state).commits
    }

    /// Number of commits rejected because their read set changed.
    #[must_use]
    pub fn conflict_count(&self) -> u64 {
        lock(&self.state).conflicts
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn Transaction>>> {
        Box::pin(async move {
            lock(&self.state).take_fault(Operation::Begin)?;
            let tx: Box<dyn Transaction> = Box::new(InMemoryTransaction {
                state: Arc::clone(&self.state),
                clock: Arc::clone(&self.clock),
                reads: HashMap::new(),
                writes: Vec::new(),
            });
            Ok(tx)
        })
    }

    fn get(&self, path: &DocumentPath) -> BoxFuture<'_, StoreResult<Option<Document>>> {
        let path = path.clone();
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.take_fault(Operation::Get)?;
            Ok(state.snapshot(&path))
        })
    }

    fn get_all(&self, paths: &[DocumentPath]) -> BoxFuture<'_, StoreResult<Vec<Document>>> {
        let paths = paths.to_vec();
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.take_fault(Operation::Get)?;
            Ok(paths.iter().filter_map(|p| state.snapshot(p)).collect())
        })
    }

    fn query(&self, query: &Query) -> BoxFuture<'_, StoreResult<Vec<Document>>> {
        let query = query.clone();
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.take_fault(Operation::Query)?;
            Ok(state
                .documents
                .iter()
                .filter(|(path, d)| path.collection() == query.collection && query.matches(&d.data))
                .map(|(path, d)| Document::new(path.clone(), d.data.clone()))
                .collect())
        })
    }

    fn set(&self, path: &DocumentPath, data: Fields) -> BoxFuture<'_, StoreResult<()>> {
        let path = path.clone();
        Box::pin(async move {
            let now = self.clock.now();
            let mut state = lock(&self.state);
            state.take_fault(Operation::Write)?;
            let mut contents = DocumentData::new();
            data.apply_to(&mut contents, now)?;
            let version = state.next_version();
            state.documents.insert(path, Versioned { data: contents, version });
            Ok(())
        })
    }

    fn update(&self, path: &DocumentPath, fields: Fields) -> BoxFuture<'_, StoreResult<()>> {
        let path = path.clone();
        Box::pin(async move {
            let now = self.clock.now();
            let mut state = lock(&self.state);
            state.take_fault(Operation::Write)?;
            let mut contents = state
                .documents
                .get(&path)
                .map(|d| d.data.clone())
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            fields.apply_to(&mut contents, now)?;
            let version = state.next_version();
            state.documents.insert(path, Versioned { data: contents, version });
            Ok(())
        })
    }
}

enum BufferedWrite {
    Set(DocumentPath, Fields),
    Update(DocumentPath, Fields),
    Delete(DocumentPath),
}

struct InMemoryTransaction {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    reads: HashMap<DocumentPath, u64>,
    writes: Vec<BufferedWrite>,
}

impl Transaction for InMemoryTransaction {
    fn get<'a>(&'a mut self, path: &'a DocumentPath) -> BoxFuture<'a, StoreResult<Option<Document>>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let (document, version) = {
                let mut state = lock(&self.state);
                state.take_fault(Operation::Get)?;
                (state.snapshot(path), state.version_of(path))
            };
            // First read pins the snapshot; later reads of the same path must
            // not silently move it forward.
            self.reads.entry(path.clone()).or_insert(version);
            Ok(document)
        })
    }

    fn set(&mut self, path: DocumentPath, data: Fields) {
        self.writes.push(BufferedWrite::Set(path, data));
    }

    fn update(&mut self, path: DocumentPath, fields: Fields) {
        self.writes.push(BufferedWrite::Update(path, fields));
    }

    fn delete(&mut self, path: DocumentPath) {
        self.writes.push(BufferedWrite::Delete(path));
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move {
            let InMemoryTransaction {
                state: shared,
                clock,
                reads,
                writes,
            } = *self;
            let now = clock.now();
            let mut state = lock(&shared);
            state.take_fault(Operation::Commit)?;

            for (path, seen) in &reads {
                if state.version_of(path) != *seen {
                    state.conflicts += 1;
                    return Err(StoreError::Aborted(format!(
                        "{path} was modified after it was read"
                    )));
                }
            }

            // Stage everything first so a failing update leaves no partial commit.
            let mut staged: BTreeMap<DocumentPath, Option<DocumentData>> = BTreeMap::new();
            for write in writes {
                match write {
                    BufferedWrite::Set(path, fields) => {
                        let mut data = DocumentData::new();
                        fields.apply_to(&mut data, now)?;
                        staged.insert(path, Some(data));
                    },
                    BufferedWrite::Update(path, fields) => {
                        let base = match staged.get(&path) {
                            Some(pending) => pending.clone(),
                            None => state.documents.get(&path).map(|d| d.data.clone()),
                        };
                        let mut data = base.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                        fields.apply_to(&mut data, now)?;
                        staged.insert(path, Some(data));
                    },
                    BufferedWrite::Delete(path) => {
                        staged.insert(path, None);
                    },
                }
            }

            let version = state.next_version();
            for (path, data) in staged {
                match data {
                    Some(data) => {
                        state.documents.insert(path, Versioned { data, version });
                    },
                    None => {
                        state.documents.remove(&path);
                    },
                }
            }
            state.commits += 1;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(id: &str) -> DocumentPath {
        DocumentPath::new("docs", id)
    }

    #[tokio::test]
    async fn commit_applies_all_writes_together() {
        let store = InMemoryDocumentStore::new();
        store.set(&path("a"), Fields::new().set("n", 1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&path("a")).await.unwrap().is_some());
        tx.update(path("a"), Fields::new().increment("n", 2));
        tx.set(path("b"), Fields::new().set("n", 10));
        tx.delete(path("missing"));
        tx.commit().await.unwrap();

        assert_eq!(store.snapshot(&path("a")).unwrap()["n"], json!(3));
        assert_eq!(store.snapshot(&path("b")).unwrap()["n"], json!(10));
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn stale_read_set_aborts_commit() {
        let store = InMemoryDocumentStore::new();
        store.set(&path("a"), Fields::new().set("n", 1)).await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.get(&path("a")).await.unwrap();
        second.get(&path("a")).await.unwrap();
        first.update(path("a"), Fields::new().set("n", 2));
        second.update(path("a"), Fields::new().set("n", 3));

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.snapshot(&path("a")).unwrap()["n"], json!(2));
        assert_eq!(store.conflict_count(), 1);
    }

    #[tokio::test]
    async fn reading_an_absent_document_still_guards_it() {
        let store = InMemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&path("slot")).await.unwrap().is_none());

        store.set(&path("slot"), Fields::new().set("taken", true)).await.unwrap();

        tx.set(path("slot"), Fields::new().set("taken", false));
        assert!(tx.commit().await.unwrap_err().is_conflict());
        assert_eq!(store.snapshot(&path("slot")).unwrap()["taken"], json!(true));
    }

    #[tokio::test]
    async fn failed_update_leaves_no_partial_commit() {
        let store = InMemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.set(path("a"), Fields::new().set("n", 1));
        tx.update(path("missing"), Fields::new().set("n", 1));
        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn injected_faults_fire_the_requested_number_of_times() {
        let store = InMemoryDocumentStore::new();
        store.fail_times(Operation::Get, StoreError::Unavailable("down".into()), 2);

        assert!(store.get(&path("a")).await.is_err());
        assert!(store.get(&path("a")).await.is_err());
        assert!(store.get(&path("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_filters_by_collection_and_fields() {
        let store = InMemoryDocumentStore::new();
        store.set(&path("a"), Fields::new().set("owner", "u1")).await.unwrap();
        store.set(&path("b"), Fields::new().set("owner", "u2")).await.unwrap();
        store
            .set(&DocumentPath::new("other", "c"), Fields::new().set("owner", "u1"))
            .await
            .unwrap();

        let found = store
            .query(&Query::collection("docs").where_eq("owner", "u1"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, path("a"));
    }
}
