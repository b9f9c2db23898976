//! [`DocumentStore`] over a single JSONB table.

use crate::error::map_sqlx_error;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Postgres, Row};
use stampcard_core::document::{Document, DocumentData, DocumentPath, Fields, Query};
use stampcard_core::error::StoreError;
use stampcard_core::store::{DocumentStore, StoreResult, Transaction};
use std::collections::HashMap;

/// `PostgreSQL`-backed document store.
///
/// Each transaction runs at `SERIALIZABLE` isolation. Reads execute
/// immediately; writes are buffered and applied right before `COMMIT`, so a
/// transaction whose reads were invalidated fails with SQLSTATE `40001`,
/// which surfaces as [`StoreError::Aborted`] and is re-executed by
/// `run_atomic`.
///
/// Server timestamps resolve to the database's transaction time (`now()`).
///
/// # Example
///
/// ```no_run
/// use stampcard_postgres::PostgresDocumentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresDocumentStore::connect("postgres://localhost/stampcard", 10).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] (or another mapped error) if the
    /// database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!(max_connections, "Connected to PostgreSQL document store");
        Ok(Self::from_pool(pool))
    }

    /// Create the `documents` table and its index if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Internal(format!("Migration failed: {e}")))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_serializable(&self) -> StoreResult<sqlx::Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(tx)
    }

    /// Apply writes in a one-shot transaction.
    async fn write_now(&self, writes: Vec<BufferedWrite>) -> StoreResult<()> {
        let mut tx = self.begin_serializable().await?;
        apply_writes(&mut tx, writes).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }
}

fn data_from_value(path: &DocumentPath, value: serde_json::Value) -> StoreResult<DocumentData> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode {
            path: path.to_string(),
            reason: format!("expected an object, found {other}"),
        }),
    }
}

fn document_from_row(row: &PgRow) -> StoreResult<Document> {
    let collection: String = row.try_get("collection").map_err(map_sqlx_error)?;
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let value: serde_json::Value = row.try_get("data").map_err(map_sqlx_error)?;
    let path = DocumentPath::new(collection, id);
    let data = data_from_value(&path, value)?;
    Ok(Document::new(path, data))
}

async fn read_document(conn: &mut PgConnection, path: &DocumentPath, lock: bool) -> StoreResult<Option<DocumentData>> {
    let sql = if lock {
        "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE"
    } else {
        "SELECT data FROM documents WHERE collection = $1 AND id = $2"
    };
    let value: Option<serde_json::Value> = sqlx::query_scalar(sql)
        .bind(path.collection())
        .bind(path.id())
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_error)?;
    value.map(|v| data_from_value(path, v)).transpose()
}

async fn upsert(conn: &mut PgConnection, path: &DocumentPath, data: DocumentData) -> StoreResult<()> {
    sqlx::query(
        r"
        INSERT INTO documents (collection, id, data, updated_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (collection, id)
        DO UPDATE SET data = EXCLUDED.data, updated_at = now()
        ",
    )
    .bind(path.collection())
    .bind(path.id())
    .bind(serde_json::Value::Object(data))
    .execute(conn)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

enum BufferedWrite {
    Set(DocumentPath, Fields),
    Update(DocumentPath, Fields),
    Delete(DocumentPath),
}

async fn apply_writes(tx: &mut sqlx::Transaction<'static, Postgres>, writes: Vec<BufferedWrite>) -> StoreResult<()> {
    if writes.is_empty() {
        return Ok(());
    }
    let now: DateTime<Utc> = sqlx::query_scalar("SELECT now()")
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

    for write in writes {
        match write {
            BufferedWrite::Set(path, fields) => {
                let mut data = DocumentData::new();
                fields.apply_to(&mut data, now)?;
                upsert(&mut **tx, &path, data).await?;
            },
            BufferedWrite::Update(path, fields) => {
                let mut data = read_document(&mut **tx, &path, true)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                fields.apply_to(&mut data, now)?;
                upsert(&mut **tx, &path, data).await?;
            },
            BufferedWrite::Delete(path) => {
                sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                    .bind(path.collection())
                    .bind(path.id())
                    .execute(&mut **tx)
                    .await
                    .map_err(map_sqlx_error)?;
            },
        }
    }
    Ok(())
}

impl DocumentStore for PostgresDocumentStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn Transaction>>> {
        Box::pin(async move {
            let tx = self.begin_serializable().await?;
            let handle: Box<dyn Transaction> = Box::new(PostgresTransaction { tx, writes: Vec::new() });
            Ok(handle)
        })
    }

    fn get(&self, path: &DocumentPath) -> BoxFuture<'_, StoreResult<Option<Document>>> {
        let path = path.clone();
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
            let data = read_document(&mut *conn, &path, false).await?;
            Ok(data.map(|data| Document::new(path, data)))
        })
    }

    fn get_all(&self, paths: &[DocumentPath]) -> BoxFuture<'_, StoreResult<Vec<Document>>> {
        let paths = paths.to_vec();
        Box::pin(async move {
            if paths.is_empty() {
                return Ok(Vec::new());
            }
            let collections: Vec<String> = paths.iter().map(|p| p.collection().to_string()).collect();
            let ids: Vec<String> = paths.iter().map(|p| p.id().to_string()).collect();
            let rows = sqlx::query(
                r"
                SELECT d.collection, d.id, d.data
                FROM documents d
                JOIN UNNEST($1::text[], $2::text[]) AS wanted(collection, id)
                  ON d.collection = wanted.collection AND d.id = wanted.id
                ",
            )
            .bind(&collections)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            let mut found: HashMap<DocumentPath, Document> = HashMap::with_capacity(rows.len());
            for row in &rows {
                let document = document_from_row(row)?;
                found.insert(document.path.clone(), document);
            }
            Ok(paths.iter().filter_map(|p| found.remove(p)).collect())
        })
    }

    fn query(&self, query: &Query) -> BoxFuture<'_, StoreResult<Vec<Document>>> {
        let query = query.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT collection, id, data FROM documents WHERE collection = $1 AND data @> $2 ORDER BY id",
            )
            .bind(&query.collection)
            .bind(query.filter_object())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            rows.iter().map(document_from_row).collect()
        })
    }

    fn set(&self, path: &DocumentPath, data: Fields) -> BoxFuture<'_, StoreResult<()>> {
        let path = path.clone();
        Box::pin(async move { self.write_now(vec![BufferedWrite::Set(path, data)]).await })
    }

    fn update(&self, path: &DocumentPath, fields: Fields) -> BoxFuture<'_, StoreResult<()>> {
        let path = path.clone();
        Box::pin(async move { self.write_now(vec![BufferedWrite::Update(path, fields)]).await })
    }
}

struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    writes: Vec<BufferedWrite>,
}

impl Transaction for PostgresTransaction {
    fn get<'a>(&'a mut self, path: &'a DocumentPath) -> BoxFuture<'a, StoreResult<Option<Document>>> {
        Box::pin(async move {
            let data = read_document(&mut *self.tx, path, false).await?;
            Ok(data.map(|data| Document::new(path.clone(), data)))
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
            let PostgresTransaction { mut tx, writes } = *self;
            apply_writes(&mut tx, writes).await?;
            tx.commit().await.map_err(map_sqlx_error)
        })
    }
}
