//! `PostgreSQL` document store for the stampcard loyalty protocol.
//!
//! This crate provides a PostgreSQL-backed implementation of the
//! `DocumentStore` trait from `stampcard-core`. Documents live in a single
//! JSONB table keyed by `(collection, id)` and it supports:
//!
//! - `SERIALIZABLE` transactions with conflicts surfaced as `Aborted`
//! - Equality queries via JSONB containment
//! - Connection pooling
//!
//! # Example
//!
//! ```no_run
//! use stampcard_postgres::PostgresDocumentStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresDocumentStore::connect("postgres://localhost/stampcard", 10).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod store;

pub use error::map_sqlx_error;
pub use store::PostgresDocumentStore;
