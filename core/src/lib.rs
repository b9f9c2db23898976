//! # Stampcard Core
//!
//! Core traits and types shared by every stampcard crate.
//!
//! The loyalty protocol (enrollment, stamping, redemption) is consistency
//! critical, but all of its consistency is delegated to the document store's
//! atomic transaction primitive. This crate pins down exactly what that
//! primitive must provide, independent of any concrete database:
//!
//! - [`document`]: paths, raw documents, field writes with store-resolved
//!   sentinels (atomic increment, server timestamp), equality queries
//! - [`store`]: the [`DocumentStore`](store::DocumentStore) and
//!   [`Transaction`](store::Transaction) traits plus the
//!   [`run_atomic`](store::run_atomic) conflict-retrying runner
//! - [`error`]: the provider-style [`StoreError`](error::StoreError) taxonomy
//! - [`ids`]: strongly typed identifiers
//! - [`environment`]: injected clock and id generation
//!
//! ## Architecture Principles
//!
//! - No global store handle: every service receives its store explicitly
//! - Schema decoding at the boundary: raw documents become typed records or fail fast
//! - Backends are interchangeable behind `Arc<dyn DocumentStore>`

pub mod document;
pub mod environment;
pub mod error;
pub mod ids;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use document::{Document, DocumentData, DocumentPath, FieldValue, Fields, Query};
pub use error::{StoreError, TransactionError};
pub use ids::{BusinessId, CardId, ProgramId, RecordId, UserId};
pub use store::{DocumentStore, Transaction, TransactionOptions, run_atomic};
