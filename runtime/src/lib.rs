//! # Stampcard Runtime
//!
//! Runtime plumbing around the loyalty protocol.
//!
//! ## Core Components
//!
//! - **Dispatcher**: bounded queue plus task that runs post-commit side effects
//!   off the request path ([`dispatcher`])
//! - **Retry**: backoff policy for outer retry loops such as code re-draws
//!   ([`retry`])
//! - **Metrics**: metric descriptions, protocol recorders and the Prometheus
//!   exporter ([`metrics`])

/// Post-commit event dispatch
pub mod dispatcher;

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub use dispatcher::{Dispatcher, EventHandler, EventSink};
pub use metrics::{MetricsError, MetricsServer, ProtocolMetrics};
pub use retry::{RetryPolicy, retry_with_predicate};
