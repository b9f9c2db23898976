//! The loyalty service and its injected environment.
//!
//! Operations are implemented in their own modules (`enrollment`,
//! `stamping`, `redemption`, `queries`, `cards`, `programs`) as `impl`
//! blocks on [`LoyaltyService`].

use crate::code_generator::CodeGenerator;
use crate::config::LoyaltyConfig;
use crate::events::LoyaltyEvent;
use crate::model::decode_opt;
use crate::providers::Identity;
use serde::de::DeserializeOwned;
use stampcard_core::document::DocumentPath;
use stampcard_core::environment::{Clock, IdGenerator};
use stampcard_core::error::StoreError;
use stampcard_core::ids::RecordId;
use stampcard_core::store::{DocumentStore, Transaction, TransactionOptions};
use stampcard_runtime::dispatcher::EventSink;
use stampcard_runtime::retry::RetryPolicy;
use std::sync::Arc;

/// Everything the service needs from the outside world.
#[derive(Clone)]
pub struct LoyaltyEnvironment {
    /// Document store shared by every operation.
    pub store: Arc<dyn DocumentStore>,
    /// Time source for record creation times.
    pub clock: Arc<dyn Clock>,
    /// Source of new document ids.
    pub ids: Arc<dyn IdGenerator>,
    /// The signed-in user.
    pub identity: Arc<dyn Identity>,
    /// Post-commit event queue.
    pub events: EventSink<LoyaltyEvent>,
}

/// Enrollment, stamping, redemption and the read side over one store.
///
/// Cheap to clone; clones share the environment.
#[derive(Clone)]
pub struct LoyaltyService {
    pub(crate) env: LoyaltyEnvironment,
    pub(crate) codes: CodeGenerator,
    pub(crate) transaction: TransactionOptions,
    pub(crate) enrollment_retry: RetryPolicy,
}

impl LoyaltyService {
    /// Build a service from its environment and configuration.
    #[must_use]
    pub fn new(env: LoyaltyEnvironment, config: &LoyaltyConfig) -> Self {
        Self {
            env,
            codes: config.code_generator(),
            transaction: config.transaction_options(),
            enrollment_retry: config.enrollment_retry(),
        }
    }

    /// The store this service operates on.
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.env.store.as_ref()
    }

    /// The code generator enrollments draw from.
    #[must_use]
    pub const fn code_generator(&self) -> &CodeGenerator {
        &self.codes
    }

    pub(crate) fn next_id(&self) -> RecordId {
        self.env.ids.next_id()
    }

    /// Queue a post-commit event; a full queue drops it.
    pub(crate) fn emit(&self, event: LoyaltyEvent) {
        self.env.events.emit(event);
    }

    /// Read and decode one document outside any transaction.
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, path: &DocumentPath) -> Result<Option<T>, StoreError> {
        let document = self.env.store.get(path).await?;
        decode_opt(document.as_ref())
    }
}

/// Read and decode one document inside a transaction.
pub(crate) async fn read<T: DeserializeOwned>(
    tx: &mut dyn Transaction,
    path: &DocumentPath,
) -> Result<Option<T>, StoreError> {
    let document = tx.get(path).await?;
    decode_opt(document.as_ref())
}
