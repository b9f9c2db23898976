//! Shared fixtures for loyalty integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use stampcard_core::ids::UserId;
use stampcard_loyalty::events::LoyaltyEvent;
use stampcard_loyalty::providers::FixedIdentity;
use stampcard_loyalty::{Business, LoyaltyConfig, LoyaltyEnvironment, LoyaltyProgram, LoyaltyService, NewProgram};
use stampcard_runtime::dispatcher::EventSink;
use stampcard_testing::{InMemoryDocumentStore, SequentialIdGenerator, init_test_tracing, test_clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

static SERVICES: AtomicUsize = AtomicUsize::new(0);

/// Default configuration, with room for the code collisions that the
/// small code ranges of the enrollment tests provoke.
pub fn config() -> LoyaltyConfig {
    LoyaltyConfig {
        enrollment_max_attempts: 50,
        ..LoyaltyConfig::default()
    }
}

/// A service over `store`, signed in as `user`.
///
/// Every service gets its own id prefix so services sharing a store never
/// hand out the same document id.
pub fn service(
    store: &Arc<InMemoryDocumentStore>,
    user: Option<UserId>,
    events: EventSink<LoyaltyEvent>,
    config: &LoyaltyConfig,
) -> LoyaltyService {
    let identity = user.map_or_else(FixedIdentity::signed_out, FixedIdentity::signed_in);
    LoyaltyService::new(
        LoyaltyEnvironment {
            store: store.clone(),
            clock: Arc::new(test_clock()),
            ids: Arc::new(SequentialIdGenerator::new(format!("s{}", SERVICES.fetch_add(1, Ordering::Relaxed)))),
            identity: Arc::new(identity),
            events,
        },
        config,
    )
}

/// A store holding one business with one program.
pub struct Fixture {
    pub store: Arc<InMemoryDocumentStore>,
    pub service: LoyaltyService,
    pub owner: UserId,
    pub business: Business,
    pub program: LoyaltyProgram,
}

impl Fixture {
    /// Fixture with a `slots`-slot program and the default test configuration.
    pub async fn new(slots: u32) -> Self {
        Self::with_config(slots, &config()).await
    }

    /// Fixture with a custom configuration, signed in as `ada`.
    pub async fn with_config(slots: u32, config: &LoyaltyConfig) -> Self {
        Self::build(slots, config, EventSink::disconnected()).await
    }

    /// Fixture whose events go to `events`.
    pub async fn build(slots: u32, config: &LoyaltyConfig, events: EventSink<LoyaltyEvent>) -> Self {
        init_test_tracing();
        let store = Arc::new(InMemoryDocumentStore::with_clock(Arc::new(test_clock())));
        let service = service(&store, Some(ada()), events, config);
        let owner = UserId::new("owner");
        let business = service.create_business(&owner, "Bean There").await.unwrap();
        let program = service
            .create_program(&owner, NewProgram::new(business.id.clone(), slots, "Free coffee"))
            .await
            .unwrap();
        Self {
            store,
            service,
            owner,
            business,
            program,
        }
    }

    /// The same store seen by another signed-in user.
    pub fn as_user(&self, user: Option<UserId>) -> LoyaltyService {
        service(&self.store, user, EventSink::disconnected(), &config())
    }
}

/// The customer most tests enroll.
pub fn ada() -> UserId {
    UserId::new("ada")
}
