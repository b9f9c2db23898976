//! Stampcard demo.
//!
//! Runs one customer through a loyalty program: enroll, stamp to completion,
//! redeem, then re-join and delete the new card. Uses the in-memory store by
//! default; set `STAMPCARD_STORE=postgres` and `DATABASE_URL` to run against
//! `PostgreSQL`.

use anyhow::Context;
use stampcard_core::environment::{IdGenerator, SystemClock, UuidIdGenerator};
use stampcard_core::ids::UserId;
use stampcard_core::store::DocumentStore;
use stampcard_loyalty::model::UserProfile;
use stampcard_loyalty::providers::{
    FixedIdentity, LogNotifier, LogSoundPlayer, StoreActivityLog, StoreNotificationDirectory,
};
use stampcard_loyalty::{
    LoyaltyConfig, LoyaltyEnvironment, LoyaltyService, NewProgram, SideEffects, StampRequest, StoreBackend,
};
use stampcard_postgres::PostgresDocumentStore;
use stampcard_runtime::dispatcher;
use stampcard_runtime::metrics::MetricsServer;
use stampcard_testing::InMemoryDocumentStore;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stampcard=info,stampcard_loyalty=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LoyaltyConfig::from_env().context("invalid configuration")?;
    info!(platform = ?config.platform, store = ?config.store, "Configuration loaded");

    let mut metrics = config.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start().context("failed to start metrics exporter")?;
    }

    let store: Arc<dyn DocumentStore> = match config.store {
        StoreBackend::Memory => Arc::new(InMemoryDocumentStore::new()),
        StoreBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let store = PostgresDocumentStore::connect(&config.database.url, config.database.max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            store.migrate().await.context("failed to run migrations")?;
            Arc::new(store)
        },
    };

    let clock = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidIdGenerator);
    let directory = StoreNotificationDirectory::new(Arc::clone(&store));
    // SideEffects skips sound cues on platforms without audio.
    let effects = SideEffects::new(
        Arc::new(LogNotifier),
        Arc::new(directory.clone()),
        Arc::new(LogSoundPlayer),
        Arc::new(StoreActivityLog::new(Arc::clone(&store), Arc::clone(&ids))),
        clock.clone(),
        config.platform,
    );
    let (events, dispatcher) = dispatcher::channel(config.dispatch_queue, effects);
    let dispatcher = dispatcher.spawn();

    let customer = UserId::new(format!("customer-{}", ids.next_id()));
    let owner = UserId::new(format!("owner-{}", ids.next_id()));
    let service = LoyaltyService::new(
        LoyaltyEnvironment {
            store,
            clock,
            ids,
            identity: Arc::new(FixedIdentity::signed_in(customer.clone())),
            events,
        },
        &config,
    );

    run_scenario(&service, &directory, &customer, &owner).await?;

    drop(service);
    let handled = dispatcher.await.context("dispatcher task failed")?;
    info!(handled, "Dispatcher drained");

    if let Some(rendered) = metrics.as_ref().and_then(MetricsServer::render) {
        info!(bytes = rendered.len(), "Metrics snapshot rendered");
    }
    Ok(())
}

async fn run_scenario(
    service: &LoyaltyService,
    directory: &StoreNotificationDirectory,
    customer: &UserId,
    owner: &UserId,
) -> anyhow::Result<()> {
    directory
        .register(&UserProfile {
            id: customer.clone(),
            display_name: "Ada".to_string(),
            push_token: Some("demo-device-token".to_string()),
        })
        .await?;

    let business = service.create_business(owner, "Bean There").await?;
    let program = service
        .create_program(owner, NewProgram::new(business.id.clone(), 3, "Free flat white"))
        .await?;

    let card = service.enroll(customer, "Ada", &program.id).await?;
    info!(code = %card.code, "Card issued");

    let found = service.find_active_card_by_code(&business.id, &card.code).await?;
    info!(found = found.is_some(), "Merchant looked up the code");

    let request = StampRequest::for_card(&card);
    let single = service.add_stamp(request.clone()).await?;
    info!(current = single.current_stamps, total = single.total_slots, "Single stamp");

    let bulk = service.add_stamps(request.with_count(5)).await?;
    info!(
        added = bulk.stamps_added,
        current = bulk.current_stamps,
        completed = bulk.is_completed,
        "Bulk stamp"
    );

    let redeemed = service.redeem_reward(&card.id, Some("Enjoy!")).await?;
    info!(reward = %redeemed.reward_description, "Reward redeemed");

    if let Err(err) = service.redeem_reward(&card.id, None).await {
        warn!(error = %err, message = %err.user_message(), "Second redemption rejected");
    }

    let again = service.enroll(customer, "Ada", &program.id).await?;
    info!(code = %again.code, "Re-joined after redemption");
    service.delete_card(&again.id).await?;

    let cards = service.list_customer_cards(customer).await?;
    info!(cards = cards.len(), "Customer cards remaining");
    Ok(())
}
