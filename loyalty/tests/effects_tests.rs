//! Post-commit side effect tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Fixture, ada, config};
use stampcard_loyalty::mocks::{
    FailingNotifier, RecordingActivityLog, RecordingNotifier, RecordingSoundPlayer, SentNotification, StaticDirectory,
};
use stampcard_loyalty::model::ActivityKind;
use futures::future::BoxFuture;
use stampcard_loyalty::providers::{Notifier, ProviderResult, SoundCue, StampNotification};
use stampcard_loyalty::{LoyaltyConfig, Platform, SideEffects, StampRequest};
use stampcard_runtime::dispatcher;
use stampcard_testing::test_clock;
use std::sync::Arc;

/// Push gateway that panics on every send.
struct CrashingNotifier;

#[allow(clippy::panic)]
fn crash(token: &str) -> ProviderResult<()> {
    panic!("push gateway crashed sending to {token}")
}

impl Notifier for CrashingNotifier {
    fn send_stamp_notification(&self, token: String, _: StampNotification) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move { crash(&token) })
    }

    fn send_redemption_notification(&self, token: String, _: String) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move { crash(&token) })
    }
}

struct Recorders {
    notifier: RecordingNotifier,
    sound: RecordingSoundPlayer,
    activity: RecordingActivityLog,
}

fn side_effects(notifier: Arc<dyn Notifier>, recorders: &Recorders, platform: Platform) -> SideEffects {
    SideEffects::new(
        notifier,
        Arc::new(
            StaticDirectory::new()
                .with_token("ada", "ada-device")
                .with_token("owner", "owner-device"),
        ),
        Arc::new(recorders.sound.clone()),
        Arc::new(recorders.activity.clone()),
        Arc::new(test_clock()),
        platform,
    )
}

fn recorders() -> Recorders {
    Recorders {
        notifier: RecordingNotifier::new(),
        sound: RecordingSoundPlayer::new(),
        activity: RecordingActivityLog::new(),
    }
}

/// Run enroll, stamp, complete and redeem, then drain the dispatcher.
async fn run_lifecycle(effects: SideEffects, config: &LoyaltyConfig) -> u64 {
    let (sink, dispatcher) = dispatcher::channel(64, effects);
    let task = dispatcher.spawn();

    let fx = Fixture::build(2, config, sink).await;
    let card = fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap();
    fx.service.add_stamp(StampRequest::for_card(&card)).await.unwrap();
    fx.service.add_stamp(StampRequest::for_card(&card)).await.unwrap();
    // Full card: no stamp added, no event.
    fx.service.add_stamp(StampRequest::for_card(&card)).await.unwrap();
    fx.service.redeem_reward(&card.id, Some("Enjoy")).await.unwrap();

    drop(fx);
    task.await.unwrap()
}

#[tokio::test]
async fn test_committed_operations_trigger_side_effects() {
    let recorders = recorders();
    let effects = side_effects(Arc::new(recorders.notifier.clone()), &recorders, Platform::Ios);

    let handled = run_lifecycle(effects, &config()).await;

    assert_eq!(handled, 4);
    let kinds: Vec<_> = recorders.activity.notes().iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActivityKind::Enrolled,
            ActivityKind::Stamped,
            ActivityKind::Completed,
            ActivityKind::Redeemed
        ]
    );
    assert_eq!(
        recorders.sound.played(),
        vec![SoundCue::Success, SoundCue::Completion, SoundCue::Completion]
    );

    let sent = recorders.notifier.sent();
    assert_eq!(sent.len(), 4);
    assert!(matches!(
        &sent[1],
        SentNotification::Stamp { token, notification } if token == "ada-device" && notification.is_completed
    ));
    assert!(sent.contains(&SentNotification::Redemption {
        token: "owner-device".into(),
        business_name: "Bean There".into(),
    }));
}

#[tokio::test]
async fn test_web_platform_plays_no_sounds() {
    let recorders = recorders();
    let effects = side_effects(Arc::new(recorders.notifier.clone()), &recorders, Platform::Web);

    run_lifecycle(effects, &config()).await;

    assert!(recorders.sound.played().is_empty());
    assert_eq!(recorders.notifier.sent().len(), 4);
}

/// A failing push neither fails the operation nor blocks the other effects.
#[tokio::test]
async fn test_failed_notifications_are_isolated() {
    let recorders = recorders();
    let effects = side_effects(Arc::new(FailingNotifier), &recorders, Platform::Android);

    let handled = run_lifecycle(effects, &config()).await;

    assert_eq!(handled, 4);
    assert_eq!(recorders.activity.notes().len(), 4);
    assert_eq!(recorders.sound.played().len(), 3);
}

/// A panicking push neither takes down the dispatcher nor the sibling effects.
#[tokio::test]
async fn test_panicking_notifier_is_isolated() {
    let recorders = recorders();
    let effects = side_effects(Arc::new(CrashingNotifier), &recorders, Platform::Ios);

    let handled = run_lifecycle(effects, &config()).await;

    assert_eq!(handled, 4);
    let kinds: Vec<_> = recorders.activity.notes().iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActivityKind::Enrolled,
            ActivityKind::Stamped,
            ActivityKind::Completed,
            ActivityKind::Redeemed
        ]
    );
    assert_eq!(
        recorders.sound.played(),
        vec![SoundCue::Success, SoundCue::Completion, SoundCue::Completion]
    );
}
