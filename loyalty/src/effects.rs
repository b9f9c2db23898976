//! Post-commit side effects.
//!
//! [`SideEffects`] is the dispatcher's handler for [`LoyaltyEvent`]s. Every
//! effect of an event runs concurrently and in isolation: a failed or
//! panicking push does not stop the sound cue or the activity note, and
//! nothing reaches the operation that emitted the event. Failures are logged
//! and counted.

use crate::config::Platform;
use crate::events::LoyaltyEvent;
use crate::model::{ActivityKind, ActivityNote};
use crate::providers::{
    ActivityLog, NotificationDirectory, Notifier, ProviderResult, SoundCue, SoundPlayer, StampNotification,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use stampcard_core::environment::Clock;
use stampcard_core::ids::{BusinessId, CardId, UserId};
use stampcard_runtime::dispatcher::EventHandler;
use stampcard_runtime::metrics::ProtocolMetrics;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Executes the side effects of committed loyalty operations.
#[derive(Clone)]
pub struct SideEffects {
    notifier: Arc<dyn Notifier>,
    directory: Arc<dyn NotificationDirectory>,
    sound: Arc<dyn SoundPlayer>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
    platform: Platform,
}

impl SideEffects {
    /// Handler wired to the given collaborators.
    #[must_use]
    pub fn new(
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn NotificationDirectory>,
        sound: Arc<dyn SoundPlayer>,
        activity: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
        platform: Platform,
    ) -> Self {
        Self {
            notifier,
            directory,
            sound,
            activity,
            clock,
            platform,
        }
    }

    fn note(&self, business_id: &BusinessId, card_id: &CardId, kind: ActivityKind, message: String) -> ActivityNote {
        ActivityNote {
            business_id: business_id.clone(),
            card_id: card_id.clone(),
            kind,
            message,
            created_at: self.clock.now(),
        }
    }

    async fn play(&self, cue: SoundCue) -> ProviderResult<()> {
        if !self.platform.sound_enabled() {
            return Ok(());
        }
        self.sound.play(cue).await
    }

    async fn push_stamp(&self, customer_id: UserId, notification: StampNotification) -> ProviderResult<()> {
        match self.directory.push_token(customer_id.clone()).await? {
            Some(token) => self.notifier.send_stamp_notification(token, notification).await,
            None => {
                tracing::debug!(customer_id = %customer_id, "No push token, skipping notification");
                Ok(())
            },
        }
    }

    async fn push_redemption(&self, user_id: UserId, business_name: String) -> ProviderResult<()> {
        match self.directory.push_token(user_id.clone()).await? {
            Some(token) => self.notifier.send_redemption_notification(token, business_name).await,
            None => {
                tracing::debug!(user_id = %user_id, "No push token, skipping notification");
                Ok(())
            },
        }
    }

    async fn dispatch(&self, event: LoyaltyEvent) {
        match event {
            LoyaltyEvent::CardEnrolled { card, business_name } => {
                let message = format!("{} joined the program at {business_name}", card.customer_name);
                let note = self.note(&card.business_id, &card.id, ActivityKind::Enrolled, message);
                isolate("activity_note", self.activity.record(note)).await;
            },
            LoyaltyEvent::StampAdded {
                card_id,
                customer_id,
                customer_name,
                business_id,
                business_name,
                stamps_added,
                current_stamps,
                total_slots,
                is_completed,
            } => {
                let (kind, message, cue) = if is_completed {
                    (
                        ActivityKind::Completed,
                        format!("{customer_name} completed their card ({current_stamps}/{total_slots})"),
                        SoundCue::Completion,
                    )
                } else {
                    (
                        ActivityKind::Stamped,
                        format!("{stamps_added} stamp(s) added for {customer_name} ({current_stamps}/{total_slots})"),
                        SoundCue::Success,
                    )
                };
                let note = self.note(&business_id, &card_id, kind, message);
                let notification = StampNotification {
                    customer_name,
                    business_name,
                    current_stamps,
                    total_slots,
                    is_completed,
                };
                futures::join!(
                    isolate("activity_note", self.activity.record(note)),
                    isolate("stamp_notification", self.push_stamp(customer_id, notification)),
                    isolate("sound", self.play(cue)),
                );
            },
            LoyaltyEvent::RewardRedeemed {
                card_id,
                customer_id,
                business_id,
                business_name,
                business_owner_id,
                note,
            } => {
                let activity = self.note(&business_id, &card_id, ActivityKind::Redeemed, note);
                futures::join!(
                    isolate("activity_note", self.activity.record(activity)),
                    isolate(
                        "redemption_notification",
                        self.push_redemption(customer_id, business_name.clone())
                    ),
                    isolate(
                        "owner_notification",
                        self.push_redemption(business_owner_id, business_name)
                    ),
                    isolate("sound", self.play(SoundCue::Completion)),
                );
            },
            LoyaltyEvent::CardDeleted {
                card_id,
                business_id,
                code,
            } => {
                let message = format!("Card with code {code} was deleted by its holder");
                let note = self.note(&business_id, &card_id, ActivityKind::CardDeleted, message);
                isolate("activity_note", self.activity.record(note)).await;
            },
        }
    }
}

/// Await one effect, logging and counting its failure or panic.
async fn isolate<F>(effect: &'static str, future: F)
where
    F: Future<Output = ProviderResult<()>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => {},
        Ok(Err(error)) => {
            tracing::warn!(effect, error = %error, "Side effect failed");
            ProtocolMetrics::record_side_effect_failure(effect);
        },
        Err(_) => {
            tracing::error!(effect, "Side effect panicked");
            ProtocolMetrics::record_side_effect_failure(effect);
        },
    }
}

impl EventHandler<LoyaltyEvent> for SideEffects {
    fn handle(&self, event: LoyaltyEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tracing::debug!(event = event.name(), card_id = %event.card_id(), "Running side effects");
            self.dispatch(event).await;
        })
    }
}
