//! Collaborators the protocol talks to after a commit.
//!
//! Push delivery, sound playback and sign-in are provided by the host
//! application. The protocol only sees these traits; the store-backed and
//! log-backed implementations below are what the demo binary and the tests
//! run with.

use crate::model::{ActivityNote, UserProfile};
use crate::paths;
use futures::future::BoxFuture;
use stampcard_core::document::Fields;
use stampcard_core::environment::IdGenerator;
use stampcard_core::error::StoreError;
use stampcard_core::ids::UserId;
use stampcard_core::store::DocumentStore;
use std::sync::Arc;
use thiserror::Error;

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failure of an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The push service rejected or failed the delivery.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// Audio could not be played.
    #[error("Sound playback failed: {0}")]
    Playback(String),

    /// A store read or write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Payload of a stamp or completion push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampNotification {
    /// Card holder's display name.
    pub customer_name: String,
    /// Business that granted the stamp.
    pub business_name: String,
    /// Stamps on the card after the grant.
    pub current_stamps: u32,
    /// Slots of the program.
    pub total_slots: u32,
    /// Whether the card is now full.
    pub is_completed: bool,
}

impl StampNotification {
    /// Notification title.
    #[must_use]
    pub fn title(&self) -> String {
        if self.is_completed {
            "Reward unlocked!".to_string()
        } else {
            format!("New stamp from {}", self.business_name)
        }
    }

    /// Notification body.
    #[must_use]
    pub fn body(&self) -> String {
        if self.is_completed {
            format!(
                "{}, your card at {} is complete. Show it to claim your reward.",
                self.customer_name, self.business_name
            )
        } else {
            format!("You now have {} of {} stamps.", self.current_stamps, self.total_slots)
        }
    }
}

/// Push notification delivery.
pub trait Notifier: Send + Sync {
    /// Tell a customer their card was stamped (or completed).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Delivery`] if the push could not be sent.
    fn send_stamp_notification(
        &self,
        token: String,
        notification: StampNotification,
    ) -> BoxFuture<'_, ProviderResult<()>>;

    /// Tell a user a reward was redeemed.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Delivery`] if the push could not be sent.
    fn send_redemption_notification(&self, token: String, business_name: String)
    -> BoxFuture<'_, ProviderResult<()>>;
}

/// Lookup of push tokens.
pub trait NotificationDirectory: Send + Sync {
    /// Push token of a user, `None` if they have no registered device.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn push_token(&self, user_id: UserId) -> BoxFuture<'_, ProviderResult<Option<String>>>;
}

/// Audible feedback on the merchant's device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    /// A stamp was granted.
    Success,
    /// A card was completed or redeemed.
    Completion,
}

/// Sound playback.
pub trait SoundPlayer: Send + Sync {
    /// Play a cue.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Playback`] if the cue could not be played.
    fn play(&self, cue: SoundCue) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Merchant-facing audit trail.
pub trait ActivityLog: Send + Sync {
    /// Append a note.
    ///
    /// # Errors
    ///
    /// Returns an error if the note could not be stored.
    fn record(&self, note: ActivityNote) -> BoxFuture<'_, ProviderResult<()>>;
}

/// The signed-in user, as reported by the identity provider.
pub trait Identity: Send + Sync {
    /// Current user, `None` when signed out.
    fn current_user_id(&self) -> Option<UserId>;
}

// ============================================================================
// Store-backed implementations
// ============================================================================

/// Reads push tokens from user profiles.
#[derive(Clone)]
pub struct StoreNotificationDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreNotificationDirectory {
    /// Directory over `users/{id}` profiles.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create or replace a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn register(&self, profile: &UserProfile) -> ProviderResult<()> {
        let fields = Fields::from_serializable(profile)?;
        self.store.set(&paths::user(&profile.id), fields).await?;
        Ok(())
    }
}

impl NotificationDirectory for StoreNotificationDirectory {
    fn push_token(&self, user_id: UserId) -> BoxFuture<'_, ProviderResult<Option<String>>> {
        Box::pin(async move {
            let Some(document) = self.store.get(&paths::user(&user_id)).await? else {
                return Ok(None);
            };
            let profile: UserProfile = document.decode()?;
            Ok(profile.push_token.filter(|token| !token.is_empty()))
        })
    }
}

/// Writes activity notes to their own collection, outside any transaction.
#[derive(Clone)]
pub struct StoreActivityLog {
    store: Arc<dyn DocumentStore>,
    ids: Arc<dyn IdGenerator>,
}

impl StoreActivityLog {
    /// Log writing to `activityNotes`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, ids }
    }
}

impl ActivityLog for StoreActivityLog {
    fn record(&self, note: ActivityNote) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            let path = paths::activity_note(&self.ids.next_id());
            self.store.set(&path, Fields::from_serializable(&note)?).await?;
            Ok(())
        })
    }
}

// ============================================================================
// Log-only implementations
// ============================================================================

/// Notifier that only logs; used where no push service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_stamp_notification(
        &self,
        token: String,
        notification: StampNotification,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            tracing::info!(
                token = %token,
                title = %notification.title(),
                body = %notification.body(),
                "Push notification"
            );
            Ok(())
        })
    }

    fn send_redemption_notification(
        &self,
        token: String,
        business_name: String,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            tracing::info!(token = %token, business = %business_name, "Redemption notification");
            Ok(())
        })
    }
}

/// Sound player that logs each cue.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSoundPlayer;

impl SoundPlayer for LogSoundPlayer {
    fn play(&self, cue: SoundCue) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            tracing::debug!(?cue, "Playing sound");
            Ok(())
        })
    }
}

/// Identity pinned at construction.
#[derive(Debug, Clone, Default)]
pub struct FixedIdentity(Option<UserId>);

impl FixedIdentity {
    /// Signed in as `user_id`.
    #[must_use]
    pub const fn signed_in(user_id: UserId) -> Self {
        Self(Some(user_id))
    }

    /// Nobody signed in.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self(None)
    }
}

impl Identity for FixedIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.0.clone()
    }
}
