//! Recording collaborators for tests and local runs.

use crate::model::ActivityNote;
use crate::providers::{
    ActivityLog, NotificationDirectory, Notifier, ProviderError, ProviderResult, SoundCue, SoundPlayer,
    StampNotification,
};
use futures::future::BoxFuture;
use stampcard_core::ids::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

fn push<T>(log: &Mutex<Vec<T>>, item: T) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(item);
}

fn read<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// A push that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    /// Stamp or completion push.
    Stamp {
        /// Device token.
        token: String,
        /// Payload.
        notification: StampNotification,
    },
    /// Redemption push.
    Redemption {
        /// Device token.
        token: String,
        /// Business display name.
        business_name: String,
    },
}

/// Notifier that remembers every push.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        read(&self.sent)
    }
}

impl Notifier for RecordingNotifier {
    fn send_stamp_notification(
        &self,
        token: String,
        notification: StampNotification,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        push(&self.sent, SentNotification::Stamp { token, notification });
        Box::pin(async { Ok(()) })
    }

    fn send_redemption_notification(
        &self,
        token: String,
        business_name: String,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        push(&self.sent, SentNotification::Redemption { token, business_name });
        Box::pin(async { Ok(()) })
    }
}

/// Notifier whose every delivery fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send_stamp_notification(&self, _token: String, _notification: StampNotification) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async { Err(ProviderError::Delivery("push service unreachable".into())) })
    }

    fn send_redemption_notification(&self, _token: String, _business_name: String) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async { Err(ProviderError::Delivery("push service unreachable".into())) })
    }
}

/// Directory backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    tokens: HashMap<UserId, String>,
}

impl StaticDirectory {
    /// Directory with no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a user.
    #[must_use]
    pub fn with_token(mut self, user_id: impl Into<UserId>, token: impl Into<String>) -> Self {
        self.tokens.insert(user_id.into(), token.into());
        self
    }
}

impl NotificationDirectory for StaticDirectory {
    fn push_token(&self, user_id: UserId) -> BoxFuture<'_, ProviderResult<Option<String>>> {
        let token = self.tokens.get(&user_id).cloned();
        Box::pin(async move { Ok(token) })
    }
}

/// Sound player that remembers every cue.
#[derive(Debug, Clone, Default)]
pub struct RecordingSoundPlayer {
    played: Arc<Mutex<Vec<SoundCue>>>,
}

impl RecordingSoundPlayer {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cues played so far.
    #[must_use]
    pub fn played(&self) -> Vec<SoundCue> {
        read(&self.played)
    }
}

impl SoundPlayer for RecordingSoundPlayer {
    fn play(&self, cue: SoundCue) -> BoxFuture<'_, ProviderResult<()>> {
        push(&self.played, cue);
        Box::pin(async { Ok(()) })
    }
}

/// Activity log kept in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingActivityLog {
    notes: Arc<Mutex<Vec<ActivityNote>>>,
}

impl RecordingActivityLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes recorded so far.
    #[must_use]
    pub fn notes(&self) -> Vec<ActivityNote> {
        read(&self.notes)
    }
}

impl ActivityLog for RecordingActivityLog {
    fn record(&self, note: ActivityNote) -> BoxFuture<'_, ProviderResult<()>> {
        push(&self.notes, note);
        Box::pin(async { Ok(()) })
    }
}
