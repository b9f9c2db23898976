//! Post-commit event dispatch.
//!
//! Services emit domain events after a transaction has committed and move on;
//! a separate [`Dispatcher`] task feeds them to an [`EventHandler`] that
//! performs side effects (notifications, sound cues, audit notes). Handler
//! failures never reach the code that emitted the event. Each event is
//! handled in its own task, so a panicking handler costs that one event and
//! the dispatcher keeps draining the queue.
//!
//! The queue is bounded. When it is full, [`EventSink::emit`] drops the event
//! with a warning instead of back-pressuring the committed operation.
//!
//! # Example
//!
//! ```rust
//! use futures::future::BoxFuture;
//! use stampcard_runtime::dispatcher::{self, EventHandler};
//!
//! struct Print;
//!
//! impl EventHandler<String> for Print {
//!     fn handle(&self, event: String) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { println!("{event}") })
//!     }
//! }
//!
//! # async fn example() {
//! let (sink, dispatcher) = dispatcher::channel(16, Print);
//! let task = dispatcher.spawn();
//! sink.emit("card enrolled".to_string());
//! drop(sink);
//! task.await.ok();
//! # }
//! ```

use futures::future::BoxFuture;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Consumer of dispatched events.
///
/// Implementations handle their own failures; the dispatcher only awaits the
/// returned future.
pub trait EventHandler<E>: Send + Sync + 'static {
    /// Handle one event.
    fn handle(&self, event: E) -> BoxFuture<'_, ()>;
}

impl<E, H: EventHandler<E> + ?Sized> EventHandler<E> for Arc<H> {
    fn handle(&self, event: E) -> BoxFuture<'_, ()> {
        (**self).handle(event)
    }
}

/// Cloneable producer half of the dispatch queue.
#[derive(Debug)]
pub struct EventSink<E> {
    sender: mpsc::Sender<E>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E: Send + 'static> EventSink<E> {
    /// A sink with no dispatcher behind it; every event is discarded.
    #[must_use]
    pub fn disconnected() -> Self {
        let (sender, _receiver) = mpsc::channel(1);
        Self { sender }
    }

    /// Queue an event without waiting.
    ///
    /// Returns `false` if the event was dropped because the queue is full or
    /// the dispatcher has stopped.
    pub fn emit(&self, event: E) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Dispatch queue full, dropping event");
                counter!("stampcard_events_dropped_total").increment(1);
                false
            },
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("No dispatcher running, discarding event");
                false
            },
        }
    }
}

/// Consumer half of the dispatch queue.
pub struct Dispatcher<E> {
    receiver: mpsc::Receiver<E>,
    handler: Arc<dyn EventHandler<E>>,
}

impl<E> std::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Create a bounded dispatch queue feeding `handler`.
///
/// A capacity of zero is raised to one.
#[must_use]
pub fn channel<E, H>(capacity: usize, handler: H) -> (EventSink<E>, Dispatcher<E>)
where
    E: Send + 'static,
    H: EventHandler<E>,
{
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        EventSink { sender },
        Dispatcher {
            receiver,
            handler: Arc::new(handler),
        },
    )
}

impl<E: Send + 'static> Dispatcher<E> {
    /// Handle events in emission order until every sink has been dropped.
    ///
    /// Every event runs in a spawned task that is awaited before the next
    /// one starts. A handler panic is logged and counted, and the event is
    /// still included in the returned count of dispatched events.
    pub async fn run(mut self) -> u64 {
        let mut handled = 0_u64;
        while let Some(event) = self.receiver.recv().await {
            let handler = Arc::clone(&self.handler);
            if let Err(e) = tokio::spawn(async move { handler.handle(event).await }).await {
                tracing::error!(error = %e, "Event handler panicked, continuing with the next event");
                counter!("stampcard_handler_panics_total").increment(1);
            }
            handled += 1;
        }
        tracing::debug!(handled, "Dispatcher stopped");
        handled
    }

    /// Run the dispatcher on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }
}
