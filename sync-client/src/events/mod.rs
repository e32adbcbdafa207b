//! Realtime event stream abstraction.
//!
//! An [`EventSource`] hands out [`Subscription`]s: ordered, unbounded,
//! cancellable sequences of [`ChannelEvent`]s. Each subscription is
//! independent; a new one after a cancel or a drop replays nothing.
//!
//! Backends push into a subscription through its [`EventSink`]:
//!
//! ```ignore
//! let (sink, mut subscription) = Subscription::channel();
//! sink.send(ChannelEvent::add("general"));
//! assert_eq!(subscription.next().await, Some(Ok(ChannelEvent::add("general"))));
//! ```

mod mock;

pub use mock::MockEventSource;

use async_trait::async_trait;
use sync_types::{ChannelEvent, EventStreamError};
use tokio::sync::mpsc;

type Item = Result<ChannelEvent, EventStreamError>;

/// Source of event subscriptions.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new subscription.
    async fn subscribe(&self) -> Result<Subscription, EventStreamError>;
}

/// Consumer half of one subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Item>,
    cancelled: bool,
}

impl Subscription {
    /// Create a connected sink/subscription pair.
    pub fn channel() -> (EventSink, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventSink { tx },
            Subscription {
                rx,
                cancelled: false,
            },
        )
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the producer is gone or the subscription was
    /// cancelled. An `Err` item reports a delivery failure; the producer
    /// normally closes the stream right after it.
    pub async fn next(&mut self) -> Option<Result<ChannelEvent, EventStreamError>> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Tear down the subscription. Nothing is delivered afterwards, including
    /// events the producer already queued.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.rx.close();
    }

    /// True after [`cancel`](Self::cancel).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Producer half of one subscription.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Item>,
}

impl EventSink {
    /// Deliver an event. Returns false if the subscription is gone.
    pub fn send(&self, event: ChannelEvent) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    /// Deliver a failure. Returns false if the subscription is gone.
    pub fn fail(&self, error: EventStreamError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// True once the subscription was cancelled or dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
