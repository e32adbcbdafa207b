//! Mock event source for testing.
//!
//! Fans emitted events out to every live subscription and lets tests
//! simulate refused subscriptions, drops, and delivery failures.

use super::{EventSink, EventSource, Subscription};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use sync_types::{ChannelEvent, EventStreamError};
use tokio::sync::watch;

/// Mock event source. `Clone` shares the same state.
#[derive(Debug)]
pub struct MockEventSource {
    inner: Arc<MockEventSourceInner>,
}

#[derive(Debug)]
struct MockEventSourceInner {
    state: Mutex<MockState>,
    /// Successful subscriptions so far.
    subscribed: watch::Sender<usize>,
}

#[derive(Debug, Default)]
struct MockState {
    sinks: Vec<EventSink>,
    fail_next_subscribe: VecDeque<EventStreamError>,
    attempts: usize,
}

impl Default for MockEventSource {
    fn default() -> Self {
        Self {
            inner: Arc::new(MockEventSourceInner {
                state: Mutex::new(MockState::default()),
                subscribed: watch::Sender::new(0),
            }),
        }
    }
}

impl MockEventSource {
    /// Create a source with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every live subscription.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn emit(&self, event: ChannelEvent) -> usize {
        let mut state = self.inner.state.lock().unwrap();
        state.sinks.retain(|sink| !sink.is_closed());
        state
            .sinks
            .iter()
            .filter(|sink| sink.send(event.clone()))
            .count()
    }

    /// Cause the next `subscribe()` to fail. Failures queue up.
    pub fn fail_next_subscribe(&self, error: EventStreamError) {
        let mut state = self.inner.state.lock().unwrap();
        state.fail_next_subscribe.push_back(error);
    }

    /// End every live subscription, as a dropped connection would.
    pub fn disconnect_all(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.sinks.clear();
    }

    /// Deliver `error` to every live subscription, then end them.
    pub fn fail_all(&self, error: EventStreamError) {
        let mut state = self.inner.state.lock().unwrap();
        for sink in state.sinks.drain(..) {
            sink.fail(error.clone());
        }
    }

    /// Number of subscriptions that have not been cancelled or dropped.
    pub fn active_subscribers(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state.sinks.iter().filter(|sink| !sink.is_closed()).count()
    }

    /// Number of `subscribe()` calls, failed ones included.
    pub fn subscribe_attempts(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state.attempts
    }

    /// Number of successful `subscribe()` calls.
    pub fn subscriptions(&self) -> usize {
        *self.inner.subscribed.borrow()
    }

    /// Wait until at least `count` subscriptions have succeeded.
    pub async fn wait_for_subscriptions(&self, count: usize) {
        let mut rx = self.inner.subscribed.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|&n| n >= count).await;
    }
}

impl Clone for MockEventSource {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn subscribe(&self) -> Result<Subscription, EventStreamError> {
        let subscription = {
            let mut state = self.inner.state.lock().unwrap();
            state.attempts += 1;

            if let Some(error) = state.fail_next_subscribe.pop_front() {
                return Err(error);
            }

            let (sink, subscription) = Subscription::channel();
            state.sinks.push(sink);
            subscription
        };
        self.inner.subscribed.send_modify(|n| *n += 1);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_fans_out_to_all_subscribers() {
        let source = MockEventSource::new();
        let mut a = source.subscribe().await.unwrap();
        let mut b = source.subscribe().await.unwrap();

        assert_eq!(source.emit(ChannelEvent::add("1")), 2);

        assert_eq!(a.next().await, Some(Ok(ChannelEvent::add("1"))));
        assert_eq!(b.next().await, Some(Ok(ChannelEvent::add("1"))));
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let source = MockEventSource::new();
        assert_eq!(source.emit(ChannelEvent::add("early")), 0);

        let mut sub = source.subscribe().await.unwrap();
        source.emit(ChannelEvent::add("late"));

        assert_eq!(sub.next().await, Some(Ok(ChannelEvent::add("late"))));
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_receiving() {
        let source = MockEventSource::new();
        let mut sub = source.subscribe().await.unwrap();
        sub.cancel();

        assert_eq!(source.emit(ChannelEvent::add("1")), 0);
        assert_eq!(source.active_subscribers(), 0);
    }

    #[tokio::test]
    async fn forced_subscribe_failure() {
        let source = MockEventSource::new();
        source.fail_next_subscribe(EventStreamError::Subscribe("refused".into()));

        assert!(source.subscribe().await.is_err());
        assert!(source.subscribe().await.is_ok());
        assert_eq!(source.subscribe_attempts(), 2);
        assert_eq!(source.subscriptions(), 1);
    }

    #[tokio::test]
    async fn disconnect_ends_streams() {
        let source = MockEventSource::new();
        let mut sub = source.subscribe().await.unwrap();

        source.disconnect_all();

        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn fail_all_delivers_error_then_ends() {
        let source = MockEventSource::new();
        let mut sub = source.subscribe().await.unwrap();

        source.fail_all(EventStreamError::Delivery("reset".into()));

        assert!(matches!(sub.next().await, Some(Err(_))));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn wait_for_subscriptions_returns_once_reached() {
        let source = MockEventSource::new();
        let waiter = {
            let source = source.clone();
            tokio::spawn(async move { source.wait_for_subscriptions(1).await })
        };

        let _sub = source.subscribe().await.unwrap();
        waiter.await.unwrap();
    }
}
