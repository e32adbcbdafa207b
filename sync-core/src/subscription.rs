//! Event subscription state machine for chatsync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of the realtime event subscription. The state machine takes
//! events as input and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (subscribing, reading events, sleeping) is performed by
//! sync-client, not by this module.

use std::time::Duration;

/// Reconnection policy for the event subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnect after a failed subscribe or a dropped stream.
    pub enabled: bool,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound of the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every delay.
    pub max_jitter: Duration,
    /// Give up after this many consecutive failed attempts (`None` = never).
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// A policy that never reconnects: one subscription, stop on drop.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether retry number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Formula: min(max_delay, base_delay * 2^(attempt-1)) + random(0..=max_jitter)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        base + random_jitter(self.max_jitter)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

/// Subscription state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not started.
    Idle,
    /// Subscribe call in progress.
    Subscribing {
        /// Retry number of this attempt (0 = first subscribe).
        attempt: u32,
    },
    /// Subscribed and consuming events.
    Live,
    /// Waiting for the retry timer.
    Waiting {
        /// Retry number the timer will start.
        attempt: u32,
    },
    /// Cancelled or given up. Terminal.
    Stopped,
}

impl SubscriptionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function apart from the jitter in retry delays.
    pub fn on_event(
        self,
        event: SubscriptionEvent,
        policy: &ReconnectPolicy,
    ) -> (Self, Vec<SubscriptionAction>) {
        match (self, event) {
            // Cancel wins from any non-terminal state
            (Self::Stopped, _) => (Self::Stopped, vec![]),
            (_, SubscriptionEvent::Cancel) => (Self::Stopped, vec![SubscriptionAction::Stop]),

            (Self::Idle, SubscriptionEvent::Start) => (
                Self::Subscribing { attempt: 0 },
                vec![SubscriptionAction::Subscribe],
            ),

            (Self::Subscribing { .. }, SubscriptionEvent::Subscribed) => (
                Self::Live,
                vec![SubscriptionAction::Consume],
            ),
            (Self::Subscribing { attempt }, SubscriptionEvent::SubscribeFailed { .. }) => {
                retry_or_stop(attempt.saturating_add(1), policy)
            }

            (Self::Live, SubscriptionEvent::StreamEnded { .. }) => retry_or_stop(1, policy),

            (Self::Waiting { attempt }, SubscriptionEvent::RetryTimer) => (
                Self::Subscribing { attempt },
                vec![SubscriptionAction::Subscribe],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if events are currently being consumed.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Check if the machine reached its terminal state.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_or_stop(
    attempt: u32,
    policy: &ReconnectPolicy,
) -> (SubscriptionState, Vec<SubscriptionAction>) {
    if policy.allows(attempt) {
        (
            SubscriptionState::Waiting { attempt },
            vec![SubscriptionAction::ScheduleRetry {
                attempt,
                delay: policy.delay_for(attempt),
            }],
        )
    } else {
        (SubscriptionState::Stopped, vec![SubscriptionAction::Stop])
    }
}

/// Events that can occur in the subscription lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// The engine started.
    Start,
    /// The subscribe call succeeded.
    Subscribed,
    /// The subscribe call failed.
    SubscribeFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// A live stream ended or failed.
    StreamEnded {
        /// Reason the stream ended.
        reason: String,
    },
    /// The retry timer fired.
    RetryTimer,
    /// The engine is shutting down.
    Cancel,
}

/// Actions to be executed by the sync-client event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Call `subscribe()` on the event source.
    Subscribe,
    /// Read events from the current subscription until it ends.
    Consume,
    /// Sleep, then deliver [`SubscriptionEvent::RetryTimer`].
    ScheduleRetry {
        /// Retry number that will run after the delay.
        attempt: u32,
        /// How long to wait.
        delay: Duration,
    },
    /// Leave the event loop.
    Stop,
}

/// Random jitter between zero and `max` (inclusive, millisecond resolution).
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => Duration::from_millis(u64::from_le_bytes(bytes) % (max_ms + 1)),
        Err(_) => Duration::ZERO,
    }
}
