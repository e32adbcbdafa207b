//! Published state: what observers see.
//!
//! Each list is a single latest value with replace-on-write semantics
//! (`tokio::sync::watch`). Observers hold a receiver, read the current value
//! at any time, and wait for changes; intermediate values may be skipped.
//! External deletes are discrete notifications and go through a
//! `broadcast` channel instead.

use chrono::FixedOffset;
use sync_core::{group_by_day, DaySection};
use sync_types::{Channel, ChannelId, Message};
use tokio::sync::{broadcast, watch};

/// The message list of the active session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageList {
    /// Channel of the active session, `None` when no session is open.
    pub channel_id: Option<ChannelId>,
    /// Messages, oldest first.
    pub messages: Vec<Message>,
    /// The same messages grouped by calendar day, newest day first.
    pub sections: Vec<DaySection>,
}

impl MessageList {
    /// Build the list for a channel, computing its day sections.
    pub fn new(channel_id: ChannelId, messages: Vec<Message>, offset: FixedOffset) -> Self {
        let sections = group_by_day(&messages, offset);
        Self {
            channel_id: Some(channel_id),
            messages,
            sections,
        }
    }

    /// The list published when no session is open.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if this list belongs to `channel_id`.
    pub fn is_for(&self, channel_id: &ChannelId) -> bool {
        self.channel_id.as_ref() == Some(channel_id)
    }
}

/// Holder of all published values.
#[derive(Debug)]
pub struct PublishedState {
    channels: watch::Sender<Vec<Channel>>,
    messages: watch::Sender<MessageList>,
    external_deletes: broadcast::Sender<ChannelId>,
}

impl PublishedState {
    /// Create empty published state.
    ///
    /// `delete_capacity` is how many external-delete notifications a slow
    /// receiver may fall behind before it starts missing them.
    pub fn new(delete_capacity: usize) -> Self {
        let (external_deletes, _) = broadcast::channel(delete_capacity.max(1));
        Self {
            channels: watch::Sender::new(Vec::new()),
            messages: watch::Sender::new(MessageList::empty()),
            external_deletes,
        }
    }

    /// Observe the channel list.
    pub fn channels(&self) -> watch::Receiver<Vec<Channel>> {
        self.channels.subscribe()
    }

    /// Observe the active message list.
    pub fn messages(&self) -> watch::Receiver<MessageList> {
        self.messages.subscribe()
    }

    /// Observe external deletes.
    pub fn external_deletes(&self) -> broadcast::Receiver<ChannelId> {
        self.external_deletes.subscribe()
    }

    /// Replace the channel list and notify, even if unchanged.
    pub fn seed_channels(&self, channels: Vec<Channel>) {
        self.channels.send_replace(channels);
    }

    /// Replace the channel list; notify only if it changed.
    ///
    /// Returns true if observers were notified.
    pub fn publish_channels(&self, channels: Vec<Channel>) -> bool {
        self.channels.send_if_modified(|current| {
            if *current == channels {
                return false;
            }
            *current = channels;
            true
        })
    }

    /// Replace the message list; notify only if it changed.
    ///
    /// Returns true if observers were notified.
    pub fn publish_messages(&self, list: MessageList) -> bool {
        self.messages.send_if_modified(|current| {
            if *current == list {
                return false;
            }
            *current = list;
            true
        })
    }

    /// Fire the external-delete notification.
    ///
    /// Returns the number of receivers it reached.
    pub fn notify_external_delete(&self, id: ChannelId) -> usize {
        self.external_deletes.send(id).unwrap_or(0)
    }
}
