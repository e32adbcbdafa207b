//! Local store for channels and messages.
//!
//! The store is the engine's source of truth for what gets published. Writes
//! are expressed as [`StoreWrite`] batches; one call to [`LocalStore::apply`]
//! is one transaction.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_types::{Channel, ChannelId, Message};

/// One write against the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// Insert the channel, or update `logo_url`, `last_message` and
    /// `last_activity` of the stored one. The stored name and messages are kept.
    UpsertChannel(Channel),
    /// Insert the message unless the channel already holds one with the same
    /// timestamp. Dropped if the channel is not stored.
    UpsertMessage {
        /// Owning channel.
        channel_id: ChannelId,
        /// The message.
        message: Message,
    },
    /// Set the channel's preview if `at` is newer than its `last_activity`.
    UpdatePreview {
        /// Channel to update.
        channel_id: ChannelId,
        /// Preview text.
        text: String,
        /// Activity timestamp of the preview.
        at: DateTime<Utc>,
    },
    /// Remove the channel and all of its messages.
    DeleteChannel(ChannelId),
}

/// Row counts of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored channels.
    pub channels: u64,
    /// Number of stored messages across all channels.
    pub messages: u64,
}

/// Durable keyed storage for channels and their messages.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All channels, newest activity first.
    ///
    /// Channels without activity come last; ties are ordered by id.
    async fn fetch_channels(&self) -> StorageResult<Vec<Channel>>;

    /// A single channel, if stored.
    async fn fetch_channel(&self, id: &ChannelId) -> StorageResult<Option<Channel>>;

    /// The messages of a channel, oldest first. Empty if the channel is unknown.
    async fn fetch_messages(&self, channel_id: &ChannelId) -> StorageResult<Vec<Message>>;

    /// Apply a batch of writes in one transaction.
    async fn apply(&self, writes: Vec<StoreWrite>) -> StorageResult<()>;

    /// Row counts.
    async fn stats(&self) -> StorageResult<StoreStats>;

    /// Insert or update one channel.
    async fn upsert_channel(&self, channel: Channel) -> StorageResult<()> {
        self.apply(vec![StoreWrite::UpsertChannel(channel)]).await
    }

    /// Insert one message unless it is a duplicate.
    async fn upsert_message(&self, channel_id: &ChannelId, message: Message) -> StorageResult<()> {
        self.apply(vec![StoreWrite::UpsertMessage {
            channel_id: channel_id.clone(),
            message,
        }])
        .await
    }

    /// Delete one channel and its messages.
    async fn delete_channel(&self, id: &ChannelId) -> StorageResult<()> {
        self.apply(vec![StoreWrite::DeleteChannel(id.clone())]).await
    }
}
