//! In-memory store backend.
//!
//! Channels are keyed by id. Messages live in an arena of slots, indexed by
//! their [`MessageKey`]; the index is ordered by channel then timestamp, so a
//! channel's messages are one contiguous range and deleting a channel frees
//! exactly its own slots.

use super::{LocalStore, StoreStats, StoreWrite};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::sync::{Arc, RwLock};
use sync_core::{is_newer, sort_channels};
use sync_types::{to_millis_precision, Channel, ChannelId, Message, MessageKey};

/// Arena-backed local store. `Clone` shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Arena>>,
}

#[derive(Default)]
struct Arena {
    channels: HashMap<ChannelId, Channel>,
    slots: Vec<Option<Message>>,
    free: Vec<usize>,
    index: BTreeMap<MessageKey, usize>,
}

fn channel_range(channel_id: &ChannelId) -> RangeInclusive<MessageKey> {
    MessageKey {
        channel_id: channel_id.clone(),
        timestamp_millis: i64::MIN,
    }..=MessageKey {
        channel_id: channel_id.clone(),
        timestamp_millis: i64::MAX,
    }
}

impl Arena {
    fn write(&mut self, write: StoreWrite) {
        match write {
            StoreWrite::UpsertChannel(mut channel) => {
                channel.last_activity = channel.last_activity.map(to_millis_precision);
                match self.channels.get_mut(&channel.id) {
                    Some(stored) => {
                        stored.logo_url = channel.logo_url;
                        stored.last_message = channel.last_message;
                        stored.last_activity = channel.last_activity;
                    }
                    None => {
                        self.channels.insert(channel.id.clone(), channel);
                    }
                }
            }
            StoreWrite::UpsertMessage {
                channel_id,
                mut message,
            } => {
                if !self.channels.contains_key(&channel_id) {
                    return;
                }
                message.timestamp = to_millis_precision(message.timestamp);
                let key = message.key(&channel_id);
                if self.index.contains_key(&key) {
                    return;
                }
                let slot = match self.free.pop() {
                    Some(slot) => {
                        self.slots[slot] = Some(message);
                        slot
                    }
                    None => {
                        self.slots.push(Some(message));
                        self.slots.len() - 1
                    }
                };
                self.index.insert(key, slot);
            }
            StoreWrite::UpdatePreview {
                channel_id,
                text,
                at,
            } => {
                let at = to_millis_precision(at);
                if let Some(channel) = self.channels.get_mut(&channel_id) {
                    if is_newer(at, channel.last_activity) {
                        channel.last_message = Some(text);
                        channel.last_activity = Some(at);
                    }
                }
            }
            StoreWrite::DeleteChannel(id) => {
                self.channels.remove(&id);
                let keys: Vec<MessageKey> = self
                    .index
                    .range(channel_range(&id))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in keys {
                    if let Some(slot) = self.index.remove(&key) {
                        self.slots[slot] = None;
                        self.free.push(slot);
                    }
                }
            }
        }
    }

    fn messages(&self, channel_id: &ChannelId) -> Vec<Message> {
        self.index
            .range(channel_range(channel_id))
            .filter_map(|(_, &slot)| self.slots.get(slot).cloned().flatten())
            .collect()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Arena) -> T) -> StorageResult<T> {
        let arena = self.inner.read().map_err(|_| poisoned())?;
        Ok(f(&arena))
    }
}

fn poisoned() -> StorageError {
    StorageError::Corrupt("memory store lock poisoned".to_string())
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn fetch_channels(&self) -> StorageResult<Vec<Channel>> {
        let mut channels = self.read(|arena| arena.channels.values().cloned().collect::<Vec<_>>())?;
        sort_channels(&mut channels);
        Ok(channels)
    }

    async fn fetch_channel(&self, id: &ChannelId) -> StorageResult<Option<Channel>> {
        self.read(|arena| arena.channels.get(id).cloned())
    }

    async fn fetch_messages(&self, channel_id: &ChannelId) -> StorageResult<Vec<Message>> {
        self.read(|arena| arena.messages(channel_id))
    }

    async fn apply(&self, writes: Vec<StoreWrite>) -> StorageResult<()> {
        let mut arena = self.inner.write().map_err(|_| poisoned())?;
        for write in writes {
            arena.write(write);
        }
        Ok(())
    }

    async fn stats(&self) -> StorageResult<StoreStats> {
        self.read(|arena| StoreStats {
            channels: arena.channels.len() as u64,
            messages: arena.index.len() as u64,
        })
    }
}
