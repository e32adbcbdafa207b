//! Request generations for remote fetches.
//!
//! Remote calls cannot be cancelled once issued, so two fetches for the same
//! resource may complete out of order. Each fetch takes a [`Ticket`] when it
//! starts; when it completes, its result is applied only if the ticket is
//! still the newest one for that key. An older response that arrives after a
//! newer fetch was started is discarded.
//!
//! A channel list response is never discarded because of a local delete.
//! Instead each delete is stamped with a sequence number, and the channels
//! deleted after a list ticket was issued are filtered out of that list.

use std::collections::HashMap;
use sync_types::ChannelId;

/// What a fetch is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchKey {
    /// The full channel list.
    ChannelList,
    /// A single channel's record.
    Channel(ChannelId),
    /// A single channel's message list.
    Messages(ChannelId),
}

/// Proof that a fetch was started at a given generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: FetchKey,
    generation: u64,
    /// Delete sequence number when the ticket was issued.
    deletes_seen: u64,
}

impl Ticket {
    /// The key this ticket was issued for.
    pub fn key(&self) -> &FetchKey {
        &self.key
    }
}

/// Tracks the newest generation per fetch key, and local deletes.
#[derive(Debug, Clone, Default)]
pub struct FetchGenerations {
    latest: HashMap<FetchKey, u64>,
    /// Sequence number of the most recent local delete.
    delete_seq: u64,
    /// channel id -> sequence number of its most recent local delete
    deleted: HashMap<ChannelId, u64>,
}

impl FetchGenerations {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch for `key`, superseding any fetch already in flight.
    pub fn begin(&mut self, key: FetchKey) -> Ticket {
        let generation = self.bump(&key);
        Ticket {
            key,
            generation,
            deletes_seen: self.delete_seq,
        }
    }

    /// True if no newer fetch for the same key was started since `ticket`.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest.get(&ticket.key) == Some(&ticket.generation)
    }

    /// Invalidate every in-flight fetch of the channel itself.
    ///
    /// Used when the channel is deleted locally, so a fetch that was started
    /// before the delete cannot bring the channel back. Channel list fetches
    /// stay current; use [`deleted_since`](Self::deleted_since) to drop the
    /// channel from their payload.
    pub fn invalidate_channel(&mut self, id: &ChannelId) {
        self.bump(&FetchKey::Channel(id.clone()));
        self.bump(&FetchKey::Messages(id.clone()));
        self.delete_seq += 1;
        self.deleted.insert(id.clone(), self.delete_seq);
    }

    /// True if the channel was deleted locally after `ticket` was issued.
    pub fn deleted_since(&self, ticket: &Ticket, id: &ChannelId) -> bool {
        self.deleted
            .get(id)
            .is_some_and(|&seq| seq > ticket.deletes_seen)
    }

    fn bump(&mut self, key: &FetchKey) -> u64 {
        let entry = self.latest.entry(key.clone()).or_insert(0);
        *entry += 1;
        *entry
    }
}
