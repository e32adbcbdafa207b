//! Realtime change notifications.
//!
//! Events are invalidation signals only: they name a resource and what
//! happened to it, never the resource's new contents.

use crate::model::ChannelId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A channel was created.
    Add,
    /// A channel (or its message list) changed.
    Update,
    /// A channel was removed.
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Add => f.write_str("add"),
            EventKind::Update => f.write_str("update"),
            EventKind::Delete => f.write_str("delete"),
        }
    }
}

/// A change notification for one channel resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Kind of change.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Affected channel.
    #[serde(rename = "resourceId")]
    pub resource_id: ChannelId,
}

impl ChannelEvent {
    /// Create an event.
    pub fn new(kind: EventKind, resource_id: impl Into<ChannelId>) -> Self {
        Self {
            kind,
            resource_id: resource_id.into(),
        }
    }

    /// An `add` event.
    pub fn add(resource_id: impl Into<ChannelId>) -> Self {
        Self::new(EventKind::Add, resource_id)
    }

    /// An `update` event.
    pub fn update(resource_id: impl Into<ChannelId>) -> Self {
        Self::new(EventKind::Update, resource_id)
    }

    /// A `delete` event.
    pub fn delete(resource_id: impl Into<ChannelId>) -> Self {
        Self::new(EventKind::Delete, resource_id)
    }
}
