//! Channel and message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a channel, assigned by the remote service.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a ChannelId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id and return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A conversation with denormalized preview metadata.
///
/// `last_message` and `last_activity` mirror the newest message known for the
/// channel. They are the only fields (besides `logo_url`) that change after
/// the channel is first stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique channel identifier.
    pub id: ChannelId,
    /// Display name. Fixed once stored locally.
    pub name: String,
    /// Optional logo location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// Preview text of the newest message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Timestamp of the newest activity in the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl Channel {
    /// Create a channel with no logo and no activity.
    pub fn new(id: impl Into<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            logo_url: None,
            last_message: None,
            last_activity: None,
        }
    }

    /// Set the logo URL.
    pub fn with_logo_url(mut self, url: impl Into<String>) -> Self {
        self.logo_url = Some(url.into());
        self
    }

    /// Set the preview text and activity timestamp.
    pub fn with_last_message(mut self, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.last_message = Some(text.into());
        self.last_activity = Some(to_millis_precision(at));
        self
    }

    /// Set only the activity timestamp.
    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = Some(to_millis_precision(at));
        self
    }
}

/// An immutable, timestamped utterance belonging to one channel.
///
/// The message does not carry its channel id; ownership is expressed by where
/// it is stored. Two messages of the same channel with the same timestamp are
/// the same message, whatever their `id` (see [`MessageKey`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Remote-assigned identifier. Not stable across listings.
    pub id: String,
    /// Message body.
    pub text: String,
    /// Author identifier.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
    /// Creation time, millisecond precision.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message. The timestamp is truncated to milliseconds.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author_id: author_id.into(),
            author_name: author_name.into(),
            timestamp: to_millis_precision(timestamp),
        }
    }

    /// Deduplication key of this message within the given channel.
    pub fn key(&self, channel_id: &ChannelId) -> MessageKey {
        MessageKey {
            channel_id: channel_id.clone(),
            timestamp_millis: self.timestamp.timestamp_millis(),
        }
    }
}

/// Identity of a stored message: `(channel, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    /// Owning channel.
    pub channel_id: ChannelId,
    /// Message timestamp in Unix milliseconds.
    pub timestamp_millis: i64,
}

/// A message to be sent through the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel.
    pub channel_id: ChannelId,
    /// Message body.
    pub text: String,
    /// Author identifier.
    pub author_id: String,
    /// Author display name.
    pub author_name: String,
}

/// Truncate a timestamp to millisecond precision.
///
/// The local store keys messages on millisecond timestamps, so every
/// timestamp entering the model is normalized the same way.
pub fn to_millis_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}
