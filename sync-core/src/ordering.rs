//! Ordering rules for channels and messages.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use sync_types::{Channel, Message};

/// Compare two channels for the published channel list.
///
/// Most recent `last_activity` first; channels without activity after all
/// channels with activity; ties broken by id so the order is stable across
/// re-reads.
pub fn compare_by_activity(a: &Channel, b: &Channel) -> Ordering {
    match (a.last_activity, b.last_activity) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    }
}

/// Sort channels in published order.
pub fn sort_channels(channels: &mut [Channel]) {
    channels.sort_by(compare_by_activity);
}

/// Check that a channel list is in published order.
pub fn is_sorted_by_activity(channels: &[Channel]) -> bool {
    channels
        .windows(2)
        .all(|w| compare_by_activity(&w[0], &w[1]) != Ordering::Greater)
}

/// The newest message of a list, if any.
pub fn newest_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().max_by_key(|m| m.timestamp)
}

/// True when `candidate` is strictly newer than `current` (or nothing is known).
pub fn is_newer(candidate: DateTime<Utc>, current: Option<DateTime<Utc>>) -> bool {
    current.map_or(true, |current| candidate > current)
}
