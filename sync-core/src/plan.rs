//! Merge policy as data.
//!
//! Each function turns an input (a realtime event, a user delete, a confirmed
//! send) into the ordered list of steps the engine must execute. The engine
//! in sync-client interprets these steps; nothing here performs I/O.
//!
//! Policies:
//! - `add`/`update` events are invalidations: the channel is re-fetched, the
//!   event payload is never trusted. `update` also re-fetches the message list
//!   when that channel's session is active.
//! - `delete` events remove the channel locally without a re-fetch and raise
//!   the external-delete notification.
//! - User deletes remove the channel locally whatever the remote said, and
//!   never raise the external-delete notification.

use sync_types::{ChannelEvent, ChannelId, EventKind};

/// One step of the engine's merge procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Fetch the channel from the remote service and upsert it.
    RefetchChannel(ChannelId),
    /// Fetch the channel's messages from the remote service and upsert them.
    RefetchMessages(ChannelId),
    /// Delete the channel (and its messages) from the local store.
    DeleteLocal(ChannelId),
    /// End the active message session for this channel.
    EndSession(ChannelId),
    /// Raise the external-delete notification for this channel.
    NotifyExternalDelete(ChannelId),
    /// Re-read the channel list from the local store and publish it.
    PublishChannels,
    /// Re-read the channel's messages from the local store and publish them.
    PublishMessages(ChannelId),
}

/// Plan the reaction to a realtime event.
///
/// `active` is the channel whose message session is currently open, if any.
pub fn plan_event(event: &ChannelEvent, active: Option<&ChannelId>) -> Vec<SyncAction> {
    let id = event.resource_id.clone();
    let is_active = active == Some(&id);

    match event.kind {
        EventKind::Add => vec![SyncAction::RefetchChannel(id), SyncAction::PublishChannels],
        EventKind::Update => {
            let mut actions = vec![SyncAction::RefetchChannel(id.clone())];
            if is_active {
                actions.push(SyncAction::RefetchMessages(id.clone()));
                actions.push(SyncAction::PublishMessages(id));
            }
            actions.push(SyncAction::PublishChannels);
            actions
        }
        EventKind::Delete => {
            let mut actions = vec![SyncAction::DeleteLocal(id.clone()), SyncAction::PublishChannels];
            if is_active {
                actions.push(SyncAction::EndSession(id.clone()));
            }
            actions.push(SyncAction::NotifyExternalDelete(id));
            actions
        }
    }
}

/// Plan the local half of a user-initiated delete.
///
/// Runs after the remote call, whatever its outcome.
pub fn plan_user_delete(id: &ChannelId, active: Option<&ChannelId>) -> Vec<SyncAction> {
    let mut actions = vec![SyncAction::DeleteLocal(id.clone()), SyncAction::PublishChannels];
    if active == Some(id) {
        actions.push(SyncAction::EndSession(id.clone()));
    }
    actions
}

/// Plan what follows a send the remote service confirmed.
///
/// The confirmed message is already stored when these steps run.
pub fn plan_send_confirmed(channel_id: &ChannelId) -> Vec<SyncAction> {
    vec![
        SyncAction::RefetchChannel(channel_id.clone()),
        SyncAction::PublishMessages(channel_id.clone()),
        SyncAction::PublishChannels,
    ]
}
