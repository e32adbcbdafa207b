//! Remove a channel from the local cache.

use anyhow::Result;
use sync_client::{LocalStore, SqliteStore};
use sync_types::ChannelId;

/// Run the forget command.
///
/// Only the local cache is touched; the channel stays on the service and
/// comes back with the next channel list refresh.
pub async fn run(store: &SqliteStore, channel_id: &ChannelId, json: bool) -> Result<()> {
    if store.fetch_channel(channel_id).await?.is_none() {
        anyhow::bail!("Channel {} is not cached", channel_id);
    }

    let removed = store.fetch_messages(channel_id).await?.len();
    store.delete_channel(channel_id).await?;
    tracing::info!("Forgot channel {} ({} messages)", channel_id, removed);

    if json {
        let report = serde_json::json!({
            "channel_id": channel_id,
            "messages_removed": removed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Forgot channel {} ({} messages removed)", channel_id, removed);
    }
    Ok(())
}
