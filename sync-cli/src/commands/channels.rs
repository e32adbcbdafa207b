//! List cached channels.

use anyhow::Result;
use chrono::FixedOffset;
use sync_client::{LocalStore, SqliteStore};
use sync_types::Channel;

use super::format_timestamp;
use crate::config::Settings;

/// Run the channels command.
///
/// Channels are printed in the same order the engine publishes them.
pub async fn run(store: &SqliteStore, settings: &Settings, json: bool) -> Result<()> {
    let channels = store.fetch_channels().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&channels)?);
        return Ok(());
    }

    if channels.is_empty() {
        println!("No cached channels.");
        return Ok(());
    }

    for channel in &channels {
        println!("{}", render(channel, settings.offset));
    }
    Ok(())
}

/// One line per channel: id, name, last activity, preview.
fn render(channel: &Channel, offset: FixedOffset) -> String {
    let activity = channel
        .last_activity
        .map(|ts| format_timestamp(ts, offset))
        .unwrap_or_else(|| "-".to_string());
    let preview = channel.last_message.as_deref().unwrap_or("");
    format!("{}\t{}\t{}\t{}", channel.id, channel.name, activity, preview)
}
