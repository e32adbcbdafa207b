//! Show cache status.

use anyhow::Result;
use sync_client::{LocalStore, SqliteStore};

use crate::config::Settings;

/// Run the status command.
pub async fn run(store: &SqliteStore, settings: &Settings, json: bool) -> Result<()> {
    let stats = store.stats().await?;
    let path = store.path().unwrap_or(settings.database.as_path());

    if json {
        let report = serde_json::json!({
            "database": path,
            "channels": stats.channels,
            "messages": stats.messages,
            "author": settings.config.author.id,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== chatsync status ===");
    println!();
    println!("Cache:");
    println!("  Database: {}", path.display());
    println!("  Channels: {}", stats.channels);
    println!("  Messages: {}", stats.messages);
    println!();
    println!("Author:");
    println!("  ID:   {}", settings.config.author.id);
    println!("  Name: {}", settings.config.author.name);

    Ok(())
}
