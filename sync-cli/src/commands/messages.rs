//! Show cached messages of a channel.

use anyhow::Result;
use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use sync_client::{LocalStore, SqliteStore};
use sync_core::{group_by_day, DaySection};
use sync_types::{ChannelId, Message};

use crate::config::Settings;

/// JSON shape of one day section.
#[derive(Debug, Serialize)]
struct DayView<'a> {
    day: NaiveDate,
    messages: &'a [Message],
}

/// Run the messages command.
///
/// Days are printed newest first, and so are the messages of each day.
pub async fn run(
    store: &SqliteStore,
    channel_id: &ChannelId,
    settings: &Settings,
    json: bool,
) -> Result<()> {
    let Some(channel) = store.fetch_channel(channel_id).await? else {
        anyhow::bail!("Channel {} is not cached", channel_id);
    };

    let messages = store.fetch_messages(channel_id).await?;
    let sections = group_by_day(&messages, settings.offset);

    if json {
        let days: Vec<DayView<'_>> = sections
            .iter()
            .map(|s| DayView {
                day: s.day,
                messages: &s.messages,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&days)?);
        return Ok(());
    }

    println!("#{} ({} messages)", channel.name, messages.len());
    for line in render(&sections, settings.offset) {
        println!("{}", line);
    }
    Ok(())
}

fn render(sections: &[DaySection], offset: FixedOffset) -> Vec<String> {
    let mut lines = Vec::new();
    for section in sections {
        lines.push(format!("== {} ==", section.day));
        for message in &section.messages {
            let time = message.timestamp.with_timezone(&offset).format("%H:%M");
            lines.push(format!("{}  {}: {}", time, message.author_name, message.text));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sync_types::Channel;

    fn msg(id: &str, text: &str, day: u32, hour: u32) -> Message {
        Message::new(
            id,
            text,
            "u1",
            "Alice",
            Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn render_groups_newest_day_first() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let messages = vec![
            msg("a", "morning", 1, 9),
            msg("b", "evening", 1, 20),
            msg("c", "next day", 2, 8),
        ];

        let lines = render(&group_by_day(&messages, utc), utc);

        assert_eq!(
            lines,
            vec![
                "== 2024-06-02 ==",
                "08:00  Alice: next day",
                "== 2024-06-01 ==",
                "20:00  Alice: evening",
                "09:00  Alice: morning",
            ]
        );
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path(), None).unwrap();
        let store = SqliteStore::in_memory().await.unwrap();

        let err = run(&store, &ChannelId::from("nope"), &settings, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not cached"));
    }

    #[tokio::test]
    async fn known_channel_prints() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path(), None).unwrap();
        let store = SqliteStore::in_memory().await.unwrap();
        let id = ChannelId::from("1");
        store.upsert_channel(Channel::new("1", "General")).await.unwrap();
        store.upsert_message(&id, msg("a", "hi", 1, 9)).await.unwrap();

        assert!(run(&store, &id, &settings, false).await.is_ok());
        assert!(run(&store, &id, &settings, true).await.is_ok());
    }
}
