//! SQLite store backend.

use super::{LocalStore, StoreStats, StoreWrite};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use sync_types::{Channel, ChannelId, Message};

/// Default size of the read pool.
pub const DEFAULT_READ_CONNECTIONS: u32 = 4;

/// SQLite-based local store.
///
/// Writes go through a single-connection pool, so at most one write
/// transaction is open at a time. Reads use a separate pool and, with WAL,
/// never wait on a writer for longer than a commit.
#[derive(Clone)]
pub struct SqliteStore {
    writer: SqlitePool,
    reader: SqlitePool,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at `path` with the default read pool size.
    pub async fn new(path: &Path) -> StorageResult<Self> {
        Self::open(path, DEFAULT_READ_CONNECTIONS).await
    }

    /// Open (or create) a store at `path`.
    pub async fn open(path: &Path, read_connections: u32) -> StorageResult<Self> {
        if path.as_os_str().is_empty() || path.is_dir() {
            return Err(StorageError::InvalidPath {
                path: path.to_path_buf(),
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone().create_if_missing(true))
            .await?;

        let store = Self {
            reader: writer.clone(),
            writer,
            path: Some(path.to_path_buf()),
        };
        store.run_migrations().await?;

        // Open readers only once the schema exists.
        let reader = SqlitePoolOptions::new()
            .max_connections(read_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(Self { reader, ..store })
    }

    /// Create an in-memory store (for tests and ephemeral sessions).
    ///
    /// Reads and writes share one connection, since every connection to
    /// `:memory:` would see its own empty database.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self {
            writer: pool.clone(),
            reader: pool,
            path: None,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close both pools.
    pub async fn close(&self) {
        self.reader.close().await;
        self.writer.close().await;
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                logo_url TEXT,
                last_message TEXT,
                last_activity INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT NOT NULL,
                channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                text TEXT NOT NULL,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                UNIQUE(channel_id, timestamp)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_channels_activity ON channels(last_activity)",
            "CREATE INDEX IF NOT EXISTS idx_messages_channel_ts ON messages(channel_id, timestamp)",
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.writer)
                .await
                .map_err(|e| StorageError::Migration(e.to_string()))?;
        }
        Ok(())
    }

    async fn apply_one(tx: &mut Transaction<'_, Sqlite>, write: StoreWrite) -> StorageResult<()> {
        match write {
            StoreWrite::UpsertChannel(channel) => {
                sqlx::query(
                    r#"
                    INSERT INTO channels (id, name, logo_url, last_message, last_activity)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(id) DO UPDATE SET
                        logo_url = excluded.logo_url,
                        last_message = excluded.last_message,
                        last_activity = excluded.last_activity
                    "#,
                )
                .bind(channel.id.as_str())
                .bind(&channel.name)
                .bind(&channel.logo_url)
                .bind(&channel.last_message)
                .bind(channel.last_activity.map(|t| t.timestamp_millis()))
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::UpsertMessage {
                channel_id,
                message,
            } => {
                // Ignored when (channel_id, timestamp) exists or the channel is unknown.
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO messages
                        (id, channel_id, text, author_id, author_name, timestamp)
                    SELECT ?1, ?2, ?3, ?4, ?5, ?6
                    WHERE EXISTS (SELECT 1 FROM channels WHERE id = ?2)
                    "#,
                )
                .bind(&message.id)
                .bind(channel_id.as_str())
                .bind(&message.text)
                .bind(&message.author_id)
                .bind(&message.author_name)
                .bind(message.timestamp.timestamp_millis())
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::UpdatePreview {
                channel_id,
                text,
                at,
            } => {
                sqlx::query(
                    r#"
                    UPDATE channels SET last_message = ?2, last_activity = ?3
                    WHERE id = ?1 AND (last_activity IS NULL OR last_activity < ?3)
                    "#,
                )
                .bind(channel_id.as_str())
                .bind(&text)
                .bind(at.timestamp_millis())
                .execute(&mut **tx)
                .await?;
            }
            StoreWrite::DeleteChannel(id) => {
                sqlx::query("DELETE FROM messages WHERE channel_id = ?1")
                    .bind(id.as_str())
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("DELETE FROM channels WHERE id = ?1")
                    .bind(id.as_str())
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn fetch_channels(&self) -> StorageResult<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, logo_url, last_message, last_activity
            FROM channels
            ORDER BY (last_activity IS NULL), last_activity DESC, id ASC
            "#,
        )
        .fetch_all(&self.reader)
        .await?;

        rows.into_iter().map(Channel::try_from).collect()
    }

    async fn fetch_channel(&self, id: &ChannelId) -> StorageResult<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, logo_url, last_message, last_activity
            FROM channels
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.reader)
        .await?;

        row.map(Channel::try_from).transpose()
    }

    async fn fetch_messages(&self, channel_id: &ChannelId) -> StorageResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, text, author_id, author_name, timestamp
            FROM messages
            WHERE channel_id = ?1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(channel_id.as_str())
        .fetch_all(&self.reader)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn apply(&self, writes: Vec<StoreWrite>) -> StorageResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut tx = self.writer.begin().await?;
        for write in writes {
            Self::apply_one(&mut tx, write).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn stats(&self) -> StorageResult<StoreStats> {
        let channels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM channels")
            .fetch_one(&self.reader)
            .await?;
        let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.reader)
            .await?;

        Ok(StoreStats {
            channels: channels as u64,
            messages: messages as u64,
        })
    }
}

fn from_millis(millis: i64, what: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Corrupt(format!("{what} out of range: {millis}")))
}

/// Internal row type for channel queries.
#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: String,
    name: String,
    logo_url: Option<String>,
    last_message: Option<String>,
    last_activity: Option<i64>,
}

impl TryFrom<ChannelRow> for Channel {
    type Error = StorageError;

    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        Ok(Channel {
            last_activity: row
                .last_activity
                .map(|ms| from_millis(ms, "channel last_activity"))
                .transpose()?,
            id: ChannelId::from(row.id),
            name: row.name,
            logo_url: row.logo_url,
            last_message: row.last_message,
        })
    }
}

/// Internal row type for message queries.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    text: String,
    author_id: String,
    author_name: String,
    timestamp: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            timestamp: from_millis(row.timestamp, "message timestamp")?,
            id: row.id,
            text: row.text,
            author_id: row.author_id,
            author_name: row.author_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    // ===== Store contract =====

    #[tokio::test]
    async fn upsert_is_idempotent() {
        contract::upsert_is_idempotent(&store().await).await;
    }

    #[tokio::test]
    async fn upsert_keeps_name_and_messages() {
        contract::upsert_keeps_name_and_messages(&store().await).await;
    }

    #[tokio::test]
    async fn messages_dedup_on_timestamp() {
        contract::messages_dedup_on_timestamp(&store().await).await;
    }

    #[tokio::test]
    async fn same_timestamp_in_other_channel_is_distinct() {
        contract::same_timestamp_in_other_channel_is_distinct(&store().await).await;
    }

    #[tokio::test]
    async fn messages_are_oldest_first() {
        contract::messages_are_oldest_first(&store().await).await;
    }

    #[tokio::test]
    async fn orphan_message_is_dropped() {
        contract::orphan_message_is_dropped(&store().await).await;
    }

    #[tokio::test]
    async fn delete_removes_channel_and_messages() {
        contract::delete_removes_channel_and_messages(&store().await).await;
    }

    #[tokio::test]
    async fn channels_sorted_by_activity() {
        contract::channels_sorted_by_activity(&store().await).await;
    }

    #[tokio::test]
    async fn preview_only_moves_forward() {
        contract::preview_only_moves_forward(&store().await).await;
    }

    #[tokio::test]
    async fn preview_fills_empty_activity() {
        contract::preview_fills_empty_activity(&store().await).await;
    }

    #[tokio::test]
    async fn batch_applies_in_order() {
        contract::batch_applies_in_order(&store().await).await;
    }

    #[tokio::test]
    async fn millisecond_timestamps_survive() {
        contract::millisecond_timestamps_survive(&store().await).await;
    }

    #[tokio::test]
    async fn sub_millisecond_timestamps_are_truncated() {
        contract::sub_millisecond_timestamps_are_truncated(&store().await).await;
    }

    // ===== SQLite specifics =====

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store
                .upsert_channel(Channel::new("1", "General").with_last_activity(contract::at(5)))
                .await
                .unwrap();
            store
                .upsert_message(&ChannelId::from("1"), contract::msg("m", "hi", 5))
                .await
                .unwrap();
            store.close().await;
        }

        let store = SqliteStore::new(&path).await.unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(
            store.stats().await.unwrap(),
            StoreStats {
                channels: 1,
                messages: 1
            }
        );
    }

    #[tokio::test]
    async fn readers_see_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("chat.db"), 2)
            .await
            .unwrap();

        for i in 0..5 {
            store
                .upsert_channel(Channel::new(format!("c{i}").as_str(), "n"))
                .await
                .unwrap();
            assert_eq!(store.fetch_channels().await.unwrap().len(), i + 1);
        }
    }

    #[tokio::test]
    async fn directory_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteStore::new(dir.path()).await;
        assert!(matches!(result, Err(StorageError::InvalidPath { .. })));
    }

    #[tokio::test]
    async fn failed_batch_rolls_back() {
        let store = store().await;
        sqlx::query("CREATE TRIGGER reject_boom BEFORE INSERT ON channels WHEN NEW.id = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected'); END")
            .execute(&store.writer)
            .await
            .unwrap();

        let result = store
            .apply(vec![
                StoreWrite::UpsertChannel(Channel::new("ok", "Ok")),
                StoreWrite::UpsertChannel(Channel::new("boom", "Boom")),
            ])
            .await;

        assert!(matches!(result, Err(StorageError::Database(_))));
        assert!(store.fetch_channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_timestamp_is_reported() {
        let store = store().await;
        sqlx::query("INSERT INTO channels (id, name, last_activity) VALUES ('x', 'X', ?1)")
            .bind(i64::MAX)
            .execute(&store.writer)
            .await
            .unwrap();

        let result = store.fetch_channels().await;
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }
}
