//! Configuration resolution for the CLI.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use std::path::{Path, PathBuf};
use sync_client::{SqliteStore, SyncConfig};

/// Name of the config file looked up in the data directory.
pub const CONFIG_FILE: &str = "chatsync.toml";

/// Engine configuration plus the paths it resolves to.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Loaded configuration.
    pub config: SyncConfig,
    /// Absolute or data-dir-relative database path.
    pub database: PathBuf,
    /// Display offset for day sections.
    pub offset: FixedOffset,
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit `--config` must exist. Otherwise `<data_dir>/chatsync.toml`
    /// is used if present, and defaults if not. A relative database path is
    /// resolved against `data_dir`.
    pub fn load(data_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => SyncConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => {
                let path = data_dir.join(CONFIG_FILE);
                if path.exists() {
                    SyncConfig::from_file(&path)
                        .with_context(|| format!("Failed to load config {}", path.display()))?
                } else {
                    SyncConfig::default()
                }
            }
        };

        let database = if config.store.database.is_absolute() {
            config.store.database.clone()
        } else {
            data_dir.join(&config.store.database)
        };
        let offset = config.display.offset().context("Invalid display offset")?;

        Ok(Self {
            config,
            database,
            offset,
        })
    }

    /// Open the local store, creating the database if missing.
    pub async fn open_store(&self) -> Result<SqliteStore> {
        tracing::debug!("Opening cache at {}", self.database.display());
        SqliteStore::open(&self.database, self.config.store.read_connections)
            .await
            .with_context(|| format!("Failed to open cache {}", self.database.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path(), None).unwrap();

        assert_eq!(settings.database, dir.path().join("chatsync.db"));
        assert_eq!(settings.offset, FixedOffset::east_opt(0).unwrap());
    }

    #[test]
    fn data_dir_config_is_picked_up() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[store]\ndatabase = \"cache.db\"\n\n[display]\nutc_offset_minutes = 120\n",
        )
        .unwrap();

        let settings = Settings::load(dir.path(), None).unwrap();

        assert_eq!(settings.database, dir.path().join("cache.db"));
        assert_eq!(settings.offset, FixedOffset::east_opt(7200).unwrap());
    }

    #[test]
    fn absolute_database_path_is_kept() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let db = other.path().join("elsewhere.db");
        let config = dir.path().join("custom.toml");
        std::fs::write(&config, format!("[store]\ndatabase = {:?}\n", db)).unwrap();

        let settings = Settings::load(dir.path(), Some(&config)).unwrap();

        assert_eq!(settings.database, db);
    }

    #[test]
    fn missing_explicit_config_fails() {
        let dir = tempdir().unwrap();
        let result = Settings::load(dir.path(), Some(&dir.path().join("nope.toml")));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_store_creates_database() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(dir.path(), None).unwrap();

        let store = settings.open_store().await.unwrap();
        store.close().await;

        assert!(settings.database.exists());
    }
}
