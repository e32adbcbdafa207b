//! Configuration loading for sync-client.
//!
//! Configuration is loaded from a TOML file (default: `chatsync.toml`).
//! Every section and field is optional; missing values take the defaults below.

use chrono::FixedOffset;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use sync_core::ReconnectPolicy;

/// Root configuration for the sync engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Identity used for outgoing messages.
    #[serde(default)]
    pub author: AuthorConfig,
    /// Local store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Display configuration.
    #[serde(default)]
    pub display: DisplayConfig,
    /// Event subscription configuration.
    #[serde(default)]
    pub events: EventsConfig,
    /// Published state configuration.
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Author identity attached to sent messages.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorConfig {
    /// Author identifier (default: "local").
    #[serde(default = "default_author_id")]
    pub id: String,
    /// Author display name (default: "Me").
    #[serde(default = "default_author_name")]
    pub name: String,
}

/// Local store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to SQLite database file (default: chatsync.db).
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Connections in the read pool (default: 4). Writes always use one connection.
    #[serde(default = "default_read_connections")]
    pub read_connections: u32,
}

/// Display configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Offset from UTC, in minutes, used for calendar-day sections (default: 0).
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Event subscription configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Resubscribe after a failure or drop (default: true).
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
    /// First retry delay in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Retry delay cap in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Maximum random jitter in milliseconds (default: 1000).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Consecutive failed attempts before giving up (default: 0 = unlimited).
    #[serde(default)]
    pub max_attempts: u32,
}

/// Published state configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// Buffered external-delete notifications per slow receiver (default: 16).
    #[serde(default = "default_external_delete_capacity")]
    pub external_delete_capacity: usize,
}

// Default value functions
fn default_author_id() -> String {
    "local".to_string()
}

fn default_author_name() -> String {
    "Me".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("chatsync.db")
}

fn default_read_connections() -> u32 {
    4
}

fn default_reconnect() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_jitter_ms() -> u64 {
    1000
}

fn default_external_delete_capacity() -> usize {
    16
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            id: default_author_id(),
            name: default_author_name(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            read_connections: default_read_connections(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            reconnect: default_reconnect(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            max_attempts: 0,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            external_delete_capacity: default_external_delete_capacity(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.display.offset()?;
        if self.store.read_connections == 0 {
            return Err(ConfigError::Invalid(
                "store.read_connections must be at least 1".into(),
            ));
        }
        if self.publish.external_delete_capacity == 0 {
            return Err(ConfigError::Invalid(
                "publish.external_delete_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Set the author identity.
    pub fn with_author(mut self, id: &str, name: &str) -> Self {
        self.author = AuthorConfig {
            id: id.to_string(),
            name: name.to_string(),
        };
        self
    }

    /// Set the event reconnection settings.
    pub fn with_events(mut self, events: EventsConfig) -> Self {
        self.events = events;
        self
    }
}

impl DisplayConfig {
    /// The display offset as a chrono offset.
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "display.utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }
}

impl EventsConfig {
    /// A configuration that subscribes once and never reconnects.
    pub fn no_reconnect() -> Self {
        Self {
            reconnect: false,
            ..Self::default()
        }
    }

    /// Fast retries for tests and local demos.
    pub fn immediate() -> Self {
        Self {
            reconnect: true,
            base_delay_ms: 1,
            max_delay_ms: 10,
            max_jitter_ms: 0,
            max_attempts: 0,
        }
    }

    /// The reconnection policy for the event loop.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.reconnect,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
