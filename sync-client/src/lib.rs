//! # sync-client
//!
//! Synchronization engine for the chatsync mobile chat client.
//!
//! This is the library the app embeds to keep its channel and message views
//! consistent with the chat service.
//!
//! ## Features
//!
//! - **Local Store**: SQLite (WAL, single writer) or in-memory arena backend
//! - **Remote Abstraction**: Typed channel/message operations (mock included)
//! - **Event Stream**: Cancellable realtime subscriptions with backoff reconnects
//! - **Published State**: Latest-value channels for the channel and message lists
//! - **Pure Merge Policy**: Uses sync-core for side-effect-free decisions
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{MockEventSource, MockRemote, SqliteStore, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::from_file("chatsync.toml".as_ref())?;
//! let store = SqliteStore::open(&config.store.database, config.store.read_connections).await?;
//! let engine = SyncEngine::new(config, MockRemote::new(), MockEventSource::new(), store)?;
//!
//! engine.start().await?;
//! let channels = engine.channels();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod published;
pub mod remote;
pub mod store;

pub use config::{ConfigError, SyncConfig};
pub use engine::SyncEngine;
pub use error::{Result, StorageError, SyncError};
pub use events::{EventSink, EventSource, MockEventSource, Subscription};
pub use published::{MessageList, PublishedState};
pub use remote::{ChatRemote, MockRemote, RemoteOp};
pub use store::{LocalStore, MemoryStore, SqliteStore, StoreStats, StoreWrite};
