//! # chatsync
//!
//! Operator CLI for the chatsync local cache.
//!
//! ## Commands
//!
//! - `channels`: List cached channels, most recent activity first
//! - `messages`: Show the cached messages of a channel, grouped by day
//! - `forget`: Remove a channel and its messages from the cache
//! - `status`: Show the database location and row counts
//!
//! ## Example
//!
//! ```bash
//! # List channels
//! chatsync channels
//!
//! # Read a channel as JSON
//! chatsync --json messages general
//!
//! # Drop a channel from the cache
//! chatsync forget general
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{channels, forget, messages, status};
use sync_types::ChannelId;

/// Operator CLI for the chatsync local cache.
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the cache database and chatsync.toml
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: <data-dir>/chatsync.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List cached channels
    Channels,

    /// Show cached messages of a channel
    Messages {
        /// Channel id
        channel_id: String,
    },

    /// Remove a channel and its messages from the cache
    Forget {
        /// Channel id
        channel_id: String,
    },

    /// Show cache status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let settings = config::Settings::load(&data_dir, cli.config.as_deref())?;
    let store = settings.open_store().await?;

    let result = match cli.command {
        Commands::Channels => channels::run(&store, &settings, cli.json).await,
        Commands::Messages { channel_id } => {
            messages::run(&store, &ChannelId::new(channel_id), &settings, cli.json).await
        }
        Commands::Forget { channel_id } => {
            forget::run(&store, &ChannelId::new(channel_id), cli.json).await
        }
        Commands::Status => status::run(&store, &settings, cli.json).await,
    };

    store.close().await;
    result
}

/// Get the default data directory for chatsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "chatsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
