//! # sync-types
//!
//! Data model types for the chatsync synchronization engine.
//!
//! This crate provides the foundational types used across all chatsync crates:
//! - [`ChannelId`], [`Channel`], [`Message`], [`MessageKey`] - Records and identity
//! - [`ChannelEvent`], [`EventKind`] - Realtime invalidation events
//! - [`OutgoingMessage`] - Send request
//! - [`NetworkError`], [`EventStreamError`] - Error types shared by remote backends

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod model;

pub use error::{EventStreamError, NetworkError};
pub use event::{ChannelEvent, EventKind};
pub use model::{to_millis_precision, Channel, ChannelId, Message, MessageKey, OutgoingMessage};
