//! Remote client abstraction.
//!
//! The remote service owns channels and messages; the engine reaches it only
//! through [`ChatRemote`]. Implementations perform no caching and no retries.
//! Every call either returns the service's answer or a typed [`NetworkError`].
//!
//! # Example
//!
//! ```ignore
//! let remote = MockRemote::new();
//! let channel = remote.create_channel("general", None).await?;
//! let messages = remote.list_messages(&channel.id).await?;
//! ```

mod mock;

pub use mock::MockRemote;

use async_trait::async_trait;
use sync_types::{Channel, ChannelId, Message, NetworkError, OutgoingMessage};

/// Identifies one [`ChatRemote`] operation, for failure injection and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// [`ChatRemote::list_channels`]
    ListChannels,
    /// [`ChatRemote::fetch_channel`]
    FetchChannel,
    /// [`ChatRemote::create_channel`]
    CreateChannel,
    /// [`ChatRemote::delete_channel`]
    DeleteChannel,
    /// [`ChatRemote::list_messages`]
    ListMessages,
    /// [`ChatRemote::send_message`]
    SendMessage,
}

/// Typed request/response operations against the chat service.
#[async_trait]
pub trait ChatRemote: Send + Sync {
    /// All channels visible to the user.
    async fn list_channels(&self) -> Result<Vec<Channel>, NetworkError>;

    /// A single channel. Used for targeted re-fetches.
    async fn fetch_channel(&self, id: &ChannelId) -> Result<Channel, NetworkError>;

    /// Create a channel and return the service's record of it.
    async fn create_channel(
        &self,
        name: &str,
        logo_url: Option<&str>,
    ) -> Result<Channel, NetworkError>;

    /// Delete a channel.
    async fn delete_channel(&self, id: &ChannelId) -> Result<(), NetworkError>;

    /// All messages of a channel, in service order.
    async fn list_messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>, NetworkError>;

    /// Send a message and return the service's record of it.
    async fn send_message(&self, message: OutgoingMessage) -> Result<Message, NetworkError>;
}
