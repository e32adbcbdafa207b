//! Mock remote service for testing.
//!
//! Holds server-side channels and messages in memory, logs every call, and
//! lets tests inject failures and latency per operation.

use super::{ChatRemote, RemoteOp};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_types::{to_millis_precision, Channel, ChannelId, Message, NetworkError, OutgoingMessage};
use uuid::Uuid;

/// In-process fake of the chat service. `Clone` shares the same state.
#[derive(Debug, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug)]
struct MockRemoteInner {
    channels: BTreeMap<ChannelId, Channel>,
    messages: HashMap<ChannelId, Vec<Message>>,
    fail_next: HashMap<RemoteOp, VecDeque<NetworkError>>,
    delay_next: HashMap<RemoteOp, VecDeque<Duration>>,
    calls: Vec<RemoteOp>,
    clock: DateTime<Utc>,
    reissue_message_ids: bool,
}

impl Default for MockRemoteInner {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
            messages: HashMap::new(),
            fail_next: HashMap::new(),
            delay_next: HashMap::new(),
            calls: Vec::new(),
            clock: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            reissue_message_ids: false,
        }
    }
}

impl MockRemoteInner {
    /// Log the call, then return the injected failure and delay for it.
    fn begin(&mut self, op: RemoteOp) -> (Result<(), NetworkError>, Option<Duration>) {
        self.calls.push(op);
        let delay = self.delay_next.get_mut(&op).and_then(VecDeque::pop_front);
        match self.fail_next.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => (Err(err), delay),
            None => (Ok(()), delay),
        }
    }

    fn channel(&self, id: &ChannelId) -> Result<Channel, NetworkError> {
        self.channels
            .get(id)
            .cloned()
            .ok_or(NetworkError::Status { code: 404 })
    }

    fn tick(&mut self) -> DateTime<Utc> {
        let now = self.clock;
        self.clock += ChronoDuration::seconds(1);
        now
    }
}

impl MockRemote {
    /// Create an empty mock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a channel on the server side.
    pub fn insert_channel(&self, channel: Channel) {
        let mut inner = self.inner.lock().unwrap();
        inner.messages.entry(channel.id.clone()).or_default();
        inner.channels.insert(channel.id.clone(), channel);
    }

    /// Add a message on the server side without touching the channel preview.
    pub fn insert_message(&self, channel_id: &ChannelId, message: Message) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .messages
            .entry(channel_id.clone())
            .or_default()
            .push(message);
    }

    /// Remove a channel on the server side (as another client would).
    pub fn remove_channel(&self, id: &ChannelId) {
        let mut inner = self.inner.lock().unwrap();
        inner.channels.remove(id);
        inner.messages.remove(id);
    }

    /// The server-side record of a channel.
    pub fn channel(&self, id: &ChannelId) -> Option<Channel> {
        let inner = self.inner.lock().unwrap();
        inner.channels.get(id).cloned()
    }

    /// Cause the next call of `op` to fail with `error`. Failures queue up.
    pub fn fail_next(&self, op: RemoteOp, error: NetworkError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next.entry(op).or_default().push_back(error);
    }

    /// Delay the response of the next call of `op`.
    ///
    /// The response is computed when the call is made and returned after
    /// the delay, like a slow network round trip.
    pub fn delay_next(&self, op: RemoteOp, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.delay_next.entry(op).or_default().push_back(delay);
    }

    /// Set the time assigned to the next sent message.
    ///
    /// The clock advances by one second per send.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock = to_millis_precision(now);
    }

    /// Give every message a fresh id on each listing.
    pub fn set_reissue_message_ids(&self, reissue: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.reissue_message_ids = reissue;
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<RemoteOp> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }

    /// Number of calls of `op` made so far.
    pub fn call_count(&self, op: RemoteOp) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.calls.iter().filter(|&&c| c == op).count()
    }

    async fn respond<T>(
        &self,
        op: RemoteOp,
        f: impl FnOnce(&mut MockRemoteInner) -> Result<T, NetworkError>,
    ) -> Result<T, NetworkError> {
        let (result, delay) = {
            let mut inner = self.inner.lock().unwrap();
            let (gate, delay) = inner.begin(op);
            (gate.and_then(|()| f(&mut *inner)), delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

impl Clone for MockRemote {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl ChatRemote for MockRemote {
    async fn list_channels(&self) -> Result<Vec<Channel>, NetworkError> {
        self.respond(RemoteOp::ListChannels, |inner| {
            Ok(inner.channels.values().cloned().collect())
        })
        .await
    }

    async fn fetch_channel(&self, id: &ChannelId) -> Result<Channel, NetworkError> {
        self.respond(RemoteOp::FetchChannel, |inner| inner.channel(id))
            .await
    }

    async fn create_channel(
        &self,
        name: &str,
        logo_url: Option<&str>,
    ) -> Result<Channel, NetworkError> {
        self.respond(RemoteOp::CreateChannel, |inner| {
            let mut channel = Channel::new(Uuid::new_v4().to_string(), name);
            channel.logo_url = logo_url.map(str::to_string);
            inner.messages.insert(channel.id.clone(), Vec::new());
            inner.channels.insert(channel.id.clone(), channel.clone());
            Ok(channel)
        })
        .await
    }

    async fn delete_channel(&self, id: &ChannelId) -> Result<(), NetworkError> {
        self.respond(RemoteOp::DeleteChannel, |inner| {
            inner.channel(id)?;
            inner.channels.remove(id);
            inner.messages.remove(id);
            Ok(())
        })
        .await
    }

    async fn list_messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>, NetworkError> {
        self.respond(RemoteOp::ListMessages, |inner| {
            inner.channel(channel_id)?;
            let reissue = inner.reissue_message_ids;
            Ok(inner
                .messages
                .get(channel_id)
                .map(|messages| {
                    messages
                        .iter()
                        .cloned()
                        .map(|mut m| {
                            if reissue {
                                m.id = Uuid::new_v4().to_string();
                            }
                            m
                        })
                        .collect()
                })
                .unwrap_or_default())
        })
        .await
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<Message, NetworkError> {
        self.respond(RemoteOp::SendMessage, |inner| {
            inner.channel(&message.channel_id)?;
            let sent = Message::new(
                Uuid::new_v4().to_string(),
                message.text,
                message.author_id,
                message.author_name,
                inner.tick(),
            );
            inner
                .messages
                .entry(message.channel_id.clone())
                .or_default()
                .push(sent.clone());
            if let Some(channel) = inner.channels.get_mut(&message.channel_id) {
                channel.last_message = Some(sent.text.clone());
                channel.last_activity = Some(sent.timestamp);
            }
            Ok(sent)
        })
        .await
    }
}
