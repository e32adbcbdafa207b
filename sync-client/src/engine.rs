//! SyncEngine - the orchestrator of chatsync.
//!
//! [`SyncEngine`] merges three sources into one published view: the local
//! store, the remote service, and the realtime event stream.
//!
//! # Architecture
//!
//! The merge policy lives in sync-core as pure functions returning
//! [`SyncAction`] lists; the engine interprets those actions and performs
//! the I/O. Every publish re-reads the local store, so observers only ever
//! see merged state, never a raw network payload.
//!
//! ```text
//! Remote ──┐
//!          ├─→ SyncEngine ─→ LocalStore ─→ PublishedState ─→ UI
//! Events ──┘        ↓
//!            sync-core (plans, generations, subscription state)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sync_client::{MemoryStore, MockEventSource, MockRemote, SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(
//!     SyncConfig::default(),
//!     MockRemote::new(),
//!     MockEventSource::new(),
//!     MemoryStore::new(),
//! )?;
//! engine.start().await?;
//!
//! let mut channels = engine.channels();
//! channels.changed().await?;
//! println!("{} channels", channels.borrow().len());
//! ```

use chrono::FixedOffset;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sync_core::{
    is_sorted_by_activity, newest_message, plan_event, plan_send_confirmed, plan_user_delete,
    FetchGenerations, FetchKey, ReconnectPolicy, SubscriptionAction, SubscriptionEvent,
    SubscriptionState, SyncAction, Ticket,
};
use sync_types::{to_millis_precision, Channel, ChannelEvent, ChannelId, Message, OutgoingMessage};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, SyncConfig};
use crate::error::{Result, SyncError};
use crate::events::{EventSource, Subscription};
use crate::published::{MessageList, PublishedState};
use crate::remote::ChatRemote;
use crate::store::{LocalStore, StoreWrite};

/// The synchronization engine.
///
/// Cheap to clone; clones share the same state and background tasks.
pub struct SyncEngine<R, E, S> {
    inner: Arc<Inner<R, E, S>>,
}

struct Inner<R, E, S> {
    config: SyncConfig,
    offset: FixedOffset,
    policy: ReconnectPolicy,
    remote: R,
    events: E,
    store: S,
    published: PublishedState,
    /// Channel whose message session is open.
    active: Mutex<Option<ChannelId>>,
    generations: Mutex<FetchGenerations>,
    /// Serializes store re-reads with their publish, so an older snapshot
    /// can never replace a newer one.
    publish_lock: Mutex<()>,
    stream_state: watch::Sender<SubscriptionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl<R, E, S> Clone for SyncEngine<R, E, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, E, S> SyncEngine<R, E, S>
where
    R: ChatRemote + 'static,
    E: EventSource + 'static,
    S: LocalStore + 'static,
{
    /// Create an engine from its collaborators.
    ///
    /// Nothing runs until [`start`](Self::start).
    pub fn new(
        config: SyncConfig,
        remote: R,
        events: E,
        store: S,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let offset = config.display.offset()?;
        let policy = config.events.policy();
        let published = PublishedState::new(config.publish.external_delete_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                offset,
                policy,
                remote,
                events,
                store,
                published,
                active: Mutex::new(None),
                generations: Mutex::new(FetchGenerations::new()),
                publish_lock: Mutex::new(()),
                stream_state: watch::Sender::new(SubscriptionState::new()),
                tasks: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                shutdown: watch::Sender::new(false),
            }),
        })
    }

    // ===== Lifecycle =====

    /// Publish the cached channel list, then refresh from the remote and
    /// follow the event stream in the background.
    ///
    /// Returns once the cached snapshot is published. Calling it again is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Sync engine already started");
            return Ok(());
        }

        {
            let _guard = self.inner.publish_lock.lock().await;
            let channels = self.inner.store.fetch_channels().await?;
            tracing::info!("Seeding {} cached channels", channels.len());
            self.inner.published.seed_channels(channels);
        }

        let engine = self.clone();
        self.spawn_background(async move {
            if let Err(e) = engine.refresh_channels().await {
                engine.log_absorbed("Initial channel refresh", &e);
            }
            engine.run_event_loop().await;
        })
        .await;

        Ok(())
    }

    /// Cancel the event subscription and stop all background work.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let handles = std::mem::take(&mut *self.inner.tasks.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Background task failed: {}", e);
            }
        }

        let policy = &self.inner.policy;
        self.inner.stream_state.send_modify(|state| {
            let (next, _) = state.clone().on_event(SubscriptionEvent::Cancel, policy);
            *state = next;
        });
        tracing::info!("Sync engine stopped");
    }

    // ===== Channel list =====

    /// Fetch the channel list from the remote, merge it, and publish.
    ///
    /// On failure nothing is published and the error is returned, so the
    /// caller can offer a retry. Returns false if a newer refresh started
    /// while this one was in flight; that refresh publishes instead.
    /// Channels deleted locally while the list was in flight are skipped.
    pub async fn refresh_channels(&self) -> Result<bool> {
        let ticket = self.begin(FetchKey::ChannelList).await;

        let channels = self.inner.remote.list_channels().await.map_err(|e| {
            tracing::warn!("Channel list refresh failed: {}", e);
            e
        })?;
        tracing::debug!("Fetched {} channels", channels.len());

        {
            let generations = self.inner.generations.lock().await;
            if !generations.is_current(&ticket) {
                tracing::info!("Channel list refresh superseded by a newer one");
                return Ok(false);
            }
            let writes = channels
                .into_iter()
                .filter(|channel| {
                    let deleted = generations.deleted_since(&ticket, &channel.id);
                    if deleted {
                        tracing::debug!("Skipping channel {} deleted during refresh", channel.id);
                    }
                    !deleted
                })
                .map(|channel| StoreWrite::UpsertChannel(normalize(channel)))
                .collect();
            self.inner.store.apply(writes).await?;
        }

        self.publish_channels().await?;
        Ok(true)
    }

    /// Create a channel on the remote, then store and publish it.
    ///
    /// Nothing is stored if the remote call fails.
    pub async fn create_channel(&self, name: &str, logo_url: Option<&str>) -> Result<Channel> {
        let channel = self
            .inner
            .remote
            .create_channel(name, logo_url)
            .await
            .map(normalize)
            .map_err(|e| {
                tracing::warn!("Create channel '{}' failed: {}", name, e);
                e
            })?;

        self.inner.store.upsert_channel(channel.clone()).await?;
        self.publish_channels().await?;
        tracing::info!("Created channel {}", channel.id);
        Ok(channel)
    }

    /// Delete a channel on the remote, and locally whatever the remote said.
    ///
    /// The local removal always happens and is published. A remote failure
    /// is returned afterwards; a remote "not found" counts as success. The
    /// external-delete notification is not fired.
    pub async fn delete_channel(&self, id: &ChannelId) -> Result<()> {
        let remote_result = self.inner.remote.delete_channel(id).await;

        let active = self.active_channel().await;
        self.execute(plan_user_delete(id, active.as_ref())).await?;

        match remote_result {
            Ok(()) => {
                tracing::info!("Deleted channel {}", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("Channel {} was already gone on the remote", id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Remote delete of {} failed, removed locally: {}", id, e);
                Err(e.into())
            }
        }
    }

    /// Apply one realtime event.
    ///
    /// Remote failures while re-fetching are logged and absorbed; only
    /// storage failures are returned.
    pub async fn handle_event(&self, event: ChannelEvent) -> Result<()> {
        tracing::debug!("Event {} for channel {}", event.kind, event.resource_id);
        let active = self.active_channel().await;
        self.execute(plan_event(&event, active.as_ref())).await
    }

    // ===== Message session =====

    /// Open the message session for a channel.
    ///
    /// Publishes the cached messages immediately, then syncs with the remote
    /// in the background. The returned receiver follows the session's list.
    pub async fn open_channel(&self, id: &ChannelId) -> Result<watch::Receiver<MessageList>> {
        if self.inner.store.fetch_channel(id).await?.is_none() {
            return Err(SyncError::UnknownChannel(id.clone()));
        }

        *self.inner.active.lock().await = Some(id.clone());
        let rx = self.inner.published.messages();
        self.publish_messages(id).await?;
        tracing::debug!("Opened session for channel {}", id);

        let engine = self.clone();
        let id = id.clone();
        self.spawn_background(async move {
            if let Err(e) = engine.refresh_messages(&id).await {
                engine.log_absorbed("Message sync", &e);
            }
        })
        .await;

        Ok(rx)
    }

    /// Fetch a channel's messages from the remote, merge them, and publish.
    ///
    /// Used for the "try again" action of a message list.
    pub async fn refresh_messages(&self, id: &ChannelId) -> Result<()> {
        if self.inner.store.fetch_channel(id).await?.is_none() {
            return Err(SyncError::UnknownChannel(id.clone()));
        }

        if self.sync_messages(id).await? {
            self.publish_messages(id).await?;
            self.publish_channels().await?;
        }
        Ok(())
    }

    /// End the active session and publish an empty message list.
    pub async fn close_channel(&self) {
        let _guard = self.inner.publish_lock.lock().await;
        if let Some(id) = self.inner.active.lock().await.take() {
            tracing::debug!("Closed session for channel {}", id);
        }
        self.inner.published.publish_messages(MessageList::empty());
    }

    /// Send a message to a channel as the configured author.
    ///
    /// Nothing is stored unless the remote confirms the send. The confirmed
    /// message and the channel preview are stored together; then the channel
    /// is re-fetched and both lists are published.
    pub async fn send_message(&self, channel_id: &ChannelId, text: &str) -> Result<Message> {
        if self.inner.store.fetch_channel(channel_id).await?.is_none() {
            return Err(SyncError::UnknownChannel(channel_id.clone()));
        }

        let outgoing = OutgoingMessage {
            channel_id: channel_id.clone(),
            text: text.to_string(),
            author_id: self.inner.config.author.id.clone(),
            author_name: self.inner.config.author.name.clone(),
        };
        let mut sent = self.inner.remote.send_message(outgoing).await.map_err(|e| {
            tracing::warn!("Send to {} failed: {}", channel_id, e);
            e
        })?;
        sent.timestamp = to_millis_precision(sent.timestamp);

        self.inner
            .store
            .apply(vec![
                StoreWrite::UpsertMessage {
                    channel_id: channel_id.clone(),
                    message: sent.clone(),
                },
                StoreWrite::UpdatePreview {
                    channel_id: channel_id.clone(),
                    text: sent.text.clone(),
                    at: sent.timestamp,
                },
            ])
            .await?;

        self.execute(plan_send_confirmed(channel_id)).await?;
        Ok(sent)
    }

    // ===== Published state =====

    /// Observe the channel list.
    pub fn channels(&self) -> watch::Receiver<Vec<Channel>> {
        self.inner.published.channels()
    }

    /// Observe the active session's message list.
    pub fn messages(&self) -> watch::Receiver<MessageList> {
        self.inner.published.messages()
    }

    /// Observe channels deleted by someone else while this engine was running.
    pub fn external_deletes(&self) -> broadcast::Receiver<ChannelId> {
        self.inner.published.external_deletes()
    }

    /// Observe the event subscription lifecycle.
    pub fn stream_state(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.stream_state.subscribe()
    }

    /// The channel whose message session is open, if any.
    pub async fn active_channel(&self) -> Option<ChannelId> {
        self.inner.active.lock().await.clone()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// The local store (for inspection and tests).
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The remote client (for inspection and tests).
    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    // ===== Action interpreter =====

    async fn execute(&self, actions: Vec<SyncAction>) -> Result<()> {
        for action in actions {
            match action {
                SyncAction::RefetchChannel(id) => {
                    let outcome = self.refetch_channel(&id).await;
                    self.absorb_network(outcome, "Channel re-fetch", &id)?;
                }
                SyncAction::RefetchMessages(id) => {
                    let outcome = self.sync_messages(&id).await.map(|_| ());
                    self.absorb_network(outcome, "Message re-fetch", &id)?;
                }
                SyncAction::DeleteLocal(id) => self.delete_local(&id).await?,
                SyncAction::EndSession(id) => self.end_session(&id).await,
                SyncAction::NotifyExternalDelete(id) => {
                    tracing::info!("Channel {} was deleted remotely", id);
                    self.inner.published.notify_external_delete(id);
                }
                SyncAction::PublishChannels => self.publish_channels().await?,
                SyncAction::PublishMessages(id) => self.publish_messages(&id).await?,
            }
        }
        Ok(())
    }

    fn absorb_network(&self, outcome: Result<()>, what: &str, id: &ChannelId) -> Result<()> {
        match outcome {
            Err(SyncError::Network(e)) => {
                tracing::warn!("{} for {} failed: {}", what, id, e);
                Ok(())
            }
            other => other,
        }
    }

    async fn refetch_channel(&self, id: &ChannelId) -> Result<()> {
        let ticket = self.begin(FetchKey::Channel(id.clone())).await;
        let channel = normalize(self.inner.remote.fetch_channel(id).await?);
        self.apply_if_current(&ticket, vec![StoreWrite::UpsertChannel(channel)])
            .await?;
        Ok(())
    }

    /// Fetch and store a channel's messages plus the preview of the newest.
    ///
    /// Returns false if the response was superseded and discarded.
    async fn sync_messages(&self, id: &ChannelId) -> Result<bool> {
        let ticket = self.begin(FetchKey::Messages(id.clone())).await;
        let mut messages = self.inner.remote.list_messages(id).await?;
        for message in &mut messages {
            message.timestamp = to_millis_precision(message.timestamp);
        }
        tracing::debug!("Fetched {} messages for {}", messages.len(), id);

        let preview = newest_message(&messages).map(|newest| StoreWrite::UpdatePreview {
            channel_id: id.clone(),
            text: newest.text.clone(),
            at: newest.timestamp,
        });
        let writes = messages
            .into_iter()
            .map(|message| StoreWrite::UpsertMessage {
                channel_id: id.clone(),
                message,
            })
            .chain(preview)
            .collect();

        self.apply_if_current(&ticket, writes).await
    }

    async fn delete_local(&self, id: &ChannelId) -> Result<()> {
        let mut generations = self.inner.generations.lock().await;
        generations.invalidate_channel(id);
        self.inner.store.delete_channel(id).await?;
        Ok(())
    }

    async fn end_session(&self, id: &ChannelId) {
        let _guard = self.inner.publish_lock.lock().await;
        let mut active = self.inner.active.lock().await;
        if active.as_ref() == Some(id) {
            *active = None;
            self.inner.published.publish_messages(MessageList::empty());
            tracing::debug!("Ended session for deleted channel {}", id);
        }
    }

    async fn begin(&self, key: FetchKey) -> Ticket {
        self.inner.generations.lock().await.begin(key)
    }

    /// Apply `writes` unless a newer fetch for the same key was started.
    ///
    /// The generations lock is held across the write so a concurrent local
    /// delete cannot slip between the check and the write.
    async fn apply_if_current(&self, ticket: &Ticket, writes: Vec<StoreWrite>) -> Result<bool> {
        let generations = self.inner.generations.lock().await;
        if !generations.is_current(ticket) {
            tracing::debug!("Discarding stale response for {:?}", ticket.key());
            return Ok(false);
        }
        self.inner.store.apply(writes).await?;
        Ok(true)
    }

    async fn publish_channels(&self) -> Result<()> {
        let _guard = self.inner.publish_lock.lock().await;
        let channels = self.inner.store.fetch_channels().await?;
        debug_assert!(is_sorted_by_activity(&channels));
        if self.inner.published.publish_channels(channels) {
            tracing::debug!("Published channel list");
        }
        Ok(())
    }

    async fn publish_messages(&self, id: &ChannelId) -> Result<()> {
        let _guard = self.inner.publish_lock.lock().await;
        if self.inner.active.lock().await.as_ref() != Some(id) {
            return Ok(());
        }
        let messages = self.inner.store.fetch_messages(id).await?;
        let list = MessageList::new(id.clone(), messages, self.inner.offset);
        if self.inner.published.publish_messages(list) {
            tracing::debug!("Published messages for {}", id);
        }
        Ok(())
    }

    // ===== Background work =====

    async fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.inner.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task => {}
                _ = shutdown_requested(&mut shutdown) => {}
            }
        });

        let mut tasks = self.inner.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn run_event_loop(&self) {
        let policy = &self.inner.policy;
        let mut state = SubscriptionState::new();
        let mut event = SubscriptionEvent::Start;
        let mut subscription: Option<Subscription> = None;

        loop {
            let reconnecting =
                matches!(state, SubscriptionState::Subscribing { attempt } if attempt > 0);
            let (next, actions) = state.on_event(event, policy);
            state = next;
            self.inner.stream_state.send_replace(state.clone());

            let mut follow_up = None;
            for action in actions {
                follow_up = match action {
                    SubscriptionAction::Subscribe => Some(match self.inner.events.subscribe().await {
                        Ok(sub) => {
                            tracing::info!("Subscribed to channel events");
                            subscription = Some(sub);
                            SubscriptionEvent::Subscribed
                        }
                        Err(e) => {
                            tracing::warn!("Event subscription failed: {}", e);
                            SubscriptionEvent::SubscribeFailed {
                                error: e.to_string(),
                            }
                        }
                    }),
                    SubscriptionAction::Consume => {
                        if reconnecting {
                            // Missed events are never replayed.
                            if let Err(e) = self.refresh_channels().await {
                                self.log_absorbed("Catch-up refresh", &e);
                            }
                        }
                        let reason = match subscription.take() {
                            Some(sub) => self.consume(sub).await,
                            None => "no subscription".to_string(),
                        };
                        Some(SubscriptionEvent::StreamEnded { reason })
                    }
                    SubscriptionAction::ScheduleRetry { attempt, delay } => {
                        tracing::info!("Resubscribing in {:?} (attempt {})", delay, attempt);
                        tokio::time::sleep(delay).await;
                        Some(SubscriptionEvent::RetryTimer)
                    }
                    SubscriptionAction::Stop => None,
                };
            }

            match follow_up {
                Some(next_event) => event = next_event,
                None => {
                    tracing::info!("Event loop stopped");
                    return;
                }
            }
        }
    }

    /// Apply events until the stream ends. Returns why it ended.
    async fn consume(&self, mut subscription: Subscription) -> String {
        loop {
            match subscription.next().await {
                Some(Ok(event)) => {
                    if let Err(e) = self.handle_event(event).await {
                        self.log_absorbed("Event handling", &e);
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Event stream failed: {}", e);
                    subscription.cancel();
                    return e.to_string();
                }
                None => {
                    tracing::info!("Event stream closed");
                    return "stream closed".to_string();
                }
            }
        }
    }

    fn log_absorbed(&self, what: &str, error: &SyncError) {
        match error {
            SyncError::Storage(_) => tracing::error!("{} failed: {}", what, error),
            _ => tracing::warn!("{} failed: {}", what, error),
        }
    }
}

/// Truncate a remote channel's activity to the store's millisecond precision.
fn normalize(mut channel: Channel) -> Channel {
    channel.last_activity = channel.last_activity.map(to_millis_precision);
    channel
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    // An error means the engine is gone, which is a shutdown too.
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventsConfig;
    use crate::events::MockEventSource;
    use crate::remote::{MockRemote, RemoteOp};
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;
    use sync_types::NetworkError;

    type TestEngine = SyncEngine<MockRemote, MockEventSource, MemoryStore>;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn engine_with(store: MemoryStore, remote: MockRemote) -> TestEngine {
        let config = SyncConfig::default()
            .with_author("u-me", "Me")
            .with_events(EventsConfig::immediate());
        SyncEngine::new(config, remote, MockEventSource::new(), store).unwrap()
    }

    fn engine() -> TestEngine {
        engine_with(MemoryStore::new(), MockRemote::new())
    }

    fn id(s: &str) -> ChannelId {
        ChannelId::from(s)
    }

    // ===== Construction =====

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SyncConfig::default();
        config.display.utc_offset_minutes = 10_000;
        let result = SyncEngine::new(
            config,
            MockRemote::new(),
            MockEventSource::new(),
            MemoryStore::new(),
        );
        assert!(result.is_err());
    }

    // ===== Channel list =====

    #[tokio::test]
    async fn refresh_merges_and_publishes() {
        let engine = engine();
        engine
            .remote()
            .insert_channel(Channel::new("1", "One").with_last_message("hi", at(10)));
        engine
            .remote()
            .insert_channel(Channel::new("2", "Two").with_last_message("yo", at(20)));

        engine.refresh_channels().await.unwrap();

        let published = engine.channels().borrow().clone();
        let ids: Vec<_> = published.iter().map(|c| c.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn failed_refresh_publishes_nothing() {
        let engine = engine();
        engine
            .store()
            .upsert_channel(Channel::new("1", "Cached"))
            .await
            .unwrap();
        engine.inner.published.seed_channels(vec![Channel::new("1", "Cached")]);
        let mut rx = engine.channels();
        rx.borrow_and_update();

        engine
            .remote()
            .fail_next(RemoteOp::ListChannels, NetworkError::Status { code: 500 });
        let err = engine.refresh_channels().await.unwrap_err();

        assert!(err.is_retryable());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn create_stores_and_returns_channel() {
        let engine = engine();
        let created = engine.create_channel("general", None).await.unwrap();

        assert_eq!(engine.channels().borrow().as_slice(), &[created.clone()]);
        assert!(engine.store().fetch_channel(&created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_create_leaves_store_untouched() {
        let engine = engine();
        engine
            .remote()
            .fail_next(RemoteOp::CreateChannel, NetworkError::Transport("offline".into()));

        assert!(engine.create_channel("general", None).await.is_err());
        assert!(engine.store().fetch_channels().await.unwrap().is_empty());
    }

    // ===== Deletes =====

    #[tokio::test]
    async fn user_delete_is_local_wins() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        engine
            .remote()
            .fail_next(RemoteOp::DeleteChannel, NetworkError::Status { code: 503 });

        let err = engine.delete_channel(&id("1")).await.unwrap_err();

        assert!(matches!(err, SyncError::Network(_)));
        assert!(engine.store().fetch_channel(&id("1")).await.unwrap().is_none());
        assert!(engine.channels().borrow().is_empty());
    }

    #[tokio::test]
    async fn user_delete_of_missing_remote_channel_succeeds() {
        let engine = engine();
        engine
            .store()
            .upsert_channel(Channel::new("1", "One"))
            .await
            .unwrap();

        engine.delete_channel(&id("1")).await.unwrap();
        assert!(engine.store().fetch_channel(&id("1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_delete_does_not_notify_external_delete() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        let mut deletes = engine.external_deletes();

        engine.delete_channel(&id("1")).await.unwrap();

        assert!(matches!(
            deletes.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn delete_event_notifies_and_ends_session() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        let rx = engine.open_channel(&id("1")).await.unwrap();
        let mut deletes = engine.external_deletes();

        engine.handle_event(ChannelEvent::delete("1")).await.unwrap();

        assert_eq!(deletes.try_recv().unwrap(), id("1"));
        assert!(engine.active_channel().await.is_none());
        assert_eq!(*rx.borrow(), MessageList::empty());
        assert!(engine.channels().borrow().is_empty());
    }

    // ===== Events =====

    #[tokio::test]
    async fn add_event_refetches_channel() {
        let engine = engine();
        engine
            .remote()
            .insert_channel(Channel::new("9", "Nine").with_last_message("new", at(5)));

        engine.handle_event(ChannelEvent::add("9")).await.unwrap();

        let channels = engine.channels().borrow().clone();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].last_message.as_deref(), Some("new"));
        assert_eq!(engine.remote().call_count(RemoteOp::FetchChannel), 1);
    }

    #[tokio::test]
    async fn event_refetch_failure_is_absorbed() {
        let engine = engine();
        engine
            .remote()
            .fail_next(RemoteOp::FetchChannel, NetworkError::Transport("reset".into()));

        engine.handle_event(ChannelEvent::update("1")).await.unwrap();
        assert!(engine.channels().borrow().is_empty());
    }

    #[tokio::test]
    async fn update_event_refetches_messages_of_active_channel() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        *engine.inner.active.lock().await = Some(id("1"));

        engine
            .remote()
            .insert_message(&id("1"), Message::new("m", "late", "u", "U", at(30)));
        engine.handle_event(ChannelEvent::update("1")).await.unwrap();

        assert_eq!(engine.remote().call_count(RemoteOp::ListMessages), 1);
        let list = engine.messages().borrow().clone();
        assert_eq!(list.messages.len(), 1);
        assert_eq!(list.messages[0].text, "late");
    }

    // ===== Messages =====

    #[tokio::test]
    async fn open_unknown_channel_fails() {
        let engine = engine();
        let err = engine.open_channel(&id("nope")).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownChannel(_)));
    }

    #[tokio::test]
    async fn open_channel_publishes_cache_first() {
        let store = MemoryStore::new();
        store.upsert_channel(Channel::new("1", "One")).await.unwrap();
        store
            .upsert_message(&id("1"), Message::new("c", "cached", "u", "U", at(1)))
            .await
            .unwrap();
        let remote = MockRemote::new();
        remote.insert_channel(Channel::new("1", "One"));
        remote.delay_next(RemoteOp::ListMessages, Duration::from_secs(60));
        let engine = engine_with(store, remote);

        let rx = engine.open_channel(&id("1")).await.unwrap();

        let list = rx.borrow().clone();
        assert!(list.is_for(&id("1")));
        assert_eq!(list.messages[0].text, "cached");
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn refresh_messages_updates_preview() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        engine
            .remote()
            .insert_message(&id("1"), Message::new("a", "older", "u", "U", at(1)));
        engine
            .remote()
            .insert_message(&id("1"), Message::new("b", "newest", "u", "U", at(2)));

        engine.refresh_messages(&id("1")).await.unwrap();

        let channel = engine.store().fetch_channel(&id("1")).await.unwrap().unwrap();
        assert_eq!(channel.last_message.as_deref(), Some("newest"));
        assert_eq!(channel.last_activity, Some(at(2)));
    }

    #[tokio::test]
    async fn close_channel_publishes_empty_list() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        let rx = engine.open_channel(&id("1")).await.unwrap();

        engine.close_channel().await;

        assert!(engine.active_channel().await.is_none());
        assert_eq!(rx.borrow().channel_id, None);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn send_stores_confirmed_message_and_refetches_channel() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        engine.remote().set_clock(at(100));

        let sent = engine.send_message(&id("1"), "hello").await.unwrap();

        assert_eq!(sent.author_id, "u-me");
        let stored = engine.store().fetch_messages(&id("1")).await.unwrap();
        assert_eq!(stored, vec![sent.clone()]);
        let channel = engine.channels().borrow()[0].clone();
        assert_eq!(channel.last_message.as_deref(), Some("hello"));
        assert!(channel.last_activity >= Some(sent.timestamp));
        assert_eq!(engine.remote().call_count(RemoteOp::FetchChannel), 1);
    }

    #[tokio::test]
    async fn failed_send_writes_nothing() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        engine
            .remote()
            .fail_next(RemoteOp::SendMessage, NetworkError::Status { code: 502 });

        let err = engine.send_message(&id("1"), "hello").await.unwrap_err();

        assert!(err.is_retryable());
        assert!(engine.store().fetch_messages(&id("1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_keeps_local_preview_when_refetch_fails() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();
        engine
            .remote()
            .fail_next(RemoteOp::FetchChannel, NetworkError::Transport("reset".into()));

        engine.send_message(&id("1"), "hello").await.unwrap();

        let channel = engine.store().fetch_channel(&id("1")).await.unwrap().unwrap();
        assert_eq!(channel.last_message.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn send_to_unknown_channel_fails_without_remote_call() {
        let engine = engine();
        let err = engine.send_message(&id("x"), "hi").await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownChannel(_)));
        assert_eq!(engine.remote().call_count(RemoteOp::SendMessage), 0);
    }

    // ===== Stale responses =====

    #[tokio::test(start_paused = true)]
    async fn stale_channel_fetch_is_discarded() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine.refresh_channels().await.unwrap();

        // First re-fetch sees the old record but answers late.
        engine
            .remote()
            .delay_next(RemoteOp::FetchChannel, Duration::from_secs(10));
        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.handle_event(ChannelEvent::update("1")).await })
        };
        tokio::task::yield_now().await;

        engine
            .remote()
            .insert_channel(Channel::new("1", "One").with_last_message("fresh", at(50)));
        engine.handle_event(ChannelEvent::update("1")).await.unwrap();
        slow.await.unwrap().unwrap();

        let channel = engine.store().fetch_channel(&id("1")).await.unwrap().unwrap();
        assert_eq!(channel.last_message.as_deref(), Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_started_before_delete_cannot_resurrect() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine
            .remote()
            .delay_next(RemoteOp::FetchChannel, Duration::from_secs(10));
        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.handle_event(ChannelEvent::add("1")).await })
        };
        tokio::task::yield_now().await;

        engine.handle_event(ChannelEvent::delete("1")).await.unwrap();
        slow.await.unwrap().unwrap();

        assert!(engine.store().fetch_channel(&id("1")).await.unwrap().is_none());
        assert!(engine.channels().borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn list_refresh_survives_unrelated_delete() {
        let engine = engine();
        engine.store().upsert_channel(Channel::new("x", "X")).await.unwrap();
        engine.remote().insert_channel(Channel::new("x", "X"));
        engine.remote().insert_channel(Channel::new("y", "Y"));
        engine
            .remote()
            .delay_next(RemoteOp::ListChannels, Duration::from_secs(10));
        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh_channels().await })
        };
        tokio::task::yield_now().await;

        engine.handle_event(ChannelEvent::delete("x")).await.unwrap();
        let applied = slow.await.unwrap().unwrap();

        assert!(applied);
        assert!(engine.store().fetch_channel(&id("x")).await.unwrap().is_none());
        assert!(engine.store().fetch_channel(&id("y")).await.unwrap().is_some());
        let published: Vec<_> = engine.channels().borrow().iter().map(|c| c.id.clone()).collect();
        assert_eq!(published, vec![id("y")]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_list_refresh_reports_not_applied() {
        let engine = engine();
        engine.remote().insert_channel(Channel::new("1", "One"));
        engine
            .remote()
            .delay_next(RemoteOp::ListChannels, Duration::from_secs(10));
        let slow = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.refresh_channels().await })
        };
        tokio::task::yield_now().await;

        assert!(engine.refresh_channels().await.unwrap());
        assert!(!slow.await.unwrap().unwrap());
        assert_eq!(engine.channels().borrow().len(), 1);
    }

    #[tokio::test]
    async fn remote_activity_is_truncated_to_millis() {
        let engine = engine();
        let mut channel = Channel::new("1", "One");
        channel.last_activity = Some(Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap());
        engine.remote().insert_channel(channel);

        engine.refresh_channels().await.unwrap();

        let published = engine.channels().borrow()[0].clone();
        assert_eq!(
            published.last_activity,
            Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap())
        );
    }

    // ===== Lifecycle =====

    #[tokio::test]
    async fn start_seeds_cache_then_refreshes() {
        let store = MemoryStore::new();
        store
            .upsert_channel(Channel::new("1", "Cached").with_last_activity(at(1)))
            .await
            .unwrap();
        let remote = MockRemote::new();
        remote.insert_channel(Channel::new("1", "Cached").with_last_message("remote", at(9)));
        let engine = engine_with(store, remote);
        let mut rx = engine.channels();

        engine.start().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        let refreshed = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|c| c.first().and_then(|c| c.last_message.as_deref()) == Some("remote")),
        )
        .await;
        assert!(matches!(refreshed, Ok(Ok(_))));
        drop(refreshed);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_event_loop() {
        let engine = engine();
        let events = engine.inner.events.clone();
        engine.start().await.unwrap();
        events.wait_for_subscriptions(1).await;

        engine.shutdown().await;

        assert!(engine.stream_state().borrow().is_stopped());
        assert_eq!(events.active_subscribers(), 0);
    }

    #[tokio::test]
    async fn start_twice_is_a_no_op() {
        let engine = engine();
        engine.start().await.unwrap();
        engine.start().await.unwrap();
        engine.inner.events.wait_for_subscriptions(1).await;

        assert_eq!(engine.inner.tasks.lock().await.len(), 1);
        engine.shutdown().await;
    }
}
