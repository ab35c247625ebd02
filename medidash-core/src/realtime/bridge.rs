//! The real-time sync bridge.
//!
//! Keeps a cache entry consistent with a remote table by combining a pull
//! (the caller's fetch function) with a push (a change channel). Change
//! notifications never patch the cache directly; they mark the entry stale
//! and trigger a refetch.

use std::collections::HashMap;
use std::future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::error::{BridgeError, FetchError};
use super::ports::{ChannelProvider, ChannelRef, FetchFn, Notice, Notifier, TracingNotifier};
use super::retry::{fetch_with_retry, FetchOutcome, RetryPolicy};
use super::state::{ChannelEvent, ChannelSignal, ChannelState, ChannelStatus, Effect};
use crate::cache::{CacheKey, QueryCache};

/// Delay between `attach` and channel creation.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// The pair at most one channel may exist for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub table: String,
    pub cache_key: CacheKey,
}

impl ChannelKey {
    pub fn new(table: impl Into<String>, cache_key: CacheKey) -> Self {
        Self {
            table: table.into(),
            cache_key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Connection health and freshness of one attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub status: ChannelStatus,
    pub status_changed_at: DateTime<Utc>,
    /// When the cache was last filled by a successful fetch.
    pub last_updated: Option<DateTime<Utc>>,
    /// Last transient failure that exhausted its retries; cleared on success.
    pub error: Option<FetchError>,
    /// Set when the table cannot be read at all (not found / denied).
    pub unavailable: Option<FetchError>,
}

impl SyncStatus {
    fn connecting() -> Self {
        Self {
            status: ChannelStatus::Connecting,
            status_changed_at: Utc::now(),
            last_updated: None,
            error: None,
            unavailable: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == ChannelStatus::Degraded
    }
}

/// Channel state and the provider channel, guarded together so a closed
/// attachment can neither publish nor subscribe again.
struct Link {
    state: ChannelState,
    channel: Option<ChannelRef>,
}

struct Shared<R> {
    key: ChannelKey,
    fetch: FetchFn<R>,
    link: Mutex<Link>,
    status: watch::Sender<SyncStatus>,
    /// True once the initial fetch settled or the attachment closed.
    loaded: watch::Sender<bool>,
}

impl<R> Shared<R> {
    fn is_alive(&self) -> bool {
        lock(&self.link).state.status() != ChannelStatus::Closed
    }

    fn publish(&self, update: impl FnOnce(&mut SyncStatus)) {
        self.status.send_modify(update);
    }

    fn publish_state(&self, state: &ChannelState) {
        self.publish(|s| {
            s.status = state.status();
            s.status_changed_at = state.changed_at();
        });
    }

    /// Runs a provider event through the state machine and publishes the
    /// resulting status. Once closed every event is a no-op.
    fn apply(&self, event: &ChannelEvent) -> Effect {
        let mut link = lock(&self.link);
        let effect = link.state.apply(event);
        if matches!(
            effect,
            Effect::StatusChanged | Effect::Degraded { .. } | Effect::Recovered
        ) {
            self.publish_state(&link.state);
        }
        effect
    }

    /// Moves to closed and hands back the channel to release, if any.
    fn close(&self) -> Option<ChannelRef> {
        let channel = {
            let mut link = lock(&self.link);
            if !link.state.close() {
                return None;
            }
            self.publish_state(&link.state);
            link.channel.take()
        };
        self.loaded.send_replace(true);
        channel
    }
}

struct Attachment<R> {
    generation: u64,
    shared: Arc<Shared<R>>,
    driver: JoinHandle<()>,
}

/// Returned by [`SyncBridge::attach`]; pass it back to `detach`.
pub struct BridgeHandle<R> {
    generation: u64,
    shared: Arc<Shared<R>>,
}

impl<R> Clone for BridgeHandle<R> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            shared: self.shared.clone(),
        }
    }
}

impl<R> std::fmt::Debug for BridgeHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("key", &self.shared.key)
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<R> BridgeHandle<R> {
    pub fn key(&self) -> &ChannelKey {
        &self.shared.key
    }

    pub fn table(&self) -> &str {
        &self.shared.key.table
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.shared.key.cache_key
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that wakes on every status or freshness change.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Waits for the initial fetch to settle and returns the status it left.
    ///
    /// Returns early if the handle is closed while the fetch is in flight.
    pub async fn loaded(&self) -> SyncStatus {
        let mut loaded = self.shared.loaded.subscribe();
        let _ = loaded.wait_for(|done| *done).await;
        self.status()
    }

    /// True once detached or superseded by a newer attach for the same pair.
    pub fn is_closed(&self) -> bool {
        !self.shared.is_alive()
    }
}

struct Inner<R, P, C> {
    provider: P,
    cache: Arc<C>,
    notifier: Arc<dyn Notifier>,
    config: BridgeConfig,
    attachments: Mutex<HashMap<ChannelKey, Attachment<R>>>,
    generations: AtomicU64,
}

/// Sync bridge over a channel provider `P` and a cache `C` of rows `R`.
pub struct SyncBridge<R, P, C> {
    inner: Arc<Inner<R, P, C>>,
}

impl<R, P, C> Clone for SyncBridge<R, P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R, P, C> SyncBridge<R, P, C>
where
    R: Clone + Send + Sync + 'static,
    P: ChannelProvider,
    C: QueryCache<R> + 'static,
{
    pub fn new(provider: P, cache: Arc<C>) -> Self {
        Self::build(provider, cache, BridgeConfig::default(), Arc::new(TracingNotifier))
    }

    pub fn with_config(self, config: BridgeConfig) -> Self {
        self.rebuild(|parts| parts.config = config)
    }

    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        self.rebuild(|parts| parts.notifier = notifier)
    }

    fn build(provider: P, cache: Arc<C>, config: BridgeConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                cache,
                notifier,
                config,
                attachments: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Only valid before the first attach, while `inner` is not shared.
    fn rebuild(self, change: impl FnOnce(&mut Inner<R, P, C>)) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                change(&mut inner);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                tracing::warn!("bridge already in use, ignoring reconfiguration");
                Self { inner }
            }
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.inner.cache
    }

    /// Starts keeping `cache_key` in sync with `table`.
    ///
    /// Any previous attachment for the same pair is torn down first. The
    /// handle comes back right away while the initial fetch runs in the
    /// background; await [`BridgeHandle::loaded`] for its outcome. A failed
    /// fetch is recorded in the handle's status rather than returned, so the
    /// view can still show a retry affordance and receive live updates.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(
        &self,
        table: &str,
        cache_key: impl Into<CacheKey>,
        fetch: FetchFn<R>,
    ) -> Result<BridgeHandle<R>, BridgeError> {
        let table = table.trim();
        if table.is_empty() {
            return Err(BridgeError::EmptyTable);
        }

        let key = ChannelKey::new(table, cache_key.into());
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (status, _) = watch::channel(SyncStatus::connecting());
        let (loaded, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            key: key.clone(),
            fetch,
            link: Mutex::new(Link {
                state: ChannelState::new(table),
                channel: None,
            }),
            status,
            loaded,
        });

        let mut attachments = lock(&self.inner.attachments);
        if let Some(previous) = attachments.remove(&key) {
            tracing::debug!(
                "superseding channel for {}/{} (generation {})",
                key.table,
                key.cache_key,
                previous.generation
            );
            self.inner.teardown(previous);
        }
        let driver = tokio::spawn(drive(self.inner.clone(), shared.clone()));
        attachments.insert(
            key,
            Attachment {
                generation,
                shared: shared.clone(),
                driver,
            },
        );

        Ok(BridgeHandle { generation, shared })
    }

    /// Stops syncing. Safe to call any number of times, on any handle.
    pub fn detach(&self, handle: &BridgeHandle<R>) {
        let attachment = {
            let mut attachments = lock(&self.inner.attachments);
            match attachments.get(handle.key()) {
                Some(current) if current.generation == handle.generation => {
                    attachments.remove(handle.key())
                }
                _ => None,
            }
        };

        match attachment {
            Some(attachment) => self.inner.teardown(attachment),
            None => tracing::trace!(
                "detach ignored for inactive handle {}/{}",
                handle.table(),
                handle.cache_key()
            ),
        }
    }

    /// Tears down every attachment.
    pub fn detach_all(&self) {
        let drained: Vec<_> = lock(&self.inner.attachments)
            .drain()
            .map(|(_, attachment)| attachment)
            .collect();
        for attachment in drained {
            self.inner.teardown(attachment);
        }
    }

    /// Refetches on demand: the manual retry after a failed load.
    pub async fn refresh(&self, handle: &BridgeHandle<R>) -> Result<FetchOutcome<R>, FetchError> {
        self.inner.load(&handle.shared).await
    }

    pub fn status(&self, handle: &BridgeHandle<R>) -> SyncStatus {
        handle.status()
    }

    /// Current cached rows for the handle's key, stale or not.
    pub fn rows(&self, handle: &BridgeHandle<R>) -> Option<Vec<R>> {
        self.inner.cache.get(handle.cache_key())
    }

    pub fn active_attachments(&self) -> usize {
        lock(&self.inner.attachments).len()
    }
}

impl<R, P, C> Inner<R, P, C>
where
    R: Clone + Send + Sync + 'static,
    P: ChannelProvider,
    C: QueryCache<R> + 'static,
{
    async fn load(&self, shared: &Shared<R>) -> Result<FetchOutcome<R>, FetchError> {
        let result = fetch_with_retry(&shared.fetch, &self.config.retry).await;
        self.store(shared, &result);
        result
    }

    /// Writes a fetch result into the cache and status, unless torn down.
    fn store(&self, shared: &Shared<R>, result: &Result<FetchOutcome<R>, FetchError>) {
        let link = lock(&shared.link);
        if link.state.status() == ChannelStatus::Closed {
            tracing::debug!(
                "discarding fetch result for detached {}/{}",
                shared.key.table,
                shared.key.cache_key
            );
            return;
        }

        match result {
            Ok(FetchOutcome::Fresh(rows)) => {
                self.cache.set(&shared.key.cache_key, rows.clone());
                shared.publish(|s| {
                    s.last_updated = Some(Utc::now());
                    s.error = None;
                    s.unavailable = None;
                });
            }
            Ok(FetchOutcome::Unavailable(e)) => {
                self.cache.set(&shared.key.cache_key, Vec::new());
                shared.publish(|s| {
                    s.error = None;
                    s.unavailable = Some(e.clone());
                });
            }
            Err(e) => {
                // Keep whatever is cached; only the status reflects the failure.
                shared.publish(|s| s.error = Some(e.clone()));
            }
        }
    }

    /// Never fails: errors are logged and dropped.
    fn teardown(&self, attachment: Attachment<R>) {
        let shared = attachment.shared;
        let channel = shared.close();
        attachment.driver.abort();

        if let Some(channel) = channel {
            let id = channel.id();
            match self.provider.unsubscribe(channel) {
                Ok(()) => tracing::debug!("unsubscribed channel {} for '{}'", id, shared.key.table),
                Err(e) => tracing::warn!(
                    "ignoring teardown error for '{}': {}",
                    shared.key.table,
                    e
                ),
            }
        }
    }

    fn degraded(&self, shared: &Shared<R>, notify: bool) {
        if notify {
            self.notifier.notify(Notice::LiveUpdatesUnavailable {
                table: shared.key.table.clone(),
            });
        }
    }
}

/// A refetch triggered by change events.
struct Refetch<R> {
    fetch: BoxFuture<'static, Result<FetchOutcome<R>, FetchError>>,
    started: Arc<AtomicBool>,
    /// A change arrived after the request went out, so its rows may predate it.
    trailing: bool,
}

impl<R: Send + 'static> Refetch<R> {
    fn start(shared: &Shared<R>, policy: RetryPolicy) -> Self {
        let fetch = shared.fetch.clone();
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        Self {
            fetch: Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                fetch_with_retry(&fetch, &policy).await
            }),
            started,
            trailing: false,
        }
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// Per-attachment task: the initial fetch runs alongside the debounced
/// subscription.
async fn drive<R, P, C>(inner: Arc<Inner<R, P, C>>, shared: Arc<Shared<R>>)
where
    R: Clone + Send + Sync + 'static,
    P: ChannelProvider,
    C: QueryCache<R> + 'static,
{
    let initial = async {
        let _ = inner.load(&*shared).await;
        shared.loaded.send_replace(true);
    };
    tokio::join!(initial, follow(&*inner, &*shared));
}

/// Debounce, subscribe, then react to channel events until the channel ends.
async fn follow<R, P, C>(inner: &Inner<R, P, C>, shared: &Shared<R>)
where
    R: Clone + Send + Sync + 'static,
    P: ChannelProvider,
    C: QueryCache<R> + 'static,
{
    if !inner.config.debounce.is_zero() {
        tokio::time::sleep(inner.config.debounce).await;
    }

    let table = shared.key.table.clone();
    let (sink, mut events) = mpsc::unbounded_channel();

    let subscribed = {
        let mut link = lock(&shared.link);
        if link.state.status() == ChannelStatus::Closed {
            return;
        }
        match inner.provider.subscribe(&table, sink) {
            Ok(channel) => {
                tracing::debug!("subscribed channel {} for '{}'", channel.id(), table);
                link.channel = Some(channel);
                true
            }
            Err(e) => {
                tracing::warn!("failed to subscribe to '{}': {}", table, e);
                false
            }
        }
    };

    if !subscribed {
        if let Effect::Degraded { notify } =
            shared.apply(&ChannelEvent::Status(ChannelSignal::ChannelError))
        {
            inner.degraded(shared, notify);
        }
        return;
    }

    let mut refetch: Option<Refetch<R>> = None;
    let mut sink_open = true;

    while sink_open || refetch.is_some() {
        tokio::select! {
            // Queued events are drained before the refetch is polled.
            biased;

            event = events.recv(), if sink_open => {
                let event = match event {
                    Some(event) => event,
                    None => {
                        tracing::debug!("channel for '{}' dropped by provider", table);
                        sink_open = false;
                        ChannelEvent::Status(ChannelSignal::Closed)
                    }
                };

                match shared.apply(&event) {
                    Effect::Nothing | Effect::StatusChanged => {}
                    Effect::Degraded { notify } => inner.degraded(shared, notify),
                    Effect::Refetch | Effect::Recovered => {
                        inner.cache.invalidate(&shared.key.cache_key);
                        if let Some(pending) = refetch.as_mut() {
                            if pending.is_started() {
                                tracing::trace!(
                                    "{:?} arrived mid-fetch of '{}', will refetch again",
                                    event,
                                    table
                                );
                                pending.trailing = true;
                            } else {
                                tracing::trace!(
                                    "coalescing {:?} into pending refetch of '{}'",
                                    event,
                                    table
                                );
                            }
                        } else {
                            refetch = Some(Refetch::start(shared, inner.config.retry));
                        }
                    }
                }
            }
            result = in_flight(&mut refetch), if refetch.is_some() => {
                let trailing = refetch.take().map_or(false, |pending| pending.trailing);
                inner.store(shared, &result);
                if trailing {
                    // Rows just stored may predate the last change; keep them
                    // visible but stale until the follow-up lands.
                    inner.cache.invalidate(&shared.key.cache_key);
                    refetch = Some(Refetch::start(shared, inner.config.retry));
                }
            }
        }
    }
}

async fn in_flight<R>(pending: &mut Option<Refetch<R>>) -> Result<FetchOutcome<R>, FetchError> {
    match pending {
        Some(refetch) => (&mut refetch.fetch).await,
        None => future::pending().await,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::realtime::error::ChannelError;
    use crate::realtime::ports::{fetch_fn, EventSink};
    use crate::realtime::state::ChangeKind;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: &'static str,
        status: &'static str,
    }

    fn row(id: &'static str, status: &'static str) -> Row {
        Row { id, status }
    }

    #[derive(Default)]
    struct FakeProvider {
        next_id: AtomicU64,
        subscribe_calls: AtomicUsize,
        unsubscribe_calls: AtomicUsize,
        active: Mutex<HashMap<u64, (String, EventSink)>>,
        fail_subscribe: AtomicBool,
    }

    impl FakeProvider {
        fn active_for(&self, table: &str) -> usize {
            lock(&self.active)
                .values()
                .filter(|(t, _)| t == table)
                .count()
        }

        fn emit(&self, table: &str, event: ChannelEvent) {
            for (t, sink) in lock(&self.active).values() {
                if t == table {
                    let _ = sink.send(event.clone());
                }
            }
        }

        fn signal(&self, table: &str, signal: ChannelSignal) {
            self.emit(table, ChannelEvent::Status(signal));
        }

        /// Simulates the provider losing its connection and dropping sinks.
        fn drop_sinks(&self) {
            lock(&self.active).clear();
        }
    }

    impl ChannelProvider for FakeProvider {
        fn subscribe(&self, table: &str, sink: EventSink) -> Result<ChannelRef, ChannelError> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(ChannelError::SubscribeFailed("refused".into()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            lock(&self.active).insert(id, (table.to_string(), sink));
            Ok(ChannelRef::new(id, table))
        }

        fn unsubscribe(&self, channel: ChannelRef) -> Result<(), ChannelError> {
            self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            match lock(&self.active).remove(&channel.id()) {
                Some(_) => Ok(()),
                None => Err(ChannelError::Gone(channel.id())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            lock(&self.notices).push(notice);
        }
    }

    /// Fetch returning `versions[n]` on call `n` (the last one repeats).
    struct ScriptedFetch {
        calls: Arc<AtomicUsize>,
        versions: Arc<Vec<Result<Vec<Row>, FetchError>>>,
        delay: Duration,
    }

    impl ScriptedFetch {
        fn new(versions: Vec<Result<Vec<Row>, FetchError>>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                versions: Arc::new(versions),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fetch(&self) -> FetchFn<Row> {
            let calls = self.calls.clone();
            let versions = self.versions.clone();
            let delay = self.delay;
            fetch_fn(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let result = versions[n.min(versions.len() - 1)].clone();
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    result
                }
            })
        }
    }

    type TestBridge = SyncBridge<Row, Arc<FakeProvider>, MemoryCache<Row>>;

    fn setup() -> (TestBridge, Arc<FakeProvider>, Arc<RecordingNotifier>) {
        let provider = Arc::new(FakeProvider::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let bridge = SyncBridge::new(provider.clone(), Arc::new(MemoryCache::new()))
            .with_config(BridgeConfig {
                debounce: DEFAULT_DEBOUNCE,
                retry: RetryPolicy::new(3, Duration::from_millis(100)),
            })
            .with_notifier(notifier.clone());
        (bridge, provider, notifier)
    }

    async fn past_debounce() {
        tokio::time::sleep(DEFAULT_DEBOUNCE + Duration::from_millis(100)).await;
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambulance_scenario() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![
            Ok(vec![row("A1", "available")]),
            Ok(vec![row("A1", "available"), row("A2", "dispatched")]),
        ]);

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        handle.loaded().await;
        assert_eq!(fetch.calls(), 1);
        assert_eq!(bridge.rows(&handle), Some(vec![row("A1", "available")]));
        assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 0);

        past_debounce().await;
        assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 1);

        provider.signal("ambulances", ChannelSignal::Subscribed);
        provider.emit(
            "ambulances",
            ChannelEvent::change("ambulances", ChangeKind::Insert),
        );
        settle().await;

        assert_eq!(fetch.calls(), 2);
        assert_eq!(
            bridge.rows(&handle),
            Some(vec![row("A1", "available"), row("A2", "dispatched")])
        );
        let status = handle.status();
        assert_eq!(status.status, ChannelStatus::Live);
        assert!(status.last_updated.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_channel_per_pair() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![row("B1", "available")])]);

        let first = bridge.attach("beds", "beds-all", fetch.fetch()).unwrap();
        past_debounce().await;
        assert_eq!(provider.active_for("beds"), 1);

        let second = bridge.attach("beds", "beds-all", fetch.fetch()).unwrap();
        assert!(first.is_closed());
        assert_eq!(first.status().status, ChannelStatus::Closed);
        assert_eq!(provider.active_for("beds"), 0);
        assert_eq!(provider.unsubscribe_calls.load(Ordering::SeqCst), 1);

        past_debounce().await;
        assert_eq!(provider.active_for("beds"), 1);
        assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.active_attachments(), 1);

        let _third = bridge.attach("beds", "beds-all", fetch.fetch()).unwrap();
        past_debounce().await;
        assert!(second.is_closed());
        assert_eq!(provider.active_for("beds"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_cache_keys_get_separate_channels() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let _icu = bridge.attach("beds", "beds-icu", fetch.fetch()).unwrap();
        let _er = bridge.attach("beds", "beds-er", fetch.fetch()).unwrap();
        past_debounce().await;

        assert_eq!(provider.active_for("beds"), 2);
        assert_eq!(bridge.active_attachments(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_is_idempotent() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![row("A1", "available")])]);

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        past_debounce().await;

        bridge.detach(&handle);
        assert!(handle.is_closed());
        assert_eq!(provider.active_for("ambulances"), 0);
        assert_eq!(provider.unsubscribe_calls.load(Ordering::SeqCst), 1);

        bridge.detach(&handle);
        bridge.detach(&handle.clone());
        assert_eq!(provider.unsubscribe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.active_attachments(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_superseded_handle_leaves_new_channel() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let old = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        let new = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        past_debounce().await;

        bridge.detach(&old);
        assert_eq!(provider.active_for("beds"), 1);
        assert!(!new.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_error_is_swallowed() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let handle = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        past_debounce().await;

        // Channel vanishes on the provider side before we unsubscribe
        provider.drop_sinks();
        bridge.detach(&handle);

        assert!(handle.is_closed());
        assert_eq!(provider.unsubscribe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_keeps_data() {
        let (bridge, provider, notifier) = setup();
        let data = vec![row("A1", "available")];
        let fetch = ScriptedFetch::new(vec![Ok(data.clone())]);

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        past_debounce().await;
        provider.signal("ambulances", ChannelSignal::Subscribed);
        settle().await;
        assert_eq!(handle.status().status, ChannelStatus::Live);

        provider.signal("ambulances", ChannelSignal::ChannelError);
        settle().await;

        assert!(handle.status().is_degraded());
        assert_eq!(bridge.rows(&handle), Some(data));

        provider.signal("ambulances", ChannelSignal::TimedOut);
        settle().await;
        assert_eq!(
            *lock(&notifier.notices),
            vec![Notice::LiveUpdatesUnavailable {
                table: "ambulances".into()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_refetches() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![
            Ok(vec![row("A1", "available")]),
            Ok(vec![row("A1", "dispatched")]),
        ]);

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        past_debounce().await;
        provider.signal("ambulances", ChannelSignal::ChannelError);
        provider.signal("ambulances", ChannelSignal::Subscribed);
        settle().await;

        assert_eq!(handle.status().status, ChannelStatus::Live);
        assert_eq!(fetch.calls(), 2);
        assert_eq!(bridge.rows(&handle), Some(vec![row("A1", "dispatched")]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_not_found_short_circuits() {
        let (bridge, _, _) = setup();
        let fetch = ScriptedFetch::new(vec![Err(FetchError::TableNotFound(
            "reports".into(),
        ))]);

        let handle = bridge.attach("reports", "reports", fetch.fetch()).unwrap();
        let status = handle.loaded().await;

        assert_eq!(fetch.calls(), 1);
        assert_eq!(bridge.rows(&handle), Some(vec![]));
        assert!(matches!(status.unavailable, Some(FetchError::TableNotFound(_))));
        assert!(status.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_burst_is_coalesced() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![
            Ok(vec![row("A1", "available")]),
            Ok(vec![row("A1", "available"), row("A2", "dispatched")]),
        ])
        .with_delay(Duration::from_millis(50));

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        past_debounce().await;
        provider.signal("ambulances", ChannelSignal::Subscribed);

        for kind in [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete] {
            provider.emit("ambulances", ChannelEvent::change("ambulances", kind));
        }
        settle().await;

        assert_eq!(fetch.calls(), 2);
        assert_eq!(bridge.rows(&handle).map(|rows| rows.len()), Some(2));
        assert!(!bridge.cache().is_stale(handle.cache_key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_refetch_triggers_one_follow_up() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![
            Ok(vec![row("A1", "available")]),
            Ok(vec![row("A1", "available")]),
            Ok(vec![row("A1", "available"), row("A2", "dispatched")]),
        ])
        .with_delay(Duration::from_millis(50));

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        handle.loaded().await;
        past_debounce().await;
        provider.signal("ambulances", ChannelSignal::Subscribed);

        provider.emit(
            "ambulances",
            ChannelEvent::change("ambulances", ChangeKind::Insert),
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
        // Lands while the first refetch is on the wire
        provider.emit(
            "ambulances",
            ChannelEvent::change("ambulances", ChangeKind::Insert),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(fetch.calls(), 3);
        assert_eq!(bridge.rows(&handle), Some(vec![row("A1", "available")]));
        assert!(bridge.cache().is_stale(handle.cache_key()));

        settle().await;
        assert_eq!(fetch.calls(), 3);
        assert_eq!(bridge.rows(&handle).map(|rows| rows.len()), Some(2));
        assert!(!bridge.cache().is_stale(handle.cache_key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_within_debounce_never_subscribes() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let handle = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        tokio::time::sleep(DEFAULT_DEBOUNCE / 2).await;
        bridge.detach(&handle);
        settle().await;

        assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.unsubscribe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_during_slow_initial_fetch_never_subscribes() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![row("B1", "available")])])
            .with_delay(Duration::from_millis(1500));

        let handle = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        tokio::time::sleep(DEFAULT_DEBOUNCE / 2).await;
        assert_eq!(fetch.calls(), 1);
        assert!(handle.status().last_updated.is_none());

        bridge.detach(&handle);
        settle().await;

        assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bridge.active_attachments(), 0);
        assert!(bridge.rows(&handle).is_none());
        assert_eq!(handle.loaded().await.status, ChannelStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_load_leaves_handle_detachable() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]).with_delay(Duration::from_secs(5));

        let handle = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(100), handle.loaded()).await;
        assert!(waited.is_err());
        assert_eq!(bridge.active_attachments(), 1);

        bridge.detach(&handle);
        settle().await;

        assert_eq!(bridge.active_attachments(), 0);
        assert_eq!(provider.subscribe_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.active_for("beds"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_attachment_ignores_late_events() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let handle = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        past_debounce().await;
        provider.signal("beds", ChannelSignal::Subscribed);
        settle().await;

        bridge.detach(&handle);
        let closed = handle.status();
        assert_eq!(closed.status, ChannelStatus::Closed);

        for signal in [ChannelSignal::Subscribed, ChannelSignal::ChannelError] {
            assert_eq!(
                handle.shared.apply(&ChannelEvent::Status(signal)),
                Effect::Nothing
            );
        }
        assert_eq!(handle.status(), closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_without_data_then_manual_retry() {
        let (bridge, _, _) = setup();
        let fetch = ScriptedFetch::new(vec![
            Err(FetchError::Network("connection refused".into())),
            Err(FetchError::Network("connection refused".into())),
            Err(FetchError::Network("connection refused".into())),
            Ok(vec![row("M1", "in-stock")]),
        ]);

        let handle = bridge.attach("medicines", "meds", fetch.fetch()).unwrap();
        let status = handle.loaded().await;
        assert_eq!(fetch.calls(), 3);
        assert!(bridge.rows(&handle).is_none());
        assert!(matches!(status.error, Some(FetchError::Network(_))));

        let outcome = bridge.refresh(&handle).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Fresh(vec![row("M1", "in-stock")]));
        assert_eq!(bridge.rows(&handle), Some(vec![row("M1", "in-stock")]));
        assert!(handle.status().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_keeps_previous_rows() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![
            Ok(vec![row("A1", "available")]),
            Err(FetchError::Timeout),
        ]);

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        past_debounce().await;
        provider.signal("ambulances", ChannelSignal::Subscribed);
        provider.emit(
            "ambulances",
            ChannelEvent::change("ambulances", ChangeKind::Update),
        );
        settle().await;

        assert_eq!(fetch.calls(), 4);
        assert_eq!(bridge.rows(&handle), Some(vec![row("A1", "available")]));
        assert_eq!(handle.status().error, Some(FetchError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fetch_result_is_discarded() {
        let (bridge, _, _) = setup();
        let slow = ScriptedFetch::new(vec![Ok(vec![row("B1", "stale")])])
            .with_delay(Duration::from_millis(500));
        let fast = ScriptedFetch::new(vec![Ok(vec![row("B1", "fresh")])]);

        let first = bridge.attach("beds", "beds", slow.fetch()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(slow.calls(), 1);

        let second = bridge.attach("beds", "beds", fast.fetch()).unwrap();
        assert_eq!(first.loaded().await.status, ChannelStatus::Closed);
        second.loaded().await;
        settle().await;

        assert!(first.is_closed());
        assert_eq!(bridge.rows(&second), Some(vec![row("B1", "fresh")]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_failure_degrades() {
        let (bridge, provider, notifier) = setup();
        provider.fail_subscribe.store(true, Ordering::SeqCst);
        let fetch = ScriptedFetch::new(vec![Ok(vec![row("A1", "available")])]);

        let handle = bridge
            .attach("ambulances", "amb-key", fetch.fetch())
            .unwrap();
        past_debounce().await;

        assert!(handle.status().is_degraded());
        assert_eq!(bridge.rows(&handle), Some(vec![row("A1", "available")]));
        assert_eq!(lock(&notifier.notices).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_dropping_sink_degrades() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let handle = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        past_debounce().await;
        provider.signal("beds", ChannelSignal::Subscribed);
        settle().await;

        provider.drop_sinks();
        settle().await;
        assert!(handle.status().is_degraded());
    }

    #[tokio::test]
    async fn test_empty_table_rejected() {
        let (bridge, _, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let err = bridge.attach("  ", "key", fetch.fetch()).unwrap_err();
        assert_eq!(err, BridgeError::EmptyTable);
        assert_eq!(fetch.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_status_sees_transitions() {
        let (bridge, provider, _) = setup();
        let fetch = ScriptedFetch::new(vec![Ok(vec![])]);

        let handle = bridge.attach("beds", "beds", fetch.fetch()).unwrap();
        handle.loaded().await;
        let mut rx = handle.watch_status();
        past_debounce().await;
        provider.signal("beds", ChannelSignal::Subscribed);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, ChannelStatus::Live);

        bridge.detach_all();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, ChannelStatus::Closed);
    }
}
