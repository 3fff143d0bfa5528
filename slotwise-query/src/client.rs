//! The query cache.
//!
//! `QueryClient` owns every cache entry. Entries are keyed by structural
//! [`QueryKey`]s and hold the last fetched value as JSON together with its
//! status, error, and timestamps. All writes go through the client; callers
//! only receive snapshots over `watch` channels.
//!
//! Fetches run as spawned tasks tagged with the entry generation and a
//! per-entry sequence number. A resolution is applied only if both still
//! match, so superseded fetches and fetches for evicted entries are no-ops.

use crate::config::CacheConfig;
use crate::error::{QueryError, SyncResult};
use crate::key::QueryKey;
use crate::observer::{QueryObserver, QueryOptions};
use crate::state::{CacheSnapshot, QueryState, QueryStatus};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A type-erased fetcher producing the JSON form of the query data.
pub(crate) type QueryFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Value, QueryError>> + Send + Sync>;

/// Resume signal handed to a parked mutation. The mutation answers on the
/// inner sender once it has settled.
type ResumeSender = oneshot::Sender<oneshot::Sender<()>>;

pub(crate) fn boxed_query_fn<T, F, Fut>(query_fn: F) -> QueryFn
where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
{
    Arc::new(move || {
        let fut = query_fn();
        async move {
            let data = fut.await?;
            serde_json::to_value(data).map_err(|e| QueryError::decode(&e))
        }
        .boxed()
    })
}

struct InFlight {
    seq: u64,
    handle: JoinHandle<()>,
}

/// Entry state captured before an optimistic write.
pub(crate) struct EntrySnapshot {
    existed: bool,
    state: CacheSnapshot,
    invalidated: bool,
    stale_time: Duration,
}

struct CacheEntry {
    /// Generation; a re-created entry for the same key gets a new id.
    id: u64,
    data: Option<Value>,
    status: QueryStatus,
    error: Option<QueryError>,
    data_updated_at: Option<Instant>,
    error_updated_at: Option<Instant>,
    invalidated: bool,
    stale_time: Duration,
    fetch_seq: u64,
    in_flight: Option<InFlight>,
    query_fn: Option<QueryFn>,
    observers: usize,
    enabled_observers: usize,
    inactive_since: Option<Instant>,
    tx: watch::Sender<CacheSnapshot>,
}

impl CacheEntry {
    fn new(id: u64, stale_time: Duration) -> Self {
        let (tx, _) = watch::channel(CacheSnapshot::default());
        Self {
            id,
            data: None,
            status: QueryStatus::Idle,
            error: None,
            data_updated_at: None,
            error_updated_at: None,
            invalidated: false,
            stale_time,
            fetch_seq: 0,
            in_flight: None,
            query_fn: None,
            observers: 0,
            enabled_observers: 0,
            inactive_since: None,
            tx,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match self.data_updated_at {
            Some(at) => now.saturating_duration_since(at) > self.stale_time,
            None => true,
        }
    }

    /// Observed, but only by disabled observers.
    fn is_disabled(&self) -> bool {
        self.observers > 0 && self.enabled_observers == 0
    }

    fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            is_fetching: self.in_flight.is_some(),
            data_updated_at: self.data_updated_at,
            error_updated_at: self.error_updated_at,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }

    fn write_data(&mut self, data: Value, now: Instant) {
        self.data = Some(data);
        self.status = QueryStatus::Success;
        self.error = None;
        self.data_updated_at = Some(now);
        self.invalidated = false;
    }

    /// Abandons the in-flight fetch. Returns true if there was one.
    fn cancel_fetch(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.handle.abort();
        self.fetch_seq += 1;
        if self.status == QueryStatus::Pending && self.data.is_none() {
            self.status = QueryStatus::Idle;
        }
        true
    }
}

struct ClientInner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    next_entry_id: AtomicU64,
    online: AtomicBool,
    paused: Mutex<VecDeque<ResumeSender>>,
    /// Held while the paused queue is being drained.
    draining: tokio::sync::Mutex<()>,
}

/// Process-wide query cache, passed explicitly to whoever needs it.
///
/// Cloning is cheap and every clone addresses the same cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .field("online", &self.is_online())
            .finish()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryClient {
    /// Creates an empty cache. The client starts online.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                entries: Mutex::new(HashMap::new()),
                next_entry_id: AtomicU64::new(1),
                online: AtomicBool::new(true),
                paused: Mutex::new(VecDeque::new()),
                draining: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Keys of all cached entries, sorted.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns true if the entry exists and its data is stale.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries()
            .get(key)
            .is_some_and(|e| e.is_stale(Instant::now()))
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Subscribes to `key`, fetching with `query_fn` when the entry has no
    /// data or its data is stale.
    ///
    /// Must be called within a Tokio runtime for fetches to start.
    pub fn watch_query<T, F, Fut>(
        &self,
        key: QueryKey,
        query_fn: F,
        options: QueryOptions,
    ) -> QueryObserver<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let query_fn = boxed_query_fn(query_fn);
        let mut entries = self.entries();
        let entry = self.ensure_entry(&mut entries, &key);
        entry.query_fn = Some(query_fn);
        if let Some(stale_time) = options.stale_time {
            entry.stale_time = stale_time;
        }
        entry.observers += 1;
        if options.enabled {
            entry.enabled_observers += 1;
        }
        entry.inactive_since = None;

        if options.enabled && entry.is_stale(Instant::now()) {
            self.start_fetch(&key, entry, false);
        }

        let rx = entry.tx.subscribe();
        let entry_id = entry.id;
        drop(entries);

        QueryObserver::new(self.clone(), key, entry_id, rx, options.enabled)
    }

    /// Returns fresh cached data for `key`, or fetches it.
    ///
    /// Concurrent callers share the in-flight fetch. The entry is not
    /// subscribed to and becomes eligible for garbage collection.
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: QueryKey,
        query_fn: F,
        stale_time: Option<Duration>,
    ) -> Result<T, QueryError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let query_fn = boxed_query_fn(query_fn);
        let rx = {
            let mut entries = self.entries();
            let entry = self.ensure_entry(&mut entries, &key);
            entry.query_fn = Some(query_fn);
            if let Some(stale_time) = stale_time {
                entry.stale_time = stale_time;
            }
            if entry.observers == 0 && entry.inactive_since.is_none() {
                self.mark_inactive(&key, entry);
            }

            if !entry.is_stale(Instant::now()) {
                if let Some(data) = &entry.data {
                    return serde_json::from_value(data.clone()).map_err(|e| QueryError::decode(&e));
                }
            }
            self.start_fetch(&key, entry, false);
            entry.tx.subscribe()
        };

        let snapshot = wait_settled(rx).await?;
        match (snapshot.status, snapshot.data) {
            (QueryStatus::Error, _) => Err(snapshot.error.unwrap_or_else(QueryError::cancelled)),
            (_, Some(data)) => serde_json::from_value(data).map_err(|e| QueryError::decode(&e)),
            (_, None) => Err(QueryError::cancelled()),
        }
    }

    /// Populates or refreshes `key` without subscribing to it.
    ///
    /// Never fails: a rejected fetch is stored on the entry like any other
    /// query error.
    pub async fn prefetch_query<T, F, Fut>(
        &self,
        key: QueryKey,
        query_fn: F,
        stale_time: Option<Duration>,
    ) where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let shown = key.to_string();
        if let Err(e) = self.fetch_query::<T, F, Fut>(key, query_fn, stale_time).await {
            debug!("Prefetch of {} failed: {}", shown, e);
        }
    }

    /// Reads cached data for `key`.
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> SyncResult<Option<T>> {
        let data = self.entries().get(key).and_then(|e| e.data.clone());
        match data {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Reads the full state of `key`.
    pub fn get_query_state<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<QueryState<T>> {
        self.entries()
            .get(key)
            .map(|e| QueryState::from_snapshot(&e.snapshot()))
    }

    /// Writes data for `key` as if it had just been fetched.
    pub fn set_query_data<T: Serialize>(&self, key: &QueryKey, data: &T) -> SyncResult<()> {
        let value = serde_json::to_value(data)?;
        let mut entries = self.entries();
        let entry = self.ensure_entry(&mut entries, key);
        entry.write_data(value, Instant::now());
        entry.publish();
        if entry.observers == 0 && entry.inactive_since.is_none() {
            self.mark_inactive(key, entry);
        }
        Ok(())
    }

    /// Marks every entry under `prefix` stale and refetches the ones that
    /// are actively observed. Returns the number of entries marked.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries();
        let mut marked = 0;
        let mut refetched = 0;
        for (key, entry) in entries.iter_mut().filter(|(k, _)| k.starts_with(prefix)) {
            entry.invalidated = true;
            marked += 1;
            if entry.enabled_observers > 0 && self.start_fetch(key, entry, true) {
                refetched += 1;
            }
        }
        debug!(
            "Invalidated {} queries under {} ({} refetching)",
            marked, prefix, refetched
        );
        marked
    }

    /// Refetches every stale entry that has a fetcher, skipping entries that
    /// are already fetching or observed only by disabled observers.
    /// Returns the number of fetches started.
    pub fn refetch_stale(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let mut started = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.in_flight.is_some()
                || entry.query_fn.is_none()
                || entry.is_disabled()
                || !entry.is_stale(now)
            {
                continue;
            }
            if self.start_fetch(key, entry, false) {
                started += 1;
            }
        }
        if started > 0 {
            info!("Refetching {} stale queries", started);
        }
        started
    }

    /// Abandons in-flight fetches under `prefix`. Late results are ignored.
    pub fn cancel_queries(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries();
        let mut cancelled = 0;
        for (_, entry) in entries.iter_mut().filter(|(k, _)| k.starts_with(prefix)) {
            if entry.cancel_fetch() {
                entry.publish();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drops every entry under `prefix`.
    pub fn remove_queries(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries();
        let doomed: Vec<QueryKey> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(mut entry) = entries.remove(key) {
                entry.cancel_fetch();
            }
        }
        doomed.len()
    }

    /// Evicts every unobserved entry whose idle window has passed.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, entry| {
            let expired = entry.observers == 0
                && entry
                    .inactive_since
                    .is_some_and(|since| since.elapsed() >= gc_time);
            if expired {
                entry.cancel_fetch();
                debug!("Evicted {}", key);
            }
            !expired
        });
        before - entries.len()
    }

    // ── Connectivity ─────────────────────────────────────────────

    /// Whether network-gated mutations may run.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Records connectivity. Going online does not by itself resume parked
    /// mutations; see [`resume_paused_mutations`](Self::resume_paused_mutations).
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            info!("Query client is now {}", if online { "online" } else { "offline" });
        }
    }

    /// Number of mutations waiting for connectivity.
    pub fn paused_mutation_count(&self) -> usize {
        self.paused().len()
    }

    /// Releases parked mutations one at a time in the order they were
    /// issued, waiting for each to settle before releasing the next.
    /// Stops early if the client goes offline; the rest stay queued.
    /// Concurrent callers drain one after another. Returns the number
    /// resumed.
    pub async fn resume_paused_mutations(&self) -> usize {
        let _draining = self.inner.draining.lock().await;
        let mut resumed = 0;
        loop {
            if !self.is_online() {
                debug!(
                    "Offline again; {} paused mutations stay queued",
                    self.paused_mutation_count()
                );
                break;
            }
            let next = self.paused().pop_front();
            let Some(resume) = next else {
                break;
            };
            let (done_tx, done_rx) = oneshot::channel();
            if resume.send(done_tx).is_err() {
                debug!("Skipping paused mutation that was dropped");
                continue;
            }
            resumed += 1;
            // Err means the mutation was dropped mid-flight; move on.
            let _ = done_rx.await;
        }
        if resumed > 0 {
            info!("Resumed {} paused mutations", resumed);
        }
        resumed
    }

    /// Queues the caller if the client is offline.
    pub(crate) fn park_if_offline(&self) -> Option<oneshot::Receiver<oneshot::Sender<()>>> {
        let mut paused = self.paused();
        if self.is_online() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        paused.push_back(tx);
        Some(rx)
    }

    // ── Optimistic writes ────────────────────────────────────────

    /// Cancels fetches for `key`, then writes `update(previous)` if it
    /// returns a value. Returns the previous data and, if a write happened,
    /// the snapshot needed to undo it.
    ///
    /// `update` runs without the cache lock held, so it may read the cache.
    pub(crate) fn apply_optimistic(
        &self,
        key: &QueryKey,
        update: impl FnOnce(Option<&Value>) -> Option<Value>,
    ) -> (Option<Value>, Option<EntrySnapshot>) {
        let snapshot = {
            let mut entries = self.entries();
            match entries.get_mut(key) {
                Some(entry) => {
                    let state = entry.snapshot();
                    if entry.cancel_fetch() {
                        entry.publish();
                    }
                    EntrySnapshot {
                        existed: true,
                        state,
                        invalidated: entry.invalidated,
                        stale_time: entry.stale_time,
                    }
                }
                None => EntrySnapshot {
                    existed: false,
                    state: CacheSnapshot::default(),
                    invalidated: false,
                    stale_time: self.inner.config.stale_time(),
                },
            }
        };
        let previous = snapshot.state.data.clone();

        let Some(next) = update(previous.as_ref()) else {
            return (previous, None);
        };

        let mut entries = self.entries();
        let entry = self.ensure_entry(&mut entries, key);
        // A fetch may have started while the updater ran.
        entry.cancel_fetch();
        entry.write_data(next, Instant::now());
        entry.publish();
        if entry.observers == 0 && entry.inactive_since.is_none() {
            self.mark_inactive(key, entry);
        }
        debug!("Applied optimistic update to {}", key);
        (previous, Some(snapshot))
    }

    /// Puts `key` back exactly as captured by [`apply_optimistic`](Self::apply_optimistic).
    pub(crate) fn restore(&self, key: &QueryKey, snapshot: EntrySnapshot) {
        let mut entries = self.entries();
        let Some(observers) = entries.get(key).map(|e| e.observers) else {
            return;
        };
        if !snapshot.existed && observers == 0 {
            if let Some(mut entry) = entries.remove(key) {
                entry.cancel_fetch();
            }
            debug!("Rolled back {} to absent", key);
            return;
        }
        let Some(entry) = entries.get_mut(key) else {
            return;
        };

        let state = snapshot.state;
        entry.cancel_fetch();
        entry.data = state.data;
        entry.status = state.status;
        entry.error = state.error;
        entry.data_updated_at = state.data_updated_at;
        entry.error_updated_at = state.error_updated_at;
        entry.invalidated = snapshot.invalidated;
        entry.stale_time = snapshot.stale_time;
        // A fetch interrupted by the optimistic write is restarted.
        if state.is_fetching && entry.enabled_observers > 0 {
            self.start_fetch(key, entry, false);
        }
        entry.publish();
        debug!("Rolled back {}", key);
    }

    // ── Observer bookkeeping ─────────────────────────────────────

    pub(crate) fn refetch_entry(&self, key: &QueryKey, entry_id: u64) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) {
            self.start_fetch(key, entry, false);
        }
    }

    pub(crate) fn set_observer_enabled(&self, key: &QueryKey, entry_id: u64, enabled: bool) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) else {
            return;
        };
        if enabled {
            entry.enabled_observers += 1;
            if entry.is_stale(Instant::now()) {
                self.start_fetch(key, entry, false);
            }
        } else {
            entry.enabled_observers = entry.enabled_observers.saturating_sub(1);
        }
    }

    pub(crate) fn release_observer(&self, key: &QueryKey, entry_id: u64, enabled: bool) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) else {
            return;
        };
        entry.observers = entry.observers.saturating_sub(1);
        if enabled {
            entry.enabled_observers = entry.enabled_observers.saturating_sub(1);
        }
        if entry.observers == 0 {
            self.mark_inactive(key, entry);
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn paused(&self) -> MutexGuard<'_, VecDeque<ResumeSender>> {
        self.inner
            .paused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_entry<'a>(
        &self,
        entries: &'a mut HashMap<QueryKey, CacheEntry>,
        key: &QueryKey,
    ) -> &'a mut CacheEntry {
        entries.entry(key.clone()).or_insert_with(|| {
            let id = self.inner.next_entry_id.fetch_add(1, Ordering::Relaxed);
            debug!("Created cache entry {} for {}", id, key);
            CacheEntry::new(id, self.inner.config.stale_time())
        })
    }

    /// Starts a fetch for `entry`. An in-flight fetch is shared unless
    /// `supersede` is set, in which case it is abandoned for a new one.
    fn start_fetch(&self, key: &QueryKey, entry: &mut CacheEntry, supersede: bool) -> bool {
        if entry.in_flight.is_some() {
            if !supersede {
                return false;
            }
            entry.cancel_fetch();
        }
        let Some(query_fn) = entry.query_fn.clone() else {
            return false;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!("No Tokio runtime available; not fetching {}", key);
            return false;
        };

        entry.fetch_seq += 1;
        let seq = entry.fetch_seq;
        let entry_id = entry.id;
        if entry.data.is_none() {
            entry.status = QueryStatus::Pending;
        }

        let client = self.clone();
        let task_key = key.clone();
        let handle = runtime.spawn(async move {
            let result = client.run_query(&task_key, query_fn).await;
            client.resolve_fetch(&task_key, entry_id, seq, result);
        });
        entry.in_flight = Some(InFlight { seq, handle });
        entry.publish();
        debug!("Fetching {} (seq {})", key, seq);
        true
    }

    async fn run_query(&self, key: &QueryKey, query_fn: QueryFn) -> Result<Value, QueryError> {
        let config = &self.inner.config;
        let mut attempt = 0;
        loop {
            let outcome = AssertUnwindSafe(query_fn())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(QueryError::new("query function panicked")));
            match outcome {
                Ok(data) => return Ok(data),
                Err(error) if config.should_retry_query(attempt, &error) => {
                    let delay = config.backoff(attempt);
                    debug!(
                        "Retrying {} in {:?} after {} error: {}",
                        key,
                        delay,
                        error.kind(),
                        error
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn resolve_fetch(
        &self,
        key: &QueryKey,
        entry_id: u64,
        seq: u64,
        result: Result<Value, QueryError>,
    ) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            debug!("Discarding result for evicted {}", key);
            return;
        };
        let current = entry
            .in_flight
            .as_ref()
            .is_some_and(|f| f.seq == seq);
        if entry.id != entry_id || entry.fetch_seq != seq || !current {
            debug!("Discarding superseded result for {} (seq {})", key, seq);
            return;
        }

        entry.in_flight = None;
        let now = Instant::now();
        match result {
            Ok(data) => entry.write_data(data, now),
            Err(error) => {
                warn!("Query {} failed: {}", key, error);
                entry.status = QueryStatus::Error;
                entry.error = Some(error);
                entry.error_updated_at = Some(now);
            }
        }
        entry.publish();
    }

    /// Starts the idle clock for an unobserved entry and schedules its
    /// eviction. Outside a runtime only [`collect_garbage`](Self::collect_garbage)
    /// reclaims it.
    fn mark_inactive(&self, key: &QueryKey, entry: &mut CacheEntry) {
        entry.inactive_since = Some(Instant::now());
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let gc_time = self.inner.config.gc_time();
        let weak = Arc::downgrade(&self.inner);
        let key = key.clone();
        let entry_id = entry.id;
        runtime.spawn(async move {
            tokio::time::sleep(gc_time).await;
            if let Some(inner) = weak.upgrade() {
                QueryClient { inner }.evict_if_idle(&key, entry_id);
            }
        });
    }

    fn evict_if_idle(&self, key: &QueryKey, entry_id: u64) {
        let gc_time = self.inner.config.gc_time();
        let mut entries = self.entries();
        let expired = entries.get(key).is_some_and(|e| {
            e.id == entry_id
                && e.observers == 0
                && e.inactive_since.is_some_and(|since| since.elapsed() >= gc_time)
        });
        if expired {
            if let Some(mut entry) = entries.remove(key) {
                entry.cancel_fetch();
                debug!("Evicted idle entry {}", key);
            }
        }
    }
}

/// Waits until the entry behind `rx` has no fetch in flight.
pub(crate) async fn wait_settled(
    mut rx: watch::Receiver<CacheSnapshot>,
) -> Result<CacheSnapshot, QueryError> {
    match rx.wait_for(|s| !s.is_fetching).await {
        Ok(snapshot) => Ok(snapshot.clone()),
        Err(_) => Err(QueryError::cancelled()),
    }
}
