//! Polling synchronizer.
//!
//! One synchronizer owns one query. While the query is set, a spawned task re-fetches it on
//! every tick (and on demand through [`PollingSynchronizer::refresh`]), maps the records and
//! publishes a new [`CachedResultSet`] only when the mapped items actually changed. Consumers
//! observe snapshots through a `tokio::sync::watch` channel, so an unchanged fetch produces
//! no wake-up and keeps the same `Arc`.

use super::cache::CachedResultSet;
use super::context::SyncContext;
use super::errors::{OwnerId, SyncError};
use super::scheduler::{IntervalTicker, PeriodicTask, Ticker};
use crate::entities::{map_records, FromRecord};
use crate::store::{QueryDescriptor, RawRecord, StoreError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-synchronizer options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub interval: Duration,
    /// Seed from and write to the session's result cache.
    pub use_cache: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            use_cache: true,
        }
    }
}

impl SyncOptions {
    /// Options for notification lists: never served from the cache.
    pub fn notifications() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

/// What consumers see: the last good data and the last fetch error.
#[derive(Debug)]
pub struct SyncSnapshot<T> {
    pub data: Option<Arc<CachedResultSet<T>>>,
    pub error: Option<SyncError>,
}

impl<T> Clone for SyncSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

impl<T> Default for SyncSnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
        }
    }
}

impl<T> SyncSnapshot<T> {
    /// Items of the current data, empty when nothing has been fetched yet.
    pub fn items(&self) -> &[T] {
        self.data.as_deref().map_or(&[], |set| set.items.as_slice())
    }
}

/// Cloneable trigger for an out-of-band re-fetch.
///
/// Any number of calls between two fetches coalesce into a single extra fetch.
#[derive(Clone)]
pub struct RefreshHandle(Arc<Notify>);

impl RefreshHandle {
    pub fn refresh(&self) {
        self.0.notify_one();
    }
}

impl std::fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RefreshHandle")
    }
}

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between a synchronizer and its polling task.
struct Inner<T> {
    /// Reports this synchronizer's failures to the session aggregator
    owner: OwnerId,
    ctx: SyncContext,
    options: SyncOptions,
    state: watch::Sender<SyncSnapshot<T>>,
    /// Bumped whenever the query changes or polling stops; results of older tasks are dropped
    generation: AtomicU64,
    fetch_count: AtomicUsize,
    refresh: Arc<Notify>,
}

pub struct PollingSynchronizer<T: FromRecord> {
    inner: Arc<Inner<T>>,
    query: Option<QueryDescriptor>,
    task: Option<PeriodicTask>,
}

impl<T: FromRecord> PollingSynchronizer<T> {
    /// Create an inactive synchronizer.
    pub fn new(ctx: SyncContext, options: SyncOptions) -> Self {
        let (state, _) = watch::channel(SyncSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                owner: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
                ctx,
                options,
                state,
                generation: AtomicU64::new(0),
                fetch_count: AtomicUsize::new(0),
                refresh: Arc::new(Notify::new()),
            }),
            query: None,
            task: None,
        }
    }

    /// Create a synchronizer and start polling `query` right away.
    pub fn with_query(
        ctx: SyncContext,
        options: SyncOptions,
        query: Option<QueryDescriptor>,
    ) -> Self {
        let mut synchronizer = Self::new(ctx, options);
        synchronizer.set_query(query);
        synchronizer
    }

    /// Switch to another query, or deactivate with `None`.
    ///
    /// Setting the query that is already being polled is a no-op (a stopped synchronizer is
    /// restarted with its data intact). A new query starts from the
    /// cached snapshot for its key (marked stale) when caching is enabled, otherwise empty.
    pub fn set_query(&mut self, query: Option<QueryDescriptor>) {
        let same_key = match (&self.query, &query) {
            (Some(current), Some(next)) => current.key() == next.key(),
            (None, None) => true,
            _ => false,
        };
        if same_key {
            // Restart a stopped synchronizer without dropping its data
            if let Some(query) = query {
                if !self.is_active() {
                    self.start(query);
                }
            }
            return;
        }

        self.halt();

        let seed = match &query {
            Some(q) if self.inner.options.use_cache => self.inner.ctx.cache.seed::<T>(q.key()),
            _ => None,
        };
        self.inner.state.send_modify(|snapshot| {
            snapshot.data = seed;
            snapshot.error = None;
        });

        self.query = query;
        if let Some(query) = self.query.clone() {
            self.start(query);
        }
    }

    pub fn query(&self) -> Option<&QueryDescriptor> {
        self.query.as_ref()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.inner.options
    }

    pub fn snapshot(&self) -> SyncSnapshot<T> {
        self.inner.state.borrow().clone()
    }

    pub fn data(&self) -> Option<Arc<CachedResultSet<T>>> {
        self.inner.state.borrow().data.clone()
    }

    /// Convenience copy of the current items.
    pub fn items(&self) -> Vec<T> {
        self.inner.state.borrow().items().to_vec()
    }

    /// Last fetch error, if the most recent fetch failed.
    pub fn error(&self) -> Option<SyncError> {
        self.inner.state.borrow().error.clone()
    }

    /// Receiver that is notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot<T>> {
        self.inner.state.subscribe()
    }

    pub fn refresh(&self) {
        self.inner.refresh.notify_one();
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle(self.inner.refresh.clone())
    }

    /// Wait for the next published change and return the new snapshot.
    pub async fn changed(&self) -> SyncSnapshot<T> {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so this only fails if it was dropped mid-await
        let _ = rx.changed().await;
        let snapshot = rx.borrow_and_update().clone();
        snapshot
    }

    /// Stop polling. The query and the last data are kept; `set_query` restarts.
    pub fn stop(&mut self) {
        self.halt();
    }

    pub fn is_active(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.is_stopped() && !task.is_finished())
    }

    /// Number of fetches issued by this synchronizer.
    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_count.load(Ordering::SeqCst)
    }

    fn start(&mut self, query: QueryDescriptor) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let inner = self.inner.clone();
        let ticker = IntervalTicker::new(inner.options.interval);

        debug!(
            "Starting {} synchronizer for {} every {:?}",
            T::KIND,
            query.key(),
            inner.options.interval
        );
        self.task = Some(PeriodicTask::spawn(
            &self.inner.ctx.cancellation_token,
            move |cancel| poll_loop(inner, query, Box::new(ticker), cancel, generation),
        ));
    }

    fn halt(&mut self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.stop();
            if let Some(query) = &self.query {
                debug!("Stopped {} synchronizer for {}", T::KIND, query.key());
            }
        }
        if let Some(query) = &self.query {
            self.inner.ctx.errors.clear(self.inner.owner, query.key());
        }
    }
}

impl<T: FromRecord> Drop for PollingSynchronizer<T> {
    fn drop(&mut self) {
        self.halt();
    }
}

async fn poll_loop<T: FromRecord>(
    inner: Arc<Inner<T>>,
    query: QueryDescriptor,
    mut ticker: Box<dyn Ticker>,
    cancel: CancellationToken,
    generation: u64,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = inner.refresh.notified() => {}
            _ = ticker.tick() => {}
        }

        inner.fetch_count.fetch_add(1, Ordering::SeqCst);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = inner.ctx.store.fetch(&query) => result,
        };

        if cancel.is_cancelled() || !inner.is_current(generation) {
            debug!("Discarding {} fetch for {} after teardown", T::KIND, query.key());
            break;
        }
        inner.apply(&query, generation, result);
    }
}

impl<T: FromRecord> Inner<T> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn apply(
        &self,
        query: &QueryDescriptor,
        generation: u64,
        result: Result<Vec<RawRecord>, StoreError>,
    ) {
        let key = query.key();
        match result {
            Ok(records) => {
                self.ctx.errors.clear(self.owner, key);
                let items: Vec<T> = map_records(records);
                let fetched_at = self.ctx.clock.now();
                let mut replaced = None;

                self.state.send_if_modified(|snapshot| {
                    // Checked under the channel lock so a concurrent set_query always wins
                    if !self.is_current(generation) {
                        return false;
                    }
                    let cleared_error = snapshot.error.take().is_some();
                    if let Some(current) = &snapshot.data {
                        if !current.stale && current.query_key == *key && current.items == items {
                            return cleared_error;
                        }
                    }
                    let set = Arc::new(CachedResultSet {
                        query_key: key.clone(),
                        items,
                        fetched_at,
                        stale: false,
                    });
                    snapshot.data = Some(set.clone());
                    replaced = Some(set);
                    true
                });

                if let Some(set) = replaced {
                    debug!("{} now has {} {} records", key, set.len(), T::KIND);
                    if self.options.use_cache {
                        self.ctx.cache.put(set);
                    }
                }
            }
            Err(e) if e.is_permission_denied() => {
                debug!("Ignoring permission error for {}: {}", key, e);
                self.ctx.errors.clear(self.owner, key);
                // An earlier transient error no longer describes this source
                self.state.send_if_modified(|snapshot| {
                    self.is_current(generation) && snapshot.error.take().is_some()
                });
            }
            Err(e) => {
                warn!("Fetch of {} failed: {}", key, e);
                let error = SyncError::fetch(key, &e);
                self.ctx.errors.record_failure(self.owner, error.clone());
                self.state.send_if_modified(|snapshot| {
                    if !self.is_current(generation) || snapshot.error.as_ref() == Some(&error) {
                        return false;
                    }
                    snapshot.error = Some(error);
                    true
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Class;
    use crate::store::{collections, MemoryDocumentStore};
    use serde_json::json;

    fn class_fields(name: &str) -> crate::store::Fields {
        json!({"name": name, "teacherId": "t-1"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_immediate() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert(collections::CLASSES, "c-1", class_fields("Biology"));
        let ctx = SyncContext::standalone(store.clone());

        let sync: PollingSynchronizer<Class> = PollingSynchronizer::with_query(
            ctx,
            SyncOptions::default(),
            Some(QueryDescriptor::collection(collections::CLASSES)),
        );
        let snapshot = sync.changed().await;

        assert_eq!(snapshot.items().len(), 1);
        assert_eq!(snapshot.items()[0].name, "Biology");
        assert!(sync.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_synchronizer_never_fetches() {
        let store = Arc::new(MemoryDocumentStore::new());
        let ctx = SyncContext::standalone(store.clone());
        let sync: PollingSynchronizer<Class> = PollingSynchronizer::new(ctx, SyncOptions::default());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!sync.is_active());
        assert_eq!(store.fetch_count(), 0);
        assert!(sync.data().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_setting_same_query_is_a_noop() {
        let store = Arc::new(MemoryDocumentStore::new());
        let ctx = SyncContext::standalone(store.clone());
        let query = QueryDescriptor::collection(collections::CLASSES).where_eq("teacherId", "t-1");

        let mut sync: PollingSynchronizer<Class> =
            PollingSynchronizer::with_query(ctx, SyncOptions::default(), Some(query.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fetches = sync.fetch_count();

        // Equal descriptor built separately
        sync.set_query(Some(
            QueryDescriptor::collection(collections::CLASSES).where_eq("teacherId", "t-1"),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sync.fetch_count(), fetches);
    }

    #[tokio::test]
    async fn test_refresh_handle_is_debuggable() {
        let store = Arc::new(MemoryDocumentStore::new());
        let sync: PollingSynchronizer<Class> =
            PollingSynchronizer::new(SyncContext::standalone(store), SyncOptions::notifications());
        assert_eq!(format!("{:?}", sync.refresh_handle()), "RefreshHandle");
        assert!(!sync.options().use_cache);
    }
}
