//! # Collection Fetchers
//!
//! A [`Fetcher`] owns a cached, refreshable copy of one parameterized slice
//! of a backend collection and publishes it through a `watch` cell.
//!
//! Consistency rules:
//! - every fetch takes a generation number; a result is applied only if no
//!   newer fetch has settled already, so a late answer never clobbers a newer one
//! - changing the parameters bumps an epoch and empties the cache; answers
//!   issued under an older epoch are dropped
//! - a failed fetch keeps the previous rows and records the error
//! - live slices refresh in full on *any* change event; the event payload is
//!   never patched into the cache
//! - after teardown (or drop) nothing is applied and the change subscription
//!   is released exactly once

use crate::io::{bounded, decode_rows};
use chrono::{DateTime, Utc};
use domains::{BackendClient, BoardError, ChangeFeed, Collection, Filter, Query, RecordStore, Subscription};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Network deadline applied to every backend call unless configured otherwise.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Row bound of the notification inbox.
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 50;

/// Tunables shared by fetchers and one-shot actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub fetch_timeout: Duration,
    pub notification_limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            notification_limit: DEFAULT_NOTIFICATION_LIMIT,
        }
    }
}

/// One parameterized slice of a backend collection.
///
/// The slice value itself is the fetcher's parameter set: two slices that
/// compare equal describe the same server-side query.
pub trait CollectionSlice: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Item: DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static;

    /// The read that fills the cache.
    fn query(&self) -> Query;

    /// Collection and filter whose changes trigger a refresh.
    /// `None` for slices refreshed only on demand.
    fn change_scope(&self) -> Option<(Collection, Filter)> {
        None
    }
}

/// Snapshot of a fetcher's cache as published to observers.
#[derive(Debug, Clone)]
pub struct FetchState<K: CollectionSlice> {
    params: K,
    items: Arc<Vec<K::Item>>,
    in_flight: usize,
    error: Option<String>,
    synced_at: Option<DateTime<Utc>>,
    epoch: u64,
    applied: u64,
}

impl<K: CollectionSlice> FetchState<K> {
    fn new(params: K) -> Self {
        Self {
            params,
            items: Arc::new(Vec::new()),
            in_flight: 0,
            error: None,
            synced_at: None,
            epoch: 0,
            applied: 0,
        }
    }

    /// Parameters the cached rows belong to.
    pub fn params(&self) -> &K {
        &self.params
    }

    pub fn items(&self) -> &[K::Item] {
        &self.items
    }

    /// Cheap shared handle to the cached rows.
    pub fn shared_items(&self) -> Arc<Vec<K::Item>> {
        self.items.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Message of the last failed fetch, cleared by the next success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// When the cache last took a successful answer.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }
}

/// How a single fetch ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The answer replaced the cache.
    Applied { rows: usize },
    /// A newer fetch, a parameter change or teardown superseded this one.
    Stale,
    /// The backend call failed; the cache was left as it was.
    Failed(BoardError),
}

impl FetchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FetchOutcome::Applied { .. })
    }
}

struct Shared<K: CollectionSlice> {
    records: Arc<dyn RecordStore>,
    state: watch::Sender<FetchState<K>>,
    issued: AtomicU64,
    closed: AtomicBool,
    timeout: Duration,
}

impl<K: CollectionSlice> Shared<K> {
    async fn fetch(&self) -> FetchOutcome {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let mut started = None;
        self.state.send_modify(|s| {
            s.in_flight += 1;
            started = Some((s.params.clone(), s.epoch));
        });
        let Some((params, epoch)) = started else {
            return FetchOutcome::Stale;
        };

        let query = params.query();
        let collection = query.collection;
        debug!(%collection, generation, "fetching");

        let result = bounded(self.timeout, self.records.query(query))
            .await
            .and_then(decode_rows::<K::Item>);

        let closed = self.closed.load(Ordering::SeqCst);
        let mut outcome = FetchOutcome::Stale;
        self.state.send_if_modified(|s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            if closed || s.epoch != epoch || generation <= s.applied {
                return true;
            }
            s.applied = generation;
            match result {
                Ok(items) => {
                    outcome = FetchOutcome::Applied { rows: items.len() };
                    s.items = Arc::new(items);
                    s.error = None;
                    s.synced_at = Some(Utc::now());
                }
                Err(err) => {
                    s.error = Some(err.to_string());
                    outcome = FetchOutcome::Failed(err);
                }
            }
            true
        });

        match &outcome {
            FetchOutcome::Applied { rows } => debug!(%collection, generation, rows, "cache updated"),
            FetchOutcome::Stale => debug!(%collection, generation, "discarded superseded answer"),
            FetchOutcome::Failed(err) => {
                warn!(%collection, generation, error = %err, "fetch failed; keeping cached rows")
            }
        }
        outcome
    }

    fn record_error(&self, err: &BoardError) {
        let message = err.to_string();
        self.state.send_modify(|s| s.error = Some(message));
    }
}

/// Live change subscription plus the task draining it.
struct ChangeWatch {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ChangeWatch {
    /// Signals the task and waits until it has released the subscription.
    async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "change watch task ended abnormally");
        }
    }
}

async fn run_watch<K: CollectionSlice>(
    shared: Weak<Shared<K>>,
    changes: Arc<dyn ChangeFeed>,
    mut subscription: Subscription,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = subscription.events.recv() => match event {
                Some(event) => {
                    let Some(shared) = shared.upgrade() else { break };
                    debug!(collection = %event.collection, kind = ?event.kind, "change received; refreshing");
                    shared.fetch().await;
                }
                None => {
                    warn!(subscription = subscription.id.0, "change feed closed; live refresh stopped");
                    break;
                }
            }
        }
    }

    if let Err(err) = changes.unsubscribe(subscription.id).await {
        warn!(subscription = subscription.id.0, error = %err, "failed to release change subscription");
    } else {
        debug!(subscription = subscription.id.0, "change subscription released");
    }
}

/// Cached, refreshable view of one collection slice.
pub struct Fetcher<K: CollectionSlice> {
    shared: Arc<Shared<K>>,
    changes: Arc<dyn ChangeFeed>,
    watch: Mutex<Option<ChangeWatch>>,
}

impl<K: CollectionSlice> Fetcher<K> {
    /// Creates the fetcher, subscribes to its change scope (if any) and
    /// performs the first fetch. Failures end up in [`FetchState::error`].
    pub async fn initialize(client: &BackendClient, params: K, options: &SyncOptions) -> Self {
        let (state, _) = watch::channel(FetchState::new(params));
        let fetcher = Self {
            shared: Arc::new(Shared {
                records: client.records.clone(),
                state,
                issued: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                timeout: options.fetch_timeout,
            }),
            changes: client.changes.clone(),
            watch: Mutex::new(None),
        };
        fetcher.rewatch().await;
        fetcher.fetch().await;
        fetcher
    }

    /// Reads the slice from the backend into the cache.
    pub async fn fetch(&self) -> FetchOutcome {
        if self.shared.closed.load(Ordering::SeqCst) {
            return FetchOutcome::Stale;
        }
        self.shared.fetch().await
    }

    /// Explicit invalidation after a write.
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch().await
    }

    /// Switches to a new parameter set: the old cache is discarded, the
    /// change subscription moves to the new scope and a fetch is issued.
    pub async fn set_params(&self, params: K) -> FetchOutcome {
        let changed = self.shared.state.send_if_modified(|s| {
            if s.params == params {
                return false;
            }
            s.params = params;
            s.epoch += 1;
            s.items = Arc::new(Vec::new());
            s.error = None;
            s.synced_at = None;
            true
        });
        if changed {
            self.rewatch().await;
        }
        self.fetch().await
    }

    /// Stops all activity: in-flight answers are dropped on arrival and the
    /// change subscription is released. Safe to call more than once.
    pub async fn teardown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(watch) = self.watch.lock().await.take() {
            watch.stop().await;
        }
    }

    pub fn state(&self) -> FetchState<K> {
        self.shared.state.borrow().clone()
    }

    pub fn items(&self) -> Arc<Vec<K::Item>> {
        self.shared.state.borrow().shared_items()
    }

    pub fn params(&self) -> K {
        self.shared.state.borrow().params.clone()
    }

    /// Receiver that wakes on every cache change, for eager recomputation
    /// of projections.
    pub fn subscribe_state(&self) -> watch::Receiver<FetchState<K>> {
        self.shared.state.subscribe()
    }

    /// Whether a live change subscription is currently held.
    pub async fn is_watching(&self) -> bool {
        self.watch.lock().await.is_some()
    }

    async fn rewatch(&self) {
        let mut slot = self.watch.lock().await;
        if let Some(previous) = slot.take() {
            previous.stop().await;
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }
        let params = self.params();
        let Some((collection, filter)) = params.change_scope() else {
            return;
        };

        match bounded(self.shared.timeout, self.changes.subscribe(collection, filter)).await {
            Ok(subscription) => {
                debug!(%collection, subscription = subscription.id.0, "watching for changes");
                let (shutdown, shutdown_rx) = oneshot::channel();
                let task = tokio::spawn(run_watch(
                    Arc::downgrade(&self.shared),
                    self.changes.clone(),
                    subscription,
                    shutdown_rx,
                ));
                *slot = Some(ChangeWatch { shutdown, task });
            }
            Err(err) => {
                warn!(%collection, error = %err, "could not subscribe; only explicit refreshes will update");
                self.shared.record_error(&err);
            }
        }
    }
}

impl<K: CollectionSlice> Drop for Fetcher<K> {
    fn drop(&mut self) {
        // Dropping the watch closes its shutdown channel; the task then
        // releases the subscription on its own.
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

impl<K: CollectionSlice> fmt::Debug for Fetcher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}
