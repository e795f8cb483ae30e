//! Periodic refresh of the feeds and the published state.
//!
//! ```text
//! Idle ──start──▶ Loading ──ok──▶ Ready ──tick──▶ Refreshing ──ok──▶ Ready
//!                    │                                  │
//!                    └──────────err──▶ Error ◀───err────┘
//! ```
//!
//! A foreground refresh (startup, or an explicit request) raises the
//! loading flag; a background tick never touches it. Cycles are serialized,
//! and the next tick is only armed once the previous cycle has finished.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PollConfig;
use crate::feed::{FeedClient, FeedSnapshot, FeedSources};
use crate::gbfs::{FeedError, Fetcher};
use crate::history::SnapshotHistory;
use crate::reconcile::{EnrichedStation, MetricsSnapshot, SystemTotals, create_snapshot, join};
use crate::store::{PersistedState, StateStore};

/// Lifecycle phase of the published state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing fetched yet.
    Idle,
    /// Foreground refresh in progress.
    Loading,
    /// Last refresh succeeded.
    Ready,
    /// Background refresh in progress; previous data still published.
    Refreshing,
    /// Last refresh failed.
    Error,
}

/// Whether a refresh is visible to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Raises the loading flag; a failure with no prior data is blocking.
    Foreground,
    /// Silent; only the underlying data and error are updated.
    Background,
}

/// Everything consumers can read, replaced atomically per cycle.
#[derive(Debug, Clone)]
pub struct PulseState {
    pub phase: Phase,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Set when a foreground refresh failed and there is no data to show.
    pub blocking_error: bool,
    /// Milliseconds since the epoch of the last successful refresh.
    pub last_update: Option<i64>,
    pub stations: Arc<[EnrichedStation]>,
    pub totals: SystemTotals,
    /// Which tier each feed came from in the last successful refresh.
    pub sources: Option<FeedSources>,
    pub history: SnapshotHistory,
}

impl PulseState {
    fn restored(history: SnapshotHistory, last_update: Option<i64>) -> Self {
        Self {
            phase: Phase::Idle,
            is_loading: false,
            error: None,
            blocking_error: false,
            last_update,
            stations: Arc::from(Vec::new()),
            totals: SystemTotals::default(),
            sources: None,
            history,
        }
    }
}

struct PollTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct Inner<F> {
    feeds: FeedClient<F>,
    store: Arc<dyn StateStore>,
    config: PollConfig,
    state: RwLock<PulseState>,
    /// Held for the duration of a refresh cycle.
    cycle: Mutex<()>,
    task: Mutex<Option<PollTask>>,
}

/// Drives refresh cycles and owns the published state.
pub struct Poller<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for Poller<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Fetcher + 'static> Poller<F> {
    /// Create a poller, restoring history from `store`.
    ///
    /// An unreadable store is logged and treated as empty.
    pub fn new(
        feeds: FeedClient<F>,
        store: Arc<dyn StateStore>,
        config: PollConfig,
    ) -> Self {
        let persisted = match store.load() {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to load persisted state, starting empty");
                PersistedState::default()
            }
        };

        let history = SnapshotHistory::from_entries(persisted.snapshots, config.history_capacity);
        if !history.is_empty() {
            info!(snapshots = history.len(), "restored snapshot history");
        }
        let state = PulseState::restored(history, persisted.last_update);

        Self {
            inner: Arc::new(Inner {
                feeds,
                store,
                config,
                state: RwLock::new(state),
                cycle: Mutex::new(()),
                task: Mutex::new(None),
            }),
        }
    }

    /// Run one refresh cycle and publish its result.
    ///
    /// On failure the error is recorded in the published state and also
    /// returned; the poller keeps running either way.
    pub async fn refresh(&self, mode: RefreshMode) -> Result<MetricsSnapshot, FeedError> {
        let _cycle = self.inner.cycle.lock().await;
        self.begin(mode).await;

        match self.inner.feeds.fetch_all().await {
            Ok(feeds) => Ok(self.publish(mode, feeds).await),
            Err(err) => {
                self.fail(mode, &err).await;
                Err(err)
            }
        }
    }

    /// Immediate foreground refresh.
    pub async fn refresh_now(&self) -> Result<MetricsSnapshot, FeedError> {
        self.refresh(RefreshMode::Foreground).await
    }

    async fn begin(&self, mode: RefreshMode) {
        let mut state = self.inner.state.write().await;
        state.error = None;
        match mode {
            RefreshMode::Foreground => {
                state.phase = Phase::Loading;
                state.is_loading = true;
                state.blocking_error = false;
            }
            RefreshMode::Background => state.phase = Phase::Refreshing,
        }
    }

    async fn publish(&self, mode: RefreshMode, feeds: FeedSnapshot) -> MetricsSnapshot {
        let stations: Arc<[EnrichedStation]> = join(&feeds.stations, &feeds.status).into();
        let snapshot = create_snapshot(&feeds.stations, &feeds.status, feeds.timestamp);

        let (added, persisted) = {
            let mut state = self.inner.state.write().await;
            let added = state.history.add(snapshot).clone();

            state.phase = Phase::Ready;
            state.error = None;
            state.blocking_error = false;
            if mode == RefreshMode::Foreground {
                state.is_loading = false;
            }
            state.last_update = Some(feeds.timestamp);
            state.stations = stations;
            state.totals = SystemTotals::from(&added.metrics);
            state.sources = Some(feeds.sources);

            let persisted = PersistedState {
                snapshots: state.history.to_vec(),
                last_update: state.last_update,
            };
            (added, persisted)
        };

        // File stores do blocking I/O.
        let store = Arc::clone(&self.inner.store);
        match tokio::task::spawn_blocking(move || store.save(&persisted)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to persist snapshot history"),
            Err(e) => error!(error = %e, "persist task ended abnormally"),
        }

        info!(
            ?mode,
            stations = feeds.stations.len(),
            status = feeds.status.len(),
            information_source = ?feeds.sources.information,
            status_source = ?feeds.sources.status,
            "data updated"
        );
        added
    }

    async fn fail(&self, mode: RefreshMode, err: &FeedError) {
        error!(?mode, error = %err, "refresh failed");

        let mut state = self.inner.state.write().await;
        state.phase = Phase::Error;
        state.error = Some(err.to_string());
        if mode == RefreshMode::Foreground {
            state.is_loading = false;
            state.blocking_error = state.stations.is_empty();
        }
    }

    /// Start the poll loop: a foreground refresh now, then a background
    /// refresh every interval.
    ///
    /// Returns `false` if the loop is already running.
    pub async fn start(&self) -> bool {
        let mut task = self.inner.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (shutdown, rx) = oneshot::channel();
        let poller = self.clone();
        let handle = tokio::spawn(async move { poller.run(rx).await });
        *task = Some(PollTask { shutdown, handle });
        true
    }

    /// Stop the poll loop.
    ///
    /// No further ticks fire; a cycle already in progress runs to completion
    /// before this returns. Returns `false` if the loop was not running.
    pub async fn stop(&self) -> bool {
        let Some(task) = self.inner.task.lock().await.take() else {
            return false;
        };

        // The loop may already have exited, dropping the receiver.
        let _ = task.shutdown.send(());
        if let Err(e) = task.handle.await {
            error!(error = %e, "poll task ended abnormally");
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let interval = self.inner.config.interval;
        info!(interval_secs = interval.as_secs(), "poller started");

        // Failures are recorded in the published state.
        let _ = self.refresh(RefreshMode::Foreground).await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
            }
            debug!("background refresh tick");
            let _ = self.refresh(RefreshMode::Background).await;
        }

        info!("poller stopped");
    }

    /// A consistent copy of the published state.
    pub async fn state(&self) -> PulseState {
        self.inner.state.read().await.clone()
    }

    /// Current enriched stations.
    pub async fn stations(&self) -> Arc<[EnrichedStation]> {
        Arc::clone(&self.inner.state.read().await.stations)
    }

    /// Snapshot history, newest first.
    pub async fn history(&self) -> Vec<MetricsSnapshot> {
        self.inner.state.read().await.history.to_vec()
    }
}
