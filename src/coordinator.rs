//! Refresh coordination for one geography.
//!
//! A single mutex guards the `Idle`/`Running` phase, so the check and the
//! transition are one step and at most one aggregation run is in flight.
//! The running phase carries a `watch` receiver; every caller that wants
//! the result clones it and is woken by the single send at completion.
//!
//! Runs are spawned tasks. A force-refresh caller that goes away (client
//! disconnect) stops waiting but never cancels the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;

use crate::aggregator::{Aggregator, RunReport};
use crate::store::SnapshotStore;
use crate::types::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Running,
}

/// Result handed to every caller that waited on a run.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The snapshot served after the run: the new one if it replaced, the
    /// retained one otherwise. `None` only if no run has ever succeeded.
    pub snapshot: Option<Arc<Snapshot>>,
    pub replaced: bool,
    /// Missing only when the run died without reporting.
    pub report: Option<Arc<RunReport>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerAck {
    pub status: LaunchOutcome,
    pub previous_state: RefreshState,
    pub cache_info: CacheInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub cached: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub age_minutes: Option<f64>,
    pub update_in_progress: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub geography: String,
    pub state: RefreshState,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub last_replaced_at: Option<DateTime<Utc>>,
    pub seconds_since_last_replace: Option<f64>,
    pub last_report: Option<RunReport>,
}

type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;
type OutcomeSender = watch::Sender<Option<RefreshOutcome>>;

enum Phase {
    Idle,
    Running(OutcomeReceiver),
}

struct Inner {
    phase: Phase,
    last_completed_at: Option<DateTime<Utc>>,
    last_replaced_at: Option<DateTime<Utc>>,
    last_report: Option<Arc<RunReport>>,
}

enum Launch {
    Started(OutcomeReceiver),
    Attached(OutcomeReceiver),
}

pub struct RefreshCoordinator {
    geography: String,
    store: Arc<SnapshotStore>,
    aggregator: Arc<Aggregator>,
    interval: Duration,
    inner: Mutex<Inner>,
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    shutdown: Notify,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<SnapshotStore>,
        aggregator: Arc<Aggregator>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            geography: store.geography().to_string(),
            store,
            aggregator,
            interval,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                last_completed_at: None,
                last_replaced_at: None,
                last_report: None,
            }),
            runs_started: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            shutdown: Notify::new(),
        })
    }

    pub fn geography(&self) -> &str {
        &self.geography
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn state(&self) -> RefreshState {
        match self.lock().phase {
            Phase::Idle => RefreshState::Idle,
            Phase::Running(_) => RefreshState::Running,
        }
    }

    /// Start a run unless one is in flight; either way hand back the
    /// receiver of the run the caller now belongs to.
    fn begin(self: &Arc<Self>) -> Launch {
        let mut inner = self.lock();
        if let Phase::Running(rx) = &inner.phase {
            return Launch::Attached(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        inner.phase = Phase::Running(rx.clone());
        drop(inner);

        let run_no = self.runs_started.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("[refresh {}] Starting run #{}", self.geography, run_no);

        let guard = RunGuard {
            coordinator: Arc::clone(self),
            finished: false,
        };
        tokio::spawn(guard.execute(tx));
        Launch::Started(rx)
    }

    /// Timer entry point. Skipped (not queued) while a run is in flight.
    pub fn scheduled_tick(self: &Arc<Self>) -> LaunchOutcome {
        match self.begin() {
            Launch::Started(_) => LaunchOutcome::Started,
            Launch::Attached(_) => {
                tracing::debug!(
                    "[refresh {}] Tick skipped, run already in progress",
                    self.geography
                );
                LaunchOutcome::AlreadyRunning
            }
        }
    }

    /// Fire-and-forget refresh request. Never waits for the run.
    pub fn trigger_async(self: &Arc<Self>) -> TriggerAck {
        let (status, previous_state) = match self.begin() {
            Launch::Started(_) => (LaunchOutcome::Started, RefreshState::Idle),
            Launch::Attached(_) => (LaunchOutcome::AlreadyRunning, RefreshState::Running),
        };
        TriggerAck {
            status,
            previous_state,
            cache_info: self.cache_info(),
        }
    }

    /// Run (or join the in-flight run) and wait for its result.
    pub async fn force_refresh(self: &Arc<Self>) -> RefreshOutcome {
        let rx = match self.begin() {
            Launch::Started(rx) => rx,
            Launch::Attached(rx) => {
                tracing::info!(
                    "[refresh {}] Force refresh joined the run in progress",
                    self.geography
                );
                rx
            }
        };
        self.wait(rx).await
    }

    async fn wait(&self, mut rx: OutcomeReceiver) -> RefreshOutcome {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                tracing::warn!(
                    "[refresh {}] Run ended without a result, serving current snapshot",
                    self.geography
                );
                return RefreshOutcome {
                    snapshot: self.store.get(),
                    replaced: false,
                    report: None,
                };
            }
        }
    }

    /// Apply a finished run: replace-and-persist on any success, keep the
    /// served snapshot on total failure.
    async fn complete(&self, snapshot: Snapshot, report: RunReport) -> RefreshOutcome {
        let report = Arc::new(report);

        let (served, replaced) = match report.to_error() {
            Some(err) => {
                tracing::error!(
                    "[refresh {}] {}; keeping previous snapshot",
                    self.geography,
                    err
                );
                (self.store.get(), false)
            }
            None => (Some(self.store.replace(snapshot)), true),
        };

        if replaced {
            let store = Arc::clone(&self.store);
            match tokio::task::spawn_blocking(move || store.persist()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    "[refresh {}] {}; serving in-memory snapshot only",
                    self.geography,
                    e
                ),
                Err(e) => tracing::error!(
                    "[refresh {}] Persist task failed: {}",
                    self.geography,
                    e
                ),
            }
        }

        RefreshOutcome {
            snapshot: served,
            replaced,
            report: Some(report),
        }
    }

    fn finish(&self, outcome: &RefreshOutcome) {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.phase = Phase::Idle;
        inner.last_completed_at = Some(now);
        if outcome.replaced {
            inner.last_replaced_at = Some(now);
        }
        if let Some(report) = &outcome.report {
            inner.last_report = Some(Arc::clone(report));
        }
        drop(inner);
        self.runs_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn status(&self) -> CoordinatorStatus {
        let inner = self.lock();
        let state = match inner.phase {
            Phase::Idle => RefreshState::Idle,
            Phase::Running(_) => RefreshState::Running,
        };
        let seconds_since_last_replace = match inner.last_replaced_at {
            Some(at) => Some((Utc::now() - at).num_milliseconds().max(0) as f64 / 1000.0),
            None => self.store.age().map(|a| a.as_secs_f64()),
        };
        CoordinatorStatus {
            geography: self.geography.clone(),
            state,
            runs_started: self.runs_started.load(Ordering::SeqCst),
            runs_completed: self.runs_completed.load(Ordering::SeqCst),
            last_completed_at: inner.last_completed_at,
            last_replaced_at: inner.last_replaced_at,
            seconds_since_last_replace,
            last_report: inner.last_report.as_deref().cloned(),
        }
    }

    /// Freshness summary attached to read responses.
    pub fn cache_info(&self) -> CacheInfo {
        let snapshot = self.store.get();
        let last_updated = snapshot.as_ref().map(|s| s.metadata.last_updated);
        let age = last_updated.map(|at| (Utc::now() - at).num_milliseconds().max(0) as f64);
        CacheInfo {
            cached: snapshot.is_some(),
            last_updated,
            age_minutes: age.map(|ms| (ms / 600.0).round() / 100.0),
            update_in_progress: self.state() == RefreshState::Running,
            stale: age.map_or(true, |ms| ms > self.interval.as_millis() as f64),
        }
    }

    /// Fixed-interval refresh loop. Runs until [`RefreshCoordinator::shutdown`].
    pub async fn run_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // skip the first immediate tick

        tracing::info!(
            "[refresh {}] Scheduled refresh every {}s",
            self.geography,
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scheduled_tick();
                }
                _ = self.shutdown.notified() => {
                    tracing::info!("[refresh {}] Refresh loop shutting down", self.geography);
                    break;
                }
            }
        }
    }

    /// Signal the refresh loop to stop. An in-flight run still completes.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Owns one spawned run. If the task dies before reporting, dropping the
/// guard returns the coordinator to `Idle` so later refreshes can start.
struct RunGuard {
    coordinator: Arc<RefreshCoordinator>,
    finished: bool,
}

impl RunGuard {
    async fn execute(mut self, tx: OutcomeSender) {
        let coordinator = Arc::clone(&self.coordinator);
        let (snapshot, report) = coordinator.aggregator.run(&coordinator.geography).await;
        let outcome = coordinator.complete(snapshot, report).await;
        coordinator.finish(&outcome);
        self.finished = true;
        tx.send_replace(Some(outcome));
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!(
                "[refresh {}] Run aborted before completing",
                self.coordinator.geography
            );
            self.coordinator.lock().phase = Phase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{Category, CategoryTable};
    use crate::collector::{CollectError, CollectErrorKind, TrendCollector};
    use crate::types::TrendRecord;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tempfile::TempDir;

    struct ScriptedCollector {
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl ScriptedCollector {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay: Duration::from_millis(delay_ms),
            })
        }
    }

    impl TrendCollector for ScriptedCollector {
        fn collect(
            &self,
            category: &Category,
            geography: &str,
        ) -> std::result::Result<Vec<TrendRecord>, CollectError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::thread::sleep(self.delay);
            if self.failing.load(Ordering::SeqCst) {
                return Err(CollectError::new(CollectErrorKind::Unavailable, "offline"));
            }
            Ok(vec![TrendRecord {
                rank: 1,
                title: format!("call {} for {}", call, category.id),
                traffic: Some("1K+".to_string()),
                category: category.name.to_string(),
                category_id: category.id,
                geography: geography.to_string(),
                started: None,
                ended: None,
                trend_breakdown: vec![],
                explore_link: String::new(),
                timestamp: Utc::now(),
            }])
        }
    }

    fn coordinator(
        dir: &TempDir,
        collector: Arc<ScriptedCollector>,
    ) -> Arc<RefreshCoordinator> {
        let store = Arc::new(SnapshotStore::new("IN", dir.path().join("trends_IN.json")));
        let table = CategoryTable::parse("1,17").unwrap();
        let aggregator = Arc::new(Aggregator::new(collector, table, 1));
        RefreshCoordinator::new(store, aggregator, Duration::from_secs(3600))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_force_refreshes_share_one_run() {
        let dir = TempDir::new().unwrap();
        let collector = ScriptedCollector::new(50);
        let coord = coordinator(&dir, collector.clone());

        let (a, b, c) = tokio::join!(
            coord.force_refresh(),
            coord.force_refresh(),
            coord.force_refresh()
        );

        assert_eq!(collector.calls.load(Ordering::SeqCst), 2);
        let snap = a.snapshot.unwrap();
        assert!(Arc::ptr_eq(&snap, b.snapshot.as_ref().unwrap()));
        assert!(Arc::ptr_eq(&snap, c.snapshot.as_ref().unwrap()));
        assert!(a.replaced && b.replaced && c.replaced);

        let status = coord.status();
        assert_eq!(status.state, RefreshState::Idle);
        assert_eq!(status.runs_started, 1);
        assert_eq!(status.runs_completed, 1);
        assert!(status.last_replaced_at.is_some());
        assert!(coord.store().path().exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ticks_and_triggers_do_not_queue_behind_a_run() {
        let dir = TempDir::new().unwrap();
        let collector = ScriptedCollector::new(100);
        let coord = coordinator(&dir, collector.clone());

        let first = coord.trigger_async();
        assert_eq!(first.status, LaunchOutcome::Started);
        assert_eq!(first.previous_state, RefreshState::Idle);
        assert_eq!(coord.state(), RefreshState::Running);
        assert!(coord.cache_info().update_in_progress);

        assert_eq!(coord.scheduled_tick(), LaunchOutcome::AlreadyRunning);
        let second = coord.trigger_async();
        assert_eq!(second.status, LaunchOutcome::AlreadyRunning);
        assert_eq!(second.previous_state, RefreshState::Running);

        let joined = coord.force_refresh().await;
        assert!(joined.replaced);
        assert_eq!(collector.calls.load(Ordering::SeqCst), 2);
        assert_eq!(coord.status().runs_started, 1);
    }

    #[tokio::test]
    async fn total_failure_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let collector = ScriptedCollector::new(0);
        let coord = coordinator(&dir, collector.clone());

        let good = coord.force_refresh().await.snapshot.unwrap();
        let written = std::fs::read_to_string(coord.store().path()).unwrap();

        collector.failing.store(true, Ordering::SeqCst);
        let outcome = coord.force_refresh().await;

        assert!(!outcome.replaced);
        assert!(Arc::ptr_eq(&good, outcome.snapshot.as_ref().unwrap()));
        assert!(outcome.report.unwrap().is_total_failure());
        assert!(Arc::ptr_eq(&good, &coord.store().get().unwrap()));
        assert_eq!(std::fs::read_to_string(coord.store().path()).unwrap(), written);

        let status = coord.status();
        assert_eq!(status.runs_completed, 2);
        assert_eq!(status.last_report.unwrap().failures.len(), 2);
    }

    #[tokio::test]
    async fn failure_with_nothing_cached_serves_nothing() {
        let dir = TempDir::new().unwrap();
        let collector = ScriptedCollector::new(0);
        collector.failing.store(true, Ordering::SeqCst);
        let coord = coordinator(&dir, collector);

        let outcome = coord.force_refresh().await;
        assert!(outcome.snapshot.is_none());
        assert!(!outcome.replaced);
        assert!(!coord.store().path().exists());

        let info = coord.cache_info();
        assert!(!info.cached);
        assert!(info.stale);
        assert!(info.age_minutes.is_none());
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_ticks_once_per_interval_and_skips_while_running() {
        let dir = TempDir::new().unwrap();
        let collector = ScriptedCollector::new(200);
        let coord = coordinator(&dir, collector.clone());
        let interval = coord.interval();
        let handle = tokio::spawn(Arc::clone(&coord).run_loop());
        settle().await;

        tokio::time::advance(interval / 2).await;
        settle().await;
        assert_eq!(coord.status().runs_started, 0);

        tokio::time::advance(interval / 2).await;
        settle().await;
        assert_eq!(coord.status().runs_started, 1);
        assert_eq!(coord.state(), RefreshState::Running);

        // Second tick lands while the slow run is still collecting.
        tokio::time::advance(interval).await;
        settle().await;
        assert_eq!(coord.status().runs_started, 1);

        coord.shutdown();
        handle.await.unwrap();

        // The collector sleeps on real time, so wait on real time too.
        for _ in 0..500 {
            if coord.status().runs_completed == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
            settle().await;
        }
        let status = coord.status();
        assert_eq!(status.runs_completed, 1);
        assert_eq!(status.runs_started, 1);
        assert_eq!(status.state, RefreshState::Idle);
        assert_eq!(collector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let coord = coordinator(&dir, ScriptedCollector::new(0));
        let handle = tokio::spawn(Arc::clone(&coord).run_loop());

        tokio::task::yield_now().await;
        coord.shutdown();
        handle.await.unwrap();
        assert_eq!(coord.status().runs_started, 0);
    }
}
