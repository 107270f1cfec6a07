//! Background cache pruning.
//!
//! Sweeps expired records out of the weather cache on a fixed interval. The
//! first sweep runs as soon as the task starts. State is in-memory
//! (`Arc<RwLock<PrunerState>>`) and exposed through the status endpoint.
//! The task stops when its [`PrunerHandle`] is shut down.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

use crate::db::store::KvStore;
use crate::services::cache::{CacheManager, PruneReport};

/// Pruner state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PrunerState {
    pub active: bool,
    pub interval_secs: u64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<u64>,
    pub total_runs: u64,
    /// Entries removed by the most recent sweep (expired + corrupt).
    pub last_removed: usize,
    pub total_removed: u64,
}

impl PrunerState {
    pub fn new(interval: Duration) -> Self {
        Self {
            active: false,
            interval_secs: interval.as_secs(),
            next_run_at: None,
            last_run_at: None,
            last_run_duration_ms: None,
            total_runs: 0,
            last_removed: 0,
            total_removed: 0,
        }
    }
}

/// Shared pruner state handle.
pub type SharedPrunerState = Arc<RwLock<PrunerState>>;

/// Owner of a running pruning task.
pub struct PrunerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PrunerHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        // The receiver only disappears if the task already ended.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Pruner: task ended abnormally: {}", e);
        }
    }
}

/// Spawn the pruning loop on the current runtime.
pub fn spawn_pruner<S: KvStore>(
    cache: CacheManager<S>,
    interval: Duration,
    state: SharedPrunerState,
) -> PrunerHandle {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_pruner(cache, interval, state, shutdown_rx));
    PrunerHandle { shutdown, task }
}

async fn run_pruner<S: KvStore>(
    cache: CacheManager<S>,
    interval: Duration,
    state: SharedPrunerState,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("Background pruner started (every {}s)", interval.as_secs());
    state.write().await.active = true;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Utc::now();
                let report = cache.prune_expired().await;
                record_run(&state, report, started, interval).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    {
        let mut s = state.write().await;
        s.active = false;
        s.next_run_at = None;
    }
    tracing::info!("Background pruner stopped");
}

async fn record_run(
    state: &SharedPrunerState,
    report: PruneReport,
    started: DateTime<Utc>,
    interval: Duration,
) {
    let finished = Utc::now();
    let duration_ms = (finished - started).num_milliseconds().max(0) as u64;
    let next_run_at = chrono::Duration::from_std(interval)
        .ok()
        .map(|d| finished + d);

    {
        let mut s = state.write().await;
        s.last_run_at = Some(finished);
        s.last_run_duration_ms = Some(duration_ms);
        s.next_run_at = next_run_at;
        s.total_runs += 1;
        s.last_removed = report.removed();
        s.total_removed += report.removed() as u64;
    }

    if report.removed() > 0 {
        tracing::info!(
            "Pruner: removed {} of {} cached entries in {}ms",
            report.removed(),
            report.scanned,
            duration_ms
        );
    }
}
