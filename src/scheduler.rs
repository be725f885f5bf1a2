use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::ScanError;
use crate::fetcher::{QuerySession, ScreenerService, Token};
use crate::handle::ScannerHandle;
use crate::scorer::run_scan;
use crate::types::{ScanDefinition, ScanOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// How a cycle ended, which decides the following sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// The screener was reached. Individual scans may still have failed.
    Completed { scans: usize, failed: usize },
    /// No token could be obtained; nothing was queried.
    Aborted,
}

/// Drives fetch → score → commit → alert on a fixed interval.
///
/// Started at most once per process. `stop` cancels the inter-cycle sleep
/// immediately; a cycle already in flight runs to its commit first.
pub struct Scheduler<S> {
    cfg: SchedulerConfig,
    session: Arc<QuerySession<S>>,
    core: ScannerHandle,
    shutdown: CancellationToken,
    started: AtomicBool,
    cycle: AtomicU64,
}

impl<S: ScreenerService> Scheduler<S> {
    pub fn new(session: QuerySession<S>, core: ScannerHandle) -> Arc<Self> {
        Arc::new(Self {
            cfg: core.scheduler_config(),
            session: Arc::new(session),
            core,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            cycle: AtomicU64::new(0),
        })
    }

    /// Spawn the loop. Returns `None` if it was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already started; ignoring start request");
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run().await }))
    }

    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Scheduler stop requested");
        }
        self.shutdown.cancel();
    }

    pub fn state(&self) -> SchedulerState {
        if self.started.load(Ordering::SeqCst) && !self.shutdown.is_cancelled() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    async fn run(self: Arc<Self>) {
        let health = self.core.health();
        health.set_scheduler_running(true);
        info!(
            interval_ok_secs = self.cfg.interval_ok.as_secs(),
            interval_err_secs = self.cfg.interval_err.as_secs(),
            "Scheduler running",
        );

        while !self.shutdown.is_cancelled() {
            health.set_next_cycle_at(0);
            let wait = match self.run_cycle().await {
                CycleStatus::Completed { .. } => self.cfg.interval_ok,
                CycleStatus::Aborted => self.cfg.interval_err,
            };
            health.set_next_cycle_at(now_secs() + wait.as_secs());

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        health.set_next_cycle_at(0);
        health.set_scheduler_running(false);
        info!("Scheduler stopped");
    }

    /// Run one full cycle against the settings in effect right now.
    pub async fn run_cycle(&self) -> CycleStatus {
        let started = Instant::now();
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let settings = self.core.settings_store().current();
        let active: Vec<ScanDefinition> = self
            .core
            .catalog()
            .iter()
            .filter(|d| settings.is_active(&d.name))
            .cloned()
            .collect();

        let outcomes = if active.is_empty() {
            debug!(cycle, "No active scans");
            BTreeMap::new()
        } else {
            // One token per cycle, shared by all of its scans.
            self.session.invalidate();
            match self.session.ensure_token().await {
                Ok(token) => self.execute_all(&active, token).await,
                Err(e) => {
                    warn!(cycle, "Cycle aborted, no screener token: {e}");
                    let outcomes = active.iter().map(|d| (d.name.clone(), Err(e.clone()))).collect();
                    let now = now_secs();
                    self.core.cache().commit(cycle, outcomes, now);
                    self.core.health().record_aborted(now);
                    return CycleStatus::Aborted;
                }
            }
        };

        let mut failed = 0usize;
        let mut total_rows = 0usize;
        for (name, outcome) in &outcomes {
            match outcome {
                Ok(scan) => total_rows += scan.rows.len(),
                Err(e) => {
                    failed += 1;
                    warn!(scan = %name, kind = %e.kind, "Scan failed: {}", e.message);
                }
            }
        }
        let scans = outcomes.len();

        let now = now_secs();
        let snapshot = self.core.cache().commit(cycle, outcomes, now);
        if self.core.debouncer().consider(&snapshot, &settings) {
            self.core.health().inc_alerts_fired();
            self.core.sink().signal_alert();
        }
        self.core.health().record_completed(now, failed);

        info!(
            cycle,
            scans,
            failed,
            rows = total_rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cycle {cycle} complete: {}/{scans} scans ok, {total_rows} rows",
            scans - failed,
        );

        CycleStatus::Completed { scans, failed }
    }

    /// Run every active scan concurrently and gather all outcomes before returning.
    async fn execute_all(
        &self,
        active: &[ScanDefinition],
        token: Token,
    ) -> BTreeMap<String, ScanOutcome> {
        let mut join_set: JoinSet<(String, ScanOutcome)> = JoinSet::new();
        for def in active.iter().cloned() {
            let session = Arc::clone(&self.session);
            let token = token.clone();
            join_set.spawn(async move {
                let outcome = run_scan(&def, &*session, &token).await;
                (def.name, outcome)
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    outcomes.insert(name, outcome);
                }
                Err(e) => warn!("Scan task failed: {e}"),
            }
        }

        // A task that panicked left no outcome behind.
        for def in active {
            outcomes
                .entry(def.name.clone())
                .or_insert_with(|| Err(ScanError::transport("scan task failed")));
        }
        outcomes
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
