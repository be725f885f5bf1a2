//! Shared health state for the /health endpoint.
//! Updated by the Scheduler, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use crate::scheduler::SchedulerState;

/// Shared health metrics. Updated by the scheduler loop, read by API handlers.
#[derive(Debug, Default)]
pub struct HealthState {
    /// True while the scheduler loop is alive.
    pub scheduler_running: AtomicBool,
    pub cycles_completed: AtomicU64,
    /// Cycles aborted because no token could be obtained.
    pub cycles_aborted: AtomicU64,
    /// Unix seconds of the last cycle end (0 = none).
    pub last_cycle_at: AtomicU64,
    /// Scan failures in the last completed cycle.
    pub last_cycle_scan_errors: AtomicU64,
    /// Unix seconds at which the next cycle is due (0 while a cycle runs or when stopped).
    pub next_cycle_at: AtomicU64,
    pub alerts_fired: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub scheduler: SchedulerState,
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub last_cycle_at: Option<u64>,
    pub last_cycle_scan_errors: u64,
    pub next_cycle_at: Option<u64>,
    pub alerts_fired: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scheduler_running(&self, v: bool) {
        self.scheduler_running.store(v, Ordering::Relaxed);
    }

    pub fn record_completed(&self, at_secs: u64, scan_errors: usize) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at.store(at_secs, Ordering::Relaxed);
        self.last_cycle_scan_errors.store(scan_errors as u64, Ordering::Relaxed);
    }

    pub fn record_aborted(&self, at_secs: u64) {
        self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_at.store(at_secs, Ordering::Relaxed);
    }

    pub fn set_next_cycle_at(&self, at_secs: u64) {
        self.next_cycle_at.store(at_secs, Ordering::Relaxed);
    }

    pub fn inc_alerts_fired(&self) {
        self.alerts_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        if self.scheduler_running.load(Ordering::Relaxed) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    pub fn next_cycle_at(&self) -> Option<u64> {
        nonzero(self.next_cycle_at.load(Ordering::Relaxed))
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            scheduler: self.scheduler_state(),
            cycles_completed: self.cycles_completed(),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            last_cycle_at: nonzero(self.last_cycle_at.load(Ordering::Relaxed)),
            last_cycle_scan_errors: self.last_cycle_scan_errors.load(Ordering::Relaxed),
            next_cycle_at: self.next_cycle_at(),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
        }
    }
}

fn nonzero(v: u64) -> Option<u64> {
    (v != 0).then_some(v)
}
