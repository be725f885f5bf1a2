use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::AlertConfig;
use crate::types::{ResultSnapshot, Settings};

// ---------------------------------------------------------------------------
// ScoreTracker: per-stock score from the previous cycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct TrackedScore {
    score: f64,
    cycle: u64,
}

/// A stock whose score grew past the configured ratio since its last sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreJump {
    pub symbol: String,
    pub previous: f64,
    pub current: f64,
}

/// Bounded map of stock symbol → last seen `potential_score`.
#[derive(Debug)]
pub struct ScoreTracker {
    scores: DashMap<String, TrackedScore>,
    capacity: usize,
}

impl ScoreTracker {
    pub fn new(capacity: usize) -> Self {
        Self { scores: DashMap::new(), capacity }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[cfg(test)]
    pub fn previous_score(&self, symbol: &str) -> Option<f64> {
        self.scores.get(symbol).map(|t| t.score)
    }

    /// Record this cycle's scores and return the largest jump past `ratio`.
    ///
    /// A stock listed by several scans counts once, with its highest score.
    /// Only positive previous scores can produce a jump.
    pub fn observe(&self, snapshot: &ResultSnapshot, settings: &Settings, ratio: f64) -> Option<ScoreJump> {
        let mut current: HashMap<&str, f64> = HashMap::new();
        for (scan, row) in snapshot.fresh_rows() {
            if !settings.is_active(scan) {
                continue;
            }
            let Some(symbol) = row.symbol() else { continue };
            current
                .entry(symbol)
                .and_modify(|s| *s = s.max(row.potential_score))
                .or_insert(row.potential_score);
        }

        let mut best: Option<ScoreJump> = None;
        for (symbol, score) in current {
            if let Some(prev) = self.scores.get(symbol).map(|t| *t) {
                let jumped = prev.cycle < snapshot.cycle && prev.score > 0.0 && score > prev.score * ratio;
                if jumped && best.as_ref().map_or(true, |b| score / prev.score > b.current / b.previous) {
                    best = Some(ScoreJump {
                        symbol: symbol.to_string(),
                        previous: prev.score,
                        current: score,
                    });
                }
            }
            self.scores
                .insert(symbol.to_string(), TrackedScore { score, cycle: snapshot.cycle });
        }

        if self.scores.len() > self.capacity {
            let before = self.scores.len();
            self.scores.retain(|_, t| t.cycle == snapshot.cycle);
            debug!(evicted = before - self.scores.len(), "Score tracker trimmed to current cycle");
        }

        best
    }
}

// ---------------------------------------------------------------------------
// AlertDebouncer
// ---------------------------------------------------------------------------

/// Why an alert fired.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTrigger {
    /// The cycle produced rows across the active scans.
    NewRows(usize),
    ScoreJump(ScoreJump),
}

/// Decides whether a committed snapshot should signal the alert sink.
#[derive(Debug)]
pub struct AlertDebouncer {
    cfg: AlertConfig,
    last_fired: Mutex<Option<Instant>>,
    tracker: ScoreTracker,
}

impl AlertDebouncer {
    pub fn new(cfg: AlertConfig) -> Self {
        Self {
            cfg,
            last_fired: Mutex::new(None),
            tracker: ScoreTracker::new(cfg.tracker_capacity),
        }
    }

    pub fn consider(&self, snapshot: &ResultSnapshot, settings: &Settings) -> bool {
        self.consider_at(snapshot, settings, Instant::now()).is_some()
    }

    /// Evaluate `snapshot` at time `now`. Returns the trigger when it fires.
    ///
    /// The score tracker is updated on every call, whatever the outcome.
    pub fn consider_at(
        &self,
        snapshot: &ResultSnapshot,
        settings: &Settings,
        now: Instant,
    ) -> Option<AlertTrigger> {
        let jump = self.tracker.observe(snapshot, settings, self.cfg.score_jump_ratio);

        if settings.mute {
            debug!("Alert suppressed: muted");
            return None;
        }

        let mut last_fired = self.last_fired.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = *last_fired {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cfg.min_interval {
                debug!(elapsed_secs = elapsed.as_secs(), "Alert suppressed: within min interval");
                return None;
            }
        }

        let fresh = snapshot
            .fresh_rows()
            .filter(|(scan, _)| settings.is_active(scan))
            .count();
        let trigger = match jump {
            Some(j) => AlertTrigger::ScoreJump(j),
            None if fresh > 0 => AlertTrigger::NewRows(fresh),
            None => return None,
        };

        *last_fired = Some(now);
        match &trigger {
            AlertTrigger::NewRows(n) => info!(rows = n, cycle = snapshot.cycle, "ALERT | {n} rows across active scans"),
            AlertTrigger::ScoreJump(j) => info!(
                symbol = %j.symbol,
                previous = j.previous,
                current = j.current,
                "ALERT | score jump on {}: {:.2} → {:.2}",
                j.symbol, j.previous, j.current,
            ),
        }
        Some(trigger)
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &ScoreTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::types::{Row, ScanEntry};

    fn row(symbol: &str, score: f64) -> Row {
        let serde_json::Value::Object(fields) = json!({ "nsecode": symbol }) else {
            unreachable!()
        };
        Row { fields, percent_change: 1.0, potential_score: score }
    }

    fn snapshot(cycle: u64, scans: Vec<(&str, Vec<Row>)>) -> ResultSnapshot {
        let scans: BTreeMap<String, ScanEntry> = scans
            .into_iter()
            .map(|(name, rows)| {
                (name.to_string(), ScanEntry { rows, rows_cycle: cycle, ..Default::default() })
            })
            .collect();
        ResultSnapshot { cycle, scans, ..Default::default() }
    }

    fn settings(mute: bool) -> Settings {
        Settings { active_scans: vec!["A".to_string(), "B".to_string()], mute, ..Settings::default() }
    }

    fn debouncer(min_interval_secs: u64) -> AlertDebouncer {
        AlertDebouncer::new(AlertConfig {
            min_interval: Duration::from_secs(min_interval_secs),
            score_jump_ratio: 1.2,
            tracker_capacity: 16,
        })
    }

    #[test]
    fn two_cycles_inside_min_interval_fire_once() {
        let d = debouncer(60);
        let t0 = Instant::now();
        assert!(d.consider_at(&snapshot(1, vec![("A", vec![row("X", 1.0)])]), &settings(false), t0).is_some());
        assert!(d
            .consider_at(&snapshot(2, vec![("A", vec![row("X", 1.0)])]), &settings(false), t0 + Duration::from_secs(10))
            .is_none());
        assert!(d
            .consider_at(&snapshot(3, vec![("A", vec![row("X", 1.0)])]), &settings(false), t0 + Duration::from_secs(70))
            .is_some());
    }

    #[test]
    fn two_cycles_outside_min_interval_fire_twice() {
        let d = debouncer(60);
        let t0 = Instant::now();
        assert!(d.consider_at(&snapshot(1, vec![("A", vec![row("X", 1.0)])]), &settings(false), t0).is_some());
        assert!(d
            .consider_at(&snapshot(2, vec![("A", vec![row("X", 1.0)])]), &settings(false), t0 + Duration::from_secs(70))
            .is_some());
    }

    #[test]
    fn mute_suppresses_everything() {
        let d = debouncer(0);
        let t0 = Instant::now();
        let muted = settings(true);
        assert!(d.consider_at(&snapshot(1, vec![("A", vec![row("X", 1.0)])]), &muted, t0).is_none());
        assert!(d
            .consider_at(&snapshot(2, vec![("A", vec![row("X", 1000.0)])]), &muted, t0 + Duration::from_secs(600))
            .is_none());
        // tracking continues while muted
        assert_eq!(d.tracker().previous_score("X"), Some(1000.0));
    }

    #[test]
    fn empty_cycle_does_not_fire() {
        let d = debouncer(0);
        assert!(d.consider_at(&snapshot(1, vec![("A", vec![])]), &settings(false), Instant::now()).is_none());
    }

    #[test]
    fn inactive_scans_do_not_count() {
        let d = debouncer(0);
        let snap = snapshot(1, vec![("C", vec![row("X", 1.0)])]);
        assert!(d.consider_at(&snap, &settings(false), Instant::now()).is_none());
    }

    #[test]
    fn score_jump_detected_against_previous_cycle() {
        let tracker = ScoreTracker::new(16);
        let s = settings(false);
        assert!(tracker.observe(&snapshot(1, vec![("A", vec![row("X", 10.0), row("Y", 10.0)])]), &s, 1.2).is_none());

        let jump = tracker
            .observe(&snapshot(2, vec![("A", vec![row("X", 11.0), row("Y", 13.0)])]), &s, 1.2)
            .unwrap();
        assert_eq!(jump, ScoreJump { symbol: "Y".to_string(), previous: 10.0, current: 13.0 });
        assert_eq!(tracker.previous_score("X"), Some(11.0));
    }

    #[test]
    fn duplicate_symbol_across_scans_counts_once() {
        let tracker = ScoreTracker::new(16);
        let s = settings(false);
        let snap = snapshot(1, vec![("A", vec![row("X", 5.0)]), ("B", vec![row("X", 50.0)])]);
        assert!(tracker.observe(&snap, &s, 1.2).is_none());
        assert_eq!(tracker.previous_score("X"), Some(50.0));
    }

    #[test]
    fn tracker_stays_bounded() {
        let tracker = ScoreTracker::new(4);
        let s = settings(false);
        for cycle in 1..=5 {
            let rows = (0..3).map(|i| row(&format!("S{cycle}-{i}"), 1.0)).collect();
            tracker.observe(&snapshot(cycle, vec![("A", rows)]), &s, 1.2);
            assert!(tracker.len() <= 4);
        }
    }

    #[test]
    fn score_jump_is_reported_as_the_trigger() {
        let d = debouncer(0);
        let s = settings(false);
        let t0 = Instant::now();
        let first = d.consider_at(&snapshot(1, vec![("A", vec![row("X", 10.0)])]), &s, t0);
        assert_eq!(first, Some(AlertTrigger::NewRows(1)));

        let second = d
            .consider_at(&snapshot(2, vec![("A", vec![row("X", 30.0)])]), &s, t0 + Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            second,
            AlertTrigger::ScoreJump(ScoreJump { symbol: "X".to_string(), previous: 10.0, current: 30.0 })
        );
    }
}
