use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_RESULT_CAP;
use crate::error::ScanError;

// ---------------------------------------------------------------------------
// Scan definitions
// ---------------------------------------------------------------------------

/// How a scan's rows are ranked by `potential_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Highest score first. Positive-movement scans.
    #[default]
    ScoreDesc,
    /// Lowest score first. Negative-movement scans.
    ScoreAsc,
}

impl std::fmt::Display for SortPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortPolicy::ScoreDesc => write!(f, "score_desc"),
            SortPolicy::ScoreAsc => write!(f, "score_asc"),
        }
    }
}

/// One named screener query. Built once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDefinition {
    pub name: String,
    /// Opaque query text sent to the screener as-is.
    pub query: String,
    #[serde(default)]
    pub sort_policy: SortPolicy,
    #[serde(default = "default_cap")]
    pub cap: usize,
    /// Screener page for this scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Chart URL prefix; the stock symbol is appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_link: Option<String>,
}

fn default_cap() -> usize {
    DEFAULT_RESULT_CAP
}

impl ScanDefinition {
    pub fn new(name: impl Into<String>, query: impl Into<String>, sort_policy: SortPolicy) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            sort_policy,
            cap: DEFAULT_RESULT_CAP,
            link: None,
            chart_link: None,
        }
    }

    pub fn with_link(mut self, link: &str) -> Self {
        self.link = Some(link.to_string());
        self
    }

    pub fn with_chart_link(mut self, chart_link: &str) -> Self {
        self.chart_link = Some(chart_link.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Rows and outcomes
// ---------------------------------------------------------------------------

/// One scored result record. The source fields are kept verbatim alongside
/// the two derived values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub percent_change: f64,
    pub potential_score: f64,
}

impl Row {
    /// Stock identifier used for cross-cycle tracking and de-duplication.
    pub fn symbol(&self) -> Option<&str> {
        self.fields.get("nsecode").and_then(|v| v.as_str())
    }

    pub fn last_price(&self) -> Option<f64> {
        self.fields.get("close").and_then(value_as_f64)
    }
}

/// Numeric view of a JSON value; the screener sends numbers both bare and quoted.
pub fn value_as_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|x| x.is_finite())
}

/// Successful scan result: ordered rows (never longer than the scan's cap)
/// plus how many rows were discarded as malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanRows {
    pub rows: Vec<Row>,
    pub dropped_rows: usize,
}

pub type ScanOutcome = std::result::Result<ScanRows, ScanError>;

/// A scan's slot in the published snapshot.
///
/// `rows` always come from a single cycle (`rows_cycle`). When the latest
/// cycle failed, `error` is set and `rows` are the last-known-good ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanEntry {
    pub rows: Vec<Row>,
    pub dropped_rows: usize,
    /// Cycle that produced `rows`; 0 when no cycle has succeeded yet.
    pub rows_cycle: u64,
    pub error: Option<ScanError>,
}

impl ScanEntry {
    pub fn is_stale(&self) -> bool {
        self.error.is_some()
    }
}

/// Immutable point-in-time view of every active scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSnapshot {
    /// Cycle that published this snapshot; 0 before the first commit.
    pub cycle: u64,
    /// Unix seconds of this commit.
    pub committed_at: Option<u64>,
    /// Unix seconds of the last cycle in which every scan succeeded.
    pub last_success_at: Option<u64>,
    pub scans: BTreeMap<String, ScanEntry>,
}

impl ResultSnapshot {
    /// Rows produced by the snapshot's own cycle, skipping last-known-good carries.
    pub fn fresh_rows(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.scans
            .iter()
            .filter(|(_, entry)| !entry.is_stale() && entry.rows_cycle == self.cycle)
            .flat_map(|(name, entry)| entry.rows.iter().map(move |row| (name.as_str(), row)))
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const UI_APP: &str = "app";
pub const UI_BROWSER: &str = "browser";

/// Persisted key holding the active scan list.
pub const ACTIVE_SCANS_KEY: &str = "conditions";

/// Scan names older settings files may carry, with their current name.
const LEGACY_SCAN_NAMES: &[(&str, &str)] = &[("STRONG STOCKS", "STRONG STOCKS POSITIVE")];

/// Current name for a scan, resolving retired aliases.
pub fn canonical_scan_name(name: &str) -> &str {
    LEGACY_SCAN_NAMES
        .iter()
        .find(|(old, _)| *old == name)
        .map_or(name, |(_, current)| current)
}

/// User-controlled settings. Field names match the persisted file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "conditions", default)]
    pub active_scans: Vec<String>,
    #[serde(rename = "mute_status", default)]
    pub mute: bool,
    #[serde(rename = "app_selected", default = "default_ui_preference")]
    pub ui_preference: String,
    /// Keys this crate does not interpret; written back unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_scans: Vec::new(),
            mute: false,
            ui_preference: default_ui_preference(),
            extra: serde_json::Map::new(),
        }
    }
}

fn default_ui_preference() -> String {
    UI_APP.to_string()
}

impl Settings {
    /// Every catalog scan active, unmuted.
    pub fn defaults(catalog: &[ScanDefinition]) -> Self {
        Self {
            active_scans: catalog.iter().map(|d| d.name.clone()).collect(),
            ..Self::default()
        }
    }

    /// Rename legacy scan names and drop repeats, first occurrence wins.
    pub fn normalize(&mut self) {
        let mut seen: Vec<String> = Vec::with_capacity(self.active_scans.len());
        for name in self.active_scans.drain(..) {
            let name = canonical_scan_name(&name).to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        self.active_scans = seen;
    }

    pub fn is_active(&self, scan_name: &str) -> bool {
        self.active_scans.iter().any(|n| n == scan_name)
    }
}
