use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::health::{HealthReport, HealthState};
use crate::config::{AlertConfig, SchedulerConfig, SUGGESTION_LIMIT};
use crate::detector::{classify, AlertDebouncer, AlertSink, Suggestions};
use crate::error::{AppError, Result};
use crate::indices::{IndexFeed, IndexQuote};
use crate::scheduler::{now_secs, SchedulerState};
use crate::state::{ResultCache, SettingsStore};
use crate::types::{canonical_scan_name, ResultSnapshot, ScanDefinition, Settings, UI_APP, UI_BROWSER};

/// Partial settings change. Absent fields keep their current value.
///
/// Accepts the persisted field names as well as the short ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, alias = "conditions")]
    pub active_scans: Option<Vec<String>>,
    #[serde(default, alias = "mute_status")]
    pub mute: Option<bool>,
    #[serde(default, alias = "app_selected", alias = "selected_option")]
    pub ui_preference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshInfo {
    pub interval_secs: u64,
    pub retry_secs: u64,
    pub scheduler: SchedulerState,
    /// Seconds until the next cycle, `None` while a cycle runs or when stopped.
    pub next_refresh_in: Option<u64>,
}

/// Everything outside the scheduler touches the core through this handle.
///
/// Cheap to clone; every clone shares the same cache, settings and alert state.
#[derive(Clone)]
pub struct ScannerHandle {
    catalog: Arc<Vec<ScanDefinition>>,
    cache: Arc<ResultCache>,
    settings: Arc<SettingsStore>,
    debouncer: Arc<AlertDebouncer>,
    sink: Arc<dyn AlertSink>,
    health: Arc<HealthState>,
    scheduler_cfg: SchedulerConfig,
    price_ceiling: f64,
    index_feed: Option<Arc<IndexFeed>>,
}

impl ScannerHandle {
    pub fn new(
        catalog: Vec<ScanDefinition>,
        settings: Arc<SettingsStore>,
        alert_cfg: AlertConfig,
        sink: Arc<dyn AlertSink>,
        scheduler_cfg: SchedulerConfig,
        price_ceiling: f64,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            cache: ResultCache::new(),
            settings,
            debouncer: Arc::new(AlertDebouncer::new(alert_cfg)),
            sink,
            health: Arc::new(HealthState::new()),
            scheduler_cfg,
            price_ceiling,
            index_feed: None,
        }
    }

    pub fn with_index_feed(mut self, feed: IndexFeed) -> Self {
        self.index_feed = Some(Arc::new(feed));
        self
    }

    // --- core components, used by the scheduler ---

    pub fn catalog(&self) -> &[ScanDefinition] {
        &self.catalog
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn debouncer(&self) -> &AlertDebouncer {
        &self.debouncer
    }

    pub fn sink(&self) -> &dyn AlertSink {
        self.sink.as_ref()
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler_cfg
    }

    // --- consumer-facing API ---

    /// Latest committed snapshot. Never waits on a running cycle.
    pub fn get_snapshot(&self) -> Arc<ResultSnapshot> {
        self.cache.snapshot()
    }

    pub fn list_scans(&self) -> &[ScanDefinition] {
        &self.catalog
    }

    pub fn get_settings(&self) -> Arc<Settings> {
        self.settings.current()
    }

    /// Validate and persist a settings change. Takes effect on the next cycle.
    pub async fn set_settings(&self, update: SettingsUpdate) -> Result<Arc<Settings>> {
        let active_scans = update
            .active_scans
            .map(|names| self.validate_scan_names(names))
            .transpose()?;
        if let Some(ui) = update.ui_preference.as_deref() {
            if ui != UI_APP && ui != UI_BROWSER {
                return Err(AppError::InvalidSettings(format!(
                    "ui preference must be '{UI_APP}' or '{UI_BROWSER}', got '{ui}'"
                )));
            }
        }

        let saved = self
            .settings
            .update(|s| {
                if let Some(active) = active_scans {
                    s.active_scans = active;
                }
                if let Some(mute) = update.mute {
                    s.mute = mute;
                }
                if let Some(ui) = update.ui_preference {
                    s.ui_preference = ui;
                }
            })
            .await?;
        info!(
            active = saved.active_scans.len(),
            mute = saved.mute,
            ui = %saved.ui_preference,
            "Settings updated",
        );
        Ok(saved)
    }

    /// Known names only, first occurrence wins. Retired aliases are renamed.
    fn validate_scan_names(&self, names: Vec<String>) -> Result<Vec<String>> {
        let mut out: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = canonical_scan_name(&name).to_string();
            if !self.catalog.iter().any(|d| d.name == name) {
                return Err(AppError::InvalidSettings(format!("unknown scan '{name}'")));
            }
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Ok(out)
    }

    pub fn get_mute(&self) -> bool {
        self.settings.current().mute
    }

    pub async fn set_mute(&self, mute: bool) -> Result<Arc<Settings>> {
        self.set_settings(SettingsUpdate { mute: Some(mute), ..Default::default() }).await
    }

    /// Signal the alert sink right away, bypassing the debounce window.
    ///
    /// Muted settings win; returns whether the sink was signalled.
    pub fn trigger_test_alert(&self) -> bool {
        if self.settings.current().mute {
            info!("Test alert requested while muted; not signalling");
            return false;
        }
        info!("Test alert requested");
        self.sink.signal_alert();
        true
    }

    pub fn suggestions(&self) -> Suggestions {
        classify(&self.cache.snapshot(), &self.settings.current(), self.price_ceiling, SUGGESTION_LIMIT)
    }

    /// Current quotes of the tracked market indices. Empty when no feed is configured.
    pub async fn indices(&self) -> Result<Vec<IndexQuote>> {
        match &self.index_feed {
            Some(feed) => feed.fetch().await,
            None => Ok(Vec::new()),
        }
    }

    pub fn refresh_info(&self) -> RefreshInfo {
        let report = self.health.report();
        RefreshInfo {
            interval_secs: self.scheduler_cfg.interval_ok.as_secs(),
            retry_secs: self.scheduler_cfg.interval_err.as_secs(),
            scheduler: report.scheduler,
            next_refresh_in: report.next_cycle_at.map(|at| at.saturating_sub(now_secs())),
        }
    }

    pub fn health_report(&self) -> HealthReport {
        self.health.report()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::detector::sink::testing::CountingSink;
    use crate::types::SortPolicy;

    async fn handle() -> (TempDir, Arc<CountingSink>, ScannerHandle) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = vec![
            ScanDefinition::new("A", "qa", SortPolicy::ScoreDesc),
            ScanDefinition::new("B", "qb", SortPolicy::ScoreAsc),
        ];
        let store = SettingsStore::open(dir.path().join("db.json"), Settings::defaults(&catalog)).await;
        let sink = Arc::new(CountingSink::default());
        let h = ScannerHandle::new(
            catalog,
            store,
            AlertConfig::default(),
            sink.clone(),
            SchedulerConfig::default(),
            2250.0,
        );
        (dir, sink, h)
    }

    #[tokio::test]
    async fn unknown_scan_names_are_rejected() {
        let (_dir, _sink, h) = handle().await;
        let err = h
            .set_settings(SettingsUpdate { active_scans: Some(vec!["Z".to_string()]), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSettings(_)));
        assert_eq!(h.get_settings().active_scans, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn bad_ui_preference_is_rejected() {
        let (_dir, _sink, h) = handle().await;
        let update = SettingsUpdate { ui_preference: Some("desktop".to_string()), ..Default::default() };
        assert!(matches!(h.set_settings(update).await, Err(AppError::InvalidSettings(_))));
    }

    #[tokio::test]
    async fn settings_are_deduped_and_persisted() {
        let (dir, _sink, h) = handle().await;
        let update: SettingsUpdate =
            serde_json::from_str(r#"{ "conditions": ["B", "A", "B"], "selected_option": "browser" }"#).unwrap();
        let saved = h.set_settings(update).await.unwrap();
        assert_eq!(saved.active_scans, vec!["B", "A"]);
        assert_eq!(saved.ui_preference, UI_BROWSER);
        assert!(!saved.mute);

        let reopened = SettingsStore::open(dir.path().join("db.json"), Settings::defaults(&[])).await;
        assert_eq!(*reopened.current(), *saved);
    }

    #[tokio::test]
    async fn mute_round_trips() {
        let (_dir, _sink, h) = handle().await;
        assert!(!h.get_mute());
        h.set_mute(true).await.unwrap();
        assert!(h.get_mute());
        assert_eq!(h.get_settings().active_scans, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_alert_respects_mute() {
        let (_dir, sink, h) = handle().await;
        assert!(h.trigger_test_alert());
        assert!(h.trigger_test_alert());
        assert_eq!(sink.count(), 2);

        h.set_mute(true).await.unwrap();
        assert!(!h.trigger_test_alert());
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn legacy_scan_names_are_accepted_in_updates() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = vec![
            ScanDefinition::new("STRONG STOCKS POSITIVE", "q", SortPolicy::ScoreDesc),
            ScanDefinition::new("B", "qb", SortPolicy::ScoreAsc),
        ];
        let store = SettingsStore::open(dir.path().join("db.json"), Settings::defaults(&catalog)).await;
        let h = ScannerHandle::new(
            catalog,
            store,
            AlertConfig::default(),
            Arc::new(CountingSink::default()),
            SchedulerConfig::default(),
            2250.0,
        );
        let update = SettingsUpdate {
            active_scans: Some(vec!["STRONG STOCKS".to_string(), "STRONG STOCKS POSITIVE".to_string()]),
            ..Default::default()
        };
        assert_eq!(h.set_settings(update).await.unwrap().active_scans, vec!["STRONG STOCKS POSITIVE"]);
    }

    #[tokio::test]
    async fn indices_are_empty_without_a_feed() {
        let (_dir, _sink, h) = handle().await;
        assert!(h.indices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_handle_reports_idle_state() {
        let (_dir, _sink, h) = handle().await;
        assert_eq!(h.get_snapshot().cycle, 0);
        assert!(h.suggestions().buy.is_empty());
        let info = h.refresh_info();
        assert_eq!(info.interval_secs, 120);
        assert_eq!(info.retry_secs, 30);
        assert_eq!(info.next_refresh_in, None);
        assert_eq!(info.scheduler, SchedulerState::Stopped);
    }
}
