use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthReport;
use crate::detector::Suggestions;
use crate::error::AppError;
use crate::handle::{RefreshInfo, ScannerHandle, SettingsUpdate};
use crate::indices::IndexQuote;
use crate::types::{ResultSnapshot, ScanDefinition, Settings};

pub fn router(handle: ScannerHandle) -> Router {
    Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/scans", get(get_scans))
        .route("/settings", get(get_settings).post(post_settings))
        .route("/mute", get(get_mute).post(post_mute))
        .route("/alert/test", post(post_test_alert))
        .route("/suggestions", get(get_suggestions))
        .route("/indices", get(get_indices))
        .route("/refresh", get(get_refresh))
        .route("/health", get(get_health))
        .with_state(handle)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize)]
pub struct MuteBody {
    #[serde(alias = "mute_status")]
    pub mute: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_snapshot(State(h): State<ScannerHandle>) -> Json<ResultSnapshot> {
    Json(h.get_snapshot().as_ref().clone())
}

async fn get_scans(State(h): State<ScannerHandle>) -> Json<Vec<ScanDefinition>> {
    Json(h.list_scans().to_vec())
}

async fn get_settings(State(h): State<ScannerHandle>) -> Json<Settings> {
    Json(h.get_settings().as_ref().clone())
}

async fn post_settings(
    State(h): State<ScannerHandle>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, AppError> {
    let saved = h.set_settings(update).await?;
    Ok(Json(saved.as_ref().clone()))
}

async fn get_mute(State(h): State<ScannerHandle>) -> Json<MuteBody> {
    Json(MuteBody { mute: h.get_mute() })
}

async fn post_mute(
    State(h): State<ScannerHandle>,
    Json(body): Json<MuteBody>,
) -> Result<Json<MuteBody>, AppError> {
    let saved = h.set_mute(body.mute).await?;
    Ok(Json(MuteBody { mute: saved.mute }))
}

async fn post_test_alert(State(h): State<ScannerHandle>) -> Json<serde_json::Value> {
    let status = if h.trigger_test_alert() { "ok" } else { "muted" };
    Json(serde_json::json!({ "status": status }))
}

async fn get_suggestions(State(h): State<ScannerHandle>) -> Json<Suggestions> {
    Json(h.suggestions())
}

async fn get_indices(State(h): State<ScannerHandle>) -> Result<Json<Vec<IndexQuote>>, AppError> {
    Ok(Json(h.indices().await?))
}

async fn get_refresh(State(h): State<ScannerHandle>) -> Json<RefreshInfo> {
    Json(h.refresh_info())
}

async fn get_health(State(h): State<ScannerHandle>) -> Json<HealthReport> {
    Json(h.health_report())
}
