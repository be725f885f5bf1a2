use axum::{http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scan catalog error: {0}")]
    Catalog(String),

    #[error("Settings persistence error: {0}")]
    Settings(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::InvalidSettings(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Per-scan errors
// ---------------------------------------------------------------------------

/// Failure classes a single scan can end in. Never aborts sibling scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorKind {
    /// Token missing or rejected even after one refresh.
    AuthFailure,
    /// Network error, timeout, or non-success HTTP status.
    TransportFailure,
    /// The screener rejected the query itself.
    RemoteScanError,
    /// Response had no row-set field or was not a JSON object.
    MalformedResponse,
}

impl std::fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanErrorKind::AuthFailure => "auth_failure",
            ScanErrorKind::TransportFailure => "transport_failure",
            ScanErrorKind::RemoteScanError => "remote_scan_error",
            ScanErrorKind::MalformedResponse => "malformed_response",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct ScanError {
    pub kind: ScanErrorKind,
    pub message: String,
}

impl ScanError {
    pub fn new(kind: ScanErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::AuthFailure, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::TransportFailure, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::RemoteScanError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::MalformedResponse, message)
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ScanErrorKind::AuthFailure
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(s) if s == reqwest::StatusCode::UNAUTHORIZED
                || s == reqwest::StatusCode::FORBIDDEN
                || s.as_u16() == 419 =>
            {
                ScanError::auth(e.to_string())
            }
            _ => ScanError::transport(e.to_string()),
        }
    }
}
