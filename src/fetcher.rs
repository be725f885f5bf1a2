use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::error::{AppError, Result, ScanError};

/// Anti-forgery token issued by the screener for the current cookie session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(pub String);

/// Unscored rows exactly as the screener returned them.
pub type RawRows = Vec<serde_json::Value>;

/// Transport seam to the remote screener. One request per call, no retries.
pub trait ScreenerService: Send + Sync + 'static {
    /// GET the screener page and pull the anti-forgery token out of it.
    fn fetch_token(&self) -> impl Future<Output = std::result::Result<Token, ScanError>> + Send;

    /// POST one query with `token` and return the decoded response body.
    fn post_scan(
        &self,
        query: &str,
        token: &Token,
    ) -> impl Future<Output = std::result::Result<serde_json::Value, ScanError>> + Send;
}

// ---------------------------------------------------------------------------
// QuerySession
// ---------------------------------------------------------------------------

/// Owns the current token and issues scans through it.
///
/// An auth-class failure re-fetches the token once and retries that single
/// scan. Every other failure is returned to the caller untouched.
pub struct QuerySession<S> {
    service: S,
    token: Mutex<Option<Token>>,
}

impl<S: ScreenerService> QuerySession<S> {
    pub fn new(service: S) -> Self {
        Self { service, token: Mutex::new(None) }
    }

    /// Cached token, fetching one if none is held.
    pub async fn ensure_token(&self) -> std::result::Result<Token, ScanError> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }
        self.refresh_token().await
    }

    /// Drop the cached token so the next `ensure_token` fetches a fresh one.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }

    async fn refresh_token(&self) -> std::result::Result<Token, ScanError> {
        let token = self.service.fetch_token().await.map_err(|e| {
            // A transport failure while fetching the token still means we have no token.
            ScanError::auth(e.message)
        })?;
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token.clone());
        }
        debug!("Screener token refreshed");
        Ok(token)
    }

    fn cached(&self) -> Option<Token> {
        self.token.lock().ok().and_then(|g| g.clone())
    }

    /// Run one query and split the response into rows or a scan-local error.
    pub async fn execute(&self, query: &str, token: &Token) -> std::result::Result<RawRows, ScanError> {
        let body = match self.service.post_scan(query, token).await {
            Err(e) if e.is_auth() => {
                warn!("Screener rejected token ({e}); refreshing once");
                // Another scan may already have refreshed it.
                let fresh = match self.cached() {
                    Some(cached) if &cached != token => cached,
                    _ => self.refresh_token().await?,
                };
                self.service.post_scan(query, &fresh).await?
            }
            other => other?,
        };
        interpret_response(body)
    }
}

/// `data` holds the row set; `scan_error` is the screener rejecting the query.
pub fn interpret_response(body: serde_json::Value) -> std::result::Result<RawRows, ScanError> {
    let serde_json::Value::Object(mut obj) = body else {
        return Err(ScanError::malformed("response is not a JSON object"));
    };

    if let Some(err) = obj.get("scan_error").filter(|v| !v.is_null()) {
        let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(ScanError::remote(message));
    }

    match obj.remove("data") {
        Some(serde_json::Value::Array(rows)) => Ok(rows),
        Some(other) => Err(ScanError::malformed(format!(
            "data field is not an array: {}",
            json_kind(&other)
        ))),
        None => Err(ScanError::malformed("response has no data field")),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// ChartinkSession: the HTTP implementation
// ---------------------------------------------------------------------------

/// Cookie-holding HTTP session against the screener's process endpoint.
pub struct ChartinkSession {
    client: reqwest::Client,
    url: String,
}

impl ChartinkSession {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(AppError::Http)?;
        Ok(Self { client, url: url.into() })
    }
}

impl ScreenerService for ChartinkSession {
    async fn fetch_token(&self) -> std::result::Result<Token, ScanError> {
        let html = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        extract_csrf_token(&html)
            .map(Token)
            .ok_or_else(|| ScanError::auth("csrf-token meta tag not found"))
    }

    async fn post_scan(
        &self,
        query: &str,
        token: &Token,
    ) -> std::result::Result<serde_json::Value, ScanError> {
        let text = self
            .client
            .post(&self.url)
            .header("x-csrf-token", &token.0)
            .form(&[("scan_clause", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        serde_json::from_str(&text)
            .map_err(|e| ScanError::malformed(format!("response is not JSON: {e}")))
    }
}

/// Content of `<meta name="csrf-token" content="...">`, if present and non-empty.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="csrf-token"]"#).ok()?;
    Html::parse_document(html)
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
