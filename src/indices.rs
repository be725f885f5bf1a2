use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::types::value_as_f64;

const ALL_INDICES_PATH: &str = "/api/allIndices";

/// The exchange serves its API only to browser-looking clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Indices reported, in display order.
pub const TRACKED_INDICES: &[&str] = &[
    "NIFTY 50",
    "NIFTY 100",
    "NIFTY 200",
    "NIFTY 500",
    "NIFTY ALPHA 50",
    "NIFTY BANK",
    "NIFTY ENERGY",
    "NIFTY FMCG",
    "NIFTY HIGH BETA 50",
    "NIFTY HOUSING",
    "NIFTY METAL",
    "NIFTY PRIVATE BANK",
    "NIFTY PSE",
    "NIFTY PSU BANK",
    "NIFTY REALTY",
    "NIFTY OIL & GAS",
    "NIFTY PHARMA",
];

/// Day move of one market index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexQuote {
    /// Display name, e.g. "Nifty BANK".
    pub name: String,
    pub last: f64,
    pub open: f64,
    /// `last - open`
    pub change: f64,
    /// `change / open * 100`, 0 when `open` is 0.
    pub percent_change: f64,
}

/// HTTP client for the exchange's all-indices feed.
///
/// Each fetch first loads the home page so the session carries the cookies
/// the API checks for.
pub struct IndexFeed {
    client: reqwest::Client,
    base_url: String,
}

impl IndexFeed {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let referer = HeaderValue::from_str(&format!("{base_url}/"))
            .map_err(|_| AppError::Config(format!("invalid indices base URL '{base_url}'")))?;
        headers.insert(REFERER, referer);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(AppError::Http)?;
        Ok(Self { client, base_url })
    }

    pub async fn fetch(&self) -> Result<Vec<IndexQuote>> {
        if let Err(e) = self.client.get(&self.base_url).send().await {
            warn!("Index feed cookie request failed: {e}");
        }

        let body: serde_json::Value = self
            .client
            .get(format!("{}{ALL_INDICES_PATH}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let quotes = parse_indices(&body);
        debug!(count = quotes.len(), "Index quotes fetched");
        Ok(quotes)
    }
}

/// Pick the tracked indices out of an all-indices payload, in tracked order.
///
/// Entries without a numeric `last` or `open` are skipped.
pub fn parse_indices(body: &serde_json::Value) -> Vec<IndexQuote> {
    let Some(entries) = body.get("data").and_then(|d| d.as_array()) else {
        warn!("Index feed response has no data array");
        return Vec::new();
    };

    TRACKED_INDICES
        .iter()
        .filter_map(|tracked| {
            let entry = entries.iter().find(|e| {
                e.get("index")
                    .and_then(|v| v.as_str())
                    .is_some_and(|name| name.trim().to_uppercase() == *tracked)
            })?;
            let last = entry.get("last").and_then(value_as_f64)?;
            let open = entry.get("open").and_then(value_as_f64)?;
            let change = last - open;
            let percent_change = if open == 0.0 { 0.0 } else { change / open * 100.0 };
            Some(IndexQuote {
                name: display_name(tracked),
                last,
                open,
                change,
                percent_change,
            })
        })
        .collect()
}

fn display_name(index: &str) -> String {
    format!("Nifty {}", index.replacen("NIFTY ", "", 1))
}
