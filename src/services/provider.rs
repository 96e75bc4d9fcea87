// src/services/provider.rs
//! The data-provider boundary. The engine only sees `ProviderClient`; which
//! vendor sits behind it is decided once, from configuration.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;
use reqwest::{RequestBuilder, Url};
use scraper::Html;
use serde_json::Value;

use crate::models::{AggregateBar, StockSnapshot};

#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_previous_close(&self, ticker: &str) -> Result<StockSnapshot, ProviderError>;

    /// Raw snapshot objects, every page accumulated.
    async fn fetch_option_snapshots(&self, ticker: &str) -> Result<Vec<Value>, ProviderError>;

    /// Bars covering the `days_back` days that end at `end`.
    async fn fetch_aggregates(
        &self,
        ticker: &str,
        days_back: u32,
        minutes_per_bar: u32,
        end: DateTime<Utc>,
    ) -> Result<Vec<AggregateBar>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The request never got an HTTP answer (DNS, refused, timeout).
    Transport { url: String, message: String },
    /// The provider answered with a non-2xx status.
    Remote {
        status: u16,
        reason: String,
        message: Option<String>,
    },
    /// A 2xx answer we could not read.
    Decode { url: String, message: String },
    InvalidUrl(String),
}

impl ProviderError {
    pub fn transport(url: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        ProviderError::Transport {
            url: url.to_string(),
            message,
        }
    }

    pub fn remote(status: u16, reason: Option<&str>, body: &str) -> Self {
        ProviderError::Remote {
            status,
            reason: reason.unwrap_or("Unknown Status").to_string(),
            message: extract_error_message(body),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Transport { .. })
    }

    pub fn hint(&self) -> &'static str {
        match self {
            ProviderError::Transport { .. } => "Check your network connectivity and try again.",
            ProviderError::Remote { status: 401 | 403, .. } => {
                "Check your API credentials and plan entitlements."
            }
            ProviderError::Remote { status: 429, .. } => "Rate limited by the data provider; wait and retry.",
            ProviderError::Remote { .. } => "Check your API credentials, entitlements and the ticker symbol.",
            ProviderError::Decode { .. } | ProviderError::InvalidUrl(_) => {
                "The data provider returned an unexpected response."
            }
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderError::Transport { url, message } => {
                write!(f, "could not reach {}: {}", url, message)
            }
            ProviderError::Remote {
                status,
                reason,
                message: Some(message),
            } => write!(f, "provider returned {} {}: {}", status, reason, message),
            ProviderError::Remote { status, reason, .. } => {
                write!(f, "provider returned {} {}", status, reason)
            }
            ProviderError::Decode { url, message } => {
                write!(f, "unreadable response from {}: {}", url, message)
            }
            ProviderError::InvalidUrl(message) => write!(f, "invalid provider url: {}", message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Scheme, host and path only; keeps credentials in query strings out of logs.
pub(crate) fn redact(url: &Url) -> String {
    format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), url.path())
}

/// Send one request and read a JSON body, classifying every failure.
pub(crate) async fn send_json(request: RequestBuilder, url: &Url) -> Result<Value, ProviderError> {
    let shown = redact(url);
    debug!("GET {}", shown);
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::transport(&shown, &e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::transport(&shown, &e))?;

    if !status.is_success() {
        return Err(ProviderError::remote(status.as_u16(), status.canonical_reason(), &body));
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
        url: shown,
        message: e.to_string(),
    })
}

const MAX_ERROR_LEN: usize = 300;

/// Pull a human-readable message out of an error body: a JSON `message` /
/// `error` / `detail` field when there is one, otherwise the body as text with
/// any HTML markup removed.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        for key in ["message", "error", "detail"] {
            match json.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => return Some(truncate(s.trim())),
                Some(Value::Object(inner)) => {
                    if let Some(Value::String(s)) = inner.get("message") {
                        return Some(truncate(s.trim()));
                    }
                }
                _ => {}
            }
        }
    }

    let text = if trimmed.starts_with('<') || trimmed.contains("</") {
        html_to_text(trimmed)
    } else {
        collapse_whitespace(trimmed)
    };
    if text.is_empty() {
        None
    } else {
        Some(truncate(&text))
    }
}

fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text: Vec<&str> = document.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    match Regex::new(r"\s+") {
        Ok(re) => re.replace_all(text, " ").trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_ERROR_LEN).collect();
        format!("{}...", cut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarUnit {
    Minute,
    Hour,
    Day,
    Week,
}

/// Express a bar width in the largest unit that divides it exactly.
pub fn bar_timespan(minutes_per_bar: u32) -> (u32, BarUnit) {
    let minutes = minutes_per_bar.max(1);
    if minutes % 10_080 == 0 {
        (minutes / 10_080, BarUnit::Week)
    } else if minutes % 1_440 == 0 {
        (minutes / 1_440, BarUnit::Day)
    } else if minutes % 60 == 0 {
        (minutes / 60, BarUnit::Hour)
    } else {
        (minutes, BarUnit::Minute)
    }
}

/// A bar needs a close (`c`) and a time (`t`, epoch ms or RFC 3339).
pub(crate) fn bar_from_value(raw: &Value) -> Option<AggregateBar> {
    let price = raw.get("c")?.as_f64()?;
    let timestamp = match raw.get("t")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.timestamp_millis(),
        _ => return None,
    };
    Some(AggregateBar { price, timestamp })
}

pub(crate) fn snapshot_from_bar(bar: &Value) -> StockSnapshot {
    let field = |key: &str| bar.get(key).and_then(Value::as_f64);
    StockSnapshot {
        close: field("c"),
        open: field("o"),
        high: field("h"),
        low: field("l"),
        volume: field("v"),
    }
}
