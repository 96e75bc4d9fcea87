// src/handlers/mod.rs
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::services::cache::{normalize_ticker, MarketDataCache};
use error::ApiError;

pub mod analysis;
pub mod error;
pub mod market;

/// The cache is the only shared resource; requests take turns on it.
pub type SharedCache = Arc<Mutex<MarketDataCache>>;

pub(crate) fn validate_ticker(raw: &str) -> Result<String, ApiError> {
    let ticker = normalize_ticker(raw);
    if ticker.is_empty() || ticker.len() > 12 || !ticker.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        return Err(ApiError::bad_request(format!("invalid ticker '{}'", raw)));
    }
    Ok(ticker)
}
