// src/handlers/market.rs
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use super::{validate_ticker, SharedCache};
use crate::models::{AggregateBar, StockSnapshot, Strategy};
use crate::services::horizons::{Horizon, HORIZONS};

#[derive(Debug, Default, Deserialize)]
pub struct MarketQuery {
    pub horizon: Option<i64>,
}

#[derive(Serialize)]
struct MarketResponse<'a> {
    ticker: &'a str,
    last_updated: &'a str,
    from_cache: bool,
    horizon_index: usize,
    horizon: &'a Horizon,
    stock: &'a StockSnapshot,
    option_count: usize,
    bars: &'a [AggregateBar],
}

#[derive(Serialize)]
struct HorizonEntry {
    index: usize,
    #[serde(flatten)]
    horizon: Horizon,
}

pub async fn get_horizons() -> Result<Json, Rejection> {
    let entries: Vec<HorizonEntry> = HORIZONS
        .iter()
        .enumerate()
        .map(|(index, horizon)| HorizonEntry { index, horizon: *horizon })
        .collect();
    Ok(warp::reply::json(&entries))
}

pub async fn get_strategies() -> Result<Json, Rejection> {
    let labels: Vec<&str> = Strategy::ALL.iter().map(|s| s.label()).collect();
    Ok(warp::reply::json(&labels))
}

pub async fn get_market(ticker: String, query: MarketQuery, cache: SharedCache) -> Result<Json, Rejection> {
    let ticker = validate_ticker(&ticker).map_err(warp::reject::custom)?;
    info!("Handling market request for {} (horizon {:?})", ticker, query.horizon);

    let data = {
        let cache = cache.lock().await;
        cache.load(&ticker, query.horizon.unwrap_or(0), Utc::now()).await
    }
    .map_err(|e| {
        error!("Failed to load market data for {}: {}", ticker, e);
        warp::reject::custom(ApiError::provider(&e))
    })?;

    Ok(warp::reply::json(&MarketResponse {
        ticker: &data.ticker,
        last_updated: &data.last_updated,
        from_cache: data.from_cache,
        horizon_index: data.horizon_index,
        horizon: &data.horizon,
        stock: &data.stock,
        option_count: data.options.len(),
        bars: &data.bars,
    }))
}
