// src/services/cache.rs
//! Per-ticker market-data cache.
//!
//! A ticker is Fresh when its file was written for the current effective
//! trading day and holds the stock snapshot, the option chain and the
//! requested horizon's bars. Anything else is Stale and gets refetched,
//! merged into the existing payload and written back whole.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::models::{AggregateBar, CachePayload, OptionContract, StockSnapshot};
use crate::services::horizons::{self, Horizon};
use crate::services::normalizer::normalize_chain;
use crate::services::provider::{ProviderClient, ProviderError};
use crate::services::trading_day::TradingDayResolver;

/// Upper-cased, trimmed ticker used for keys and requests.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// One JSON file per ticker under a directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        let safe: String = ticker
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    /// Missing or unreadable files load as an empty payload.
    pub fn load(&self, ticker: &str) -> CachePayload {
        let path = self.path_for(ticker);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache file for {} at {}", ticker, path.display());
                return CachePayload::default();
            }
            Err(e) => {
                warn!("Could not read cache file {}: {}; treating as empty", path.display(), e);
                return CachePayload::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Corrupt cache file {}: {}; treating as empty", path.display(), e);
                CachePayload::default()
            }
        }
    }

    pub fn save(&self, ticker: &str, payload: &CachePayload) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(ticker);
        let text = serde_json::to_string_pretty(payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        debug!("Wrote cache file {}", path.display());
        Ok(())
    }
}

/// Which parts of a payload need fetching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshPlan {
    pub day_changed: bool,
    pub stock: bool,
    pub options: bool,
    pub bucket: bool,
}

impl RefreshPlan {
    pub fn for_payload(payload: &CachePayload, label: &str, bucket_key: &str) -> Self {
        let day_changed = payload.last_updated.as_deref() != Some(label);
        let bucket_date = payload
            .aggregates_updated
            .get(bucket_key)
            .or(payload.last_updated.as_ref());
        RefreshPlan {
            day_changed,
            stock: day_changed || payload.stock.is_none(),
            options: day_changed || payload.options.is_none(),
            bucket: day_changed
                || !payload.aggregates.contains_key(bucket_key)
                || bucket_date.map(String::as_str) != Some(label),
        }
    }

    pub fn is_fresh(&self) -> bool {
        !(self.stock || self.options || self.bucket)
    }
}

pub fn is_fresh(payload: &CachePayload, label: &str, bucket_key: &str) -> bool {
    RefreshPlan::for_payload(payload, label, bucket_key).is_fresh()
}

/// What the caller gets back for one (ticker, horizon) request.
#[derive(Debug, Clone, Serialize)]
pub struct MarketData {
    pub ticker: String,
    pub last_updated: String,
    pub horizon_index: usize,
    pub horizon: Horizon,
    pub stock: StockSnapshot,
    pub options: Vec<OptionContract>,
    pub bars: Vec<AggregateBar>,
    pub from_cache: bool,
}

pub struct MarketDataCache {
    store: CacheStore,
    provider: Box<dyn ProviderClient>,
    resolver: TradingDayResolver,
}

impl MarketDataCache {
    pub fn new(store: CacheStore, provider: Box<dyn ProviderClient>, resolver: TradingDayResolver) -> Self {
        MarketDataCache {
            store,
            provider,
            resolver,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Serve a ticker/horizon from disk when fresh, otherwise refetch what is
    /// missing. Fetch errors leave the file untouched and are returned.
    pub async fn load(
        &self,
        ticker: &str,
        horizon_index: i64,
        now: DateTime<Utc>,
    ) -> Result<MarketData, ProviderError> {
        let ticker = normalize_ticker(ticker);
        let label = self.resolver.effective_label(now);
        let (index, horizon) = horizons::horizon(horizon_index);
        let key = horizons::bucket_key(index);

        let mut payload = self.store.load(&ticker);
        let plan = RefreshPlan::for_payload(&payload, &label, &key);

        if plan.is_fresh() {
            info!("Cache hit for {} ({}, horizon {})", ticker, label, horizon.label);
            return Ok(assemble(ticker, label, index, horizon, payload, true));
        }

        info!(
            "Cache stale for {} (cached day {:?}, effective day {}): refreshing stock={} options={} bars={}",
            ticker, payload.last_updated, label, plan.stock, plan.options, plan.bucket
        );

        // Fetch everything first so a failure can't leave a half-merged payload.
        let stock = if plan.stock {
            let stock = self.provider.fetch_previous_close(&ticker).await?;
            if stock.is_empty() {
                warn!("Previous close for {} came back empty; not caching it", ticker);
            }
            Some(stock)
        } else {
            None
        };
        let options = if plan.options {
            let raw = self.provider.fetch_option_snapshots(&ticker).await?;
            let chain = normalize_chain(&raw);
            if chain.len() != raw.len() {
                debug!("Dropped {} malformed option snapshots for {}", raw.len() - chain.len(), ticker);
            }
            Some(chain)
        } else {
            None
        };
        let bars = if plan.bucket {
            Some(
                self.provider
                    .fetch_aggregates(&ticker, horizon.days_back, horizon.minutes_per_bar, now)
                    .await?,
            )
        } else {
            None
        };

        merge(&mut payload, &label, &key, stock, options, bars);

        if let Err(e) = self.store.save(&ticker, &payload) {
            error!("Failed to write cache for {}: {}", ticker, e);
        }

        Ok(assemble(ticker, label, index, horizon, payload, false))
    }
}

fn merge(
    payload: &mut CachePayload,
    label: &str,
    key: &str,
    stock: Option<StockSnapshot>,
    options: Option<Vec<OptionContract>>,
    bars: Option<Vec<AggregateBar>>,
) {
    if payload.last_updated.as_deref() != Some(label) {
        // Pin untouched buckets to the day they were fetched so they refresh
        // lazily when their horizon is next requested.
        if let Some(previous) = payload.last_updated.clone() {
            for bucket in payload.aggregates.keys() {
                payload
                    .aggregates_updated
                    .entry(bucket.clone())
                    .or_insert_with(|| previous.clone());
            }
        }
        payload.last_updated = Some(label.to_string());
    }
    if let Some(stock) = stock {
        // An all-missing snapshot stays unset so the next request retries it.
        payload.stock = if stock.is_empty() { None } else { Some(stock) };
    }
    if let Some(options) = options {
        payload.options = Some(options);
    }
    if let Some(bars) = bars {
        payload.aggregates.insert(key.to_string(), bars);
        payload.aggregates_updated.insert(key.to_string(), label.to_string());
    }
}

fn assemble(
    ticker: String,
    label: String,
    index: usize,
    horizon: &Horizon,
    payload: CachePayload,
    from_cache: bool,
) -> MarketData {
    let key = horizons::bucket_key(index);
    let CachePayload {
        stock,
        options,
        mut aggregates,
        ..
    } = payload;
    MarketData {
        ticker,
        last_updated: label,
        horizon_index: index,
        horizon: *horizon,
        stock: stock.unwrap_or_default(),
        options: options.unwrap_or_default(),
        bars: aggregates.remove(&key).unwrap_or_default(),
        from_cache,
    }
}
