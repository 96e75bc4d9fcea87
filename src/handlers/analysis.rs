// src/handlers/analysis.rs
use chrono::Utc;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use warp::reply::{Json, Reply};
use warp::Rejection;

use super::error::ApiError;
use super::{validate_ticker, SharedCache};
use crate::models::{StockSnapshot, Strategy};
use crate::services::analysis::{build_records, AnalysisRecord};
use crate::services::cache::MarketData;
use crate::services::export::records_to_csv;
use crate::services::filters::{
    apply_filters, parse_max_loss, parse_min_likelihood, resolve_selected, FilterOutcome,
    FilterSelection, NumericConstraints, ALL,
};

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisQuery {
    pub strategy: Option<String>,
    pub horizon: Option<i64>,
    pub expiration: Option<String>,
    pub strike: Option<String>,
    pub contract_type: Option<String>,
    pub max_loss: Option<String>,
    pub min_likelihood: Option<String>,
    pub selected: Option<String>,
}

impl AnalysisQuery {
    pub fn strategy(&self) -> Result<Strategy, ApiError> {
        match self.strategy.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(Strategy::StockAnalysis),
            Some(raw) => Strategy::from_label(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown strategy '{}'", raw))),
        }
    }

    pub fn selection(&self) -> FilterSelection {
        FilterSelection::from_labels(
            self.expiration.as_deref(),
            self.strike.as_deref(),
            self.contract_type.as_deref(),
        )
    }

    pub fn constraints(&self) -> NumericConstraints {
        NumericConstraints {
            max_loss: self.max_loss.as_deref().and_then(parse_max_loss),
            min_likelihood: self.min_likelihood.as_deref().and_then(parse_min_likelihood),
        }
    }
}

#[derive(Serialize)]
struct Dropdowns<'a> {
    expirations: &'a [String],
    strikes: &'a [String],
    contract_types: &'a [String],
}

#[derive(Serialize)]
struct Selected<'a> {
    expiration: &'a str,
    strike: &'a str,
    contract_type: &'a str,
}

#[derive(Serialize)]
struct AnalysisResponse<'a> {
    ticker: &'a str,
    strategy: &'static str,
    last_updated: &'a str,
    from_cache: bool,
    stock: &'a StockSnapshot,
    options: Dropdowns<'a>,
    selection: Selected<'a>,
    constraints: NumericConstraints,
    result_count: usize,
    selected: Option<String>,
    results: &'a [&'a AnalysisRecord],
}

async fn load_records(
    ticker: &str,
    query: &AnalysisQuery,
    cache: &SharedCache,
) -> Result<(Strategy, MarketData, Vec<AnalysisRecord>), Rejection> {
    let ticker = validate_ticker(ticker).map_err(warp::reject::custom)?;
    let strategy = query.strategy().map_err(warp::reject::custom)?;
    info!("Handling {} analysis for {}", strategy, ticker);

    let data = {
        let cache = cache.lock().await;
        cache.load(&ticker, query.horizon.unwrap_or(0), Utc::now()).await
    }
    .map_err(|e| {
        error!("Failed to load market data for {}: {}", ticker, e);
        warp::reject::custom(ApiError::provider(&e))
    })?;

    let records = build_records(&data.options, strategy);
    debug!("{} produced {} records from {} contracts", strategy, records.len(), data.options.len());
    Ok((strategy, data, records))
}

fn filter<'a>(records: &'a [AnalysisRecord], query: &AnalysisQuery) -> FilterOutcome<'a, AnalysisRecord> {
    let outcome = apply_filters(records, &query.selection(), &query.constraints());
    debug!(
        "Filters left {} of {} records ({} expirations, {} strikes)",
        outcome.results.len(),
        records.len(),
        outcome.expirations.len(),
        outcome.strikes.len()
    );
    outcome
}

pub async fn get_analysis(ticker: String, query: AnalysisQuery, cache: SharedCache) -> Result<Json, Rejection> {
    let (strategy, data, records) = load_records(&ticker, &query, &cache).await?;
    let outcome = filter(&records, &query);
    let selected = resolve_selected(&outcome.results, query.selected.as_deref());
    let constraints = query.constraints();

    Ok(warp::reply::json(&AnalysisResponse {
        ticker: &data.ticker,
        strategy: strategy.label(),
        last_updated: &data.last_updated,
        from_cache: data.from_cache,
        stock: &data.stock,
        options: Dropdowns {
            expirations: &outcome.expirations,
            strikes: &outcome.strikes,
            contract_types: &outcome.contract_types,
        },
        selection: Selected {
            expiration: outcome.selection.expiration.as_deref().unwrap_or(ALL),
            strike: outcome.selection.strike.as_deref().unwrap_or(ALL),
            contract_type: outcome.selection.contract_type.as_deref().unwrap_or(ALL),
        },
        constraints,
        result_count: outcome.results.len(),
        selected,
        results: &outcome.results,
    }))
}

pub async fn export_analysis(
    ticker: String,
    query: AnalysisQuery,
    cache: SharedCache,
) -> Result<impl Reply, Rejection> {
    let (strategy, data, records) = load_records(&ticker, &query, &cache).await?;
    let outcome = filter(&records, &query);
    let body = records_to_csv(&outcome.results).map_err(|e| {
        error!("Failed to render CSV for {}: {}", data.ticker, e);
        warp::reject::custom(ApiError::internal(e.to_string()))
    })?;

    let filename = format!(
        "{}_{}_{}.csv",
        data.ticker,
        strategy.label().to_ascii_lowercase().replace(' ', "_"),
        data.last_updated
    );
    Ok(warp::reply::with_header(
        warp::reply::with_header(body, "content-type", "text/csv; charset=utf-8"),
        "content-disposition",
        format!("attachment; filename=\"{}\"", filename),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &str) -> AnalysisQuery {
        serde_json::from_str(pairs).unwrap()
    }

    #[test]
    fn strategy_defaults_to_stock_analysis() {
        assert_eq!(AnalysisQuery::default().strategy().unwrap(), Strategy::StockAnalysis);
        let q = query(r#"{"strategy": "vertical spread"}"#);
        assert_eq!(q.strategy().unwrap(), Strategy::VerticalSpread);
        assert!(query(r#"{"strategy": "Butterfly"}"#).strategy().is_err());
    }

    #[test]
    fn query_text_is_normalized() {
        let q = query(r#"{"strike": "105.00", "contract_type": "put", "expiration": "All", "min_likelihood": "50", "max_loss": ""}"#);
        let selection = q.selection();
        assert_eq!(selection.strike.as_deref(), Some("105"));
        assert_eq!(selection.contract_type.as_deref(), Some("PUT"));
        assert_eq!(selection.expiration, None);

        let constraints = q.constraints();
        assert_eq!(constraints.min_likelihood, Some(0.5));
        assert_eq!(constraints.max_loss, None);
    }
}
