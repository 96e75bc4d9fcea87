// src/services/export.rs
use anyhow::{anyhow, Context, Result};
use csv::Writer;

use crate::models::Greeks;
use crate::services::analysis::AnalysisRecord;
use crate::services::filters::FilterRecord;

const HEADER: [&str; 13] = [
    "strategy",
    "ticker",
    "expiration",
    "contract_type",
    "strike",
    "premium",
    "likelihood",
    "delta",
    "gamma",
    "theta",
    "vega",
    "rho",
    "iv",
];

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render analysis rows as CSV. Missing values are left blank, not zero.
pub fn records_to_csv(records: &[&AnalysisRecord]) -> Result<String> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record(HEADER)?;

    for record in records {
        let (strategy, greeks): (&str, &Greeks) = match record {
            AnalysisRecord::Single(leg) => (leg.strategy.as_str(), &leg.contract.greeks),
            AnalysisRecord::Spread(spread) => (spread.strategy.as_str(), &spread.combined_greeks),
        };
        wtr.write_record([
            strategy.to_string(),
            record.ticker_key().unwrap_or_default(),
            record.expiration_key().unwrap_or_default(),
            record.contract_type_key().unwrap_or_default(),
            record.strike_key().unwrap_or_default(),
            cell(record.premium()),
            cell(FilterRecord::likelihood(*record)),
            cell(greeks.delta),
            cell(greeks.gamma),
            cell(greeks.theta),
            cell(greeks.vega),
            cell(greeks.rho),
            cell(greeks.iv),
        ])?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow!("flushing csv writer: {}", e.error()))?;
    String::from_utf8(bytes).context("csv output was not utf-8")
}
