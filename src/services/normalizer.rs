// src/services/normalizer.rs
//! Turns one raw provider snapshot into a canonical `OptionContract`.
//!
//! Polygon and Alpaca (and older Polygon responses) nest the same concept under
//! different keys. Each field is resolved through an ordered list of paths and
//! the first one present wins. Nothing missing is ever replaced by zero.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::models::{ContractType, Greeks, OptionContract};

const TICKER_PATHS: &[&[&str]] = &[&["ticker"], &["details", "ticker"], &["symbol"]];
const EXPIRATION_PATHS: &[&[&str]] = &[
    &["expiration_date"],
    &["details", "expiration_date"],
    &["expiration"],
];
const TYPE_PATHS: &[&[&str]] = &[
    &["contract_type"],
    &["details", "contract_type"],
    &["type"],
];
const STRIKE_PATHS: &[&[&str]] = &[
    &["strike_price"],
    &["details", "strike_price"],
    &["strike"],
];
const IV_PATHS: &[&[&str]] = &[
    &["implied_volatility"],
    &["implied_vol"],
    &["impliedVolatility"],
];
const VOLUME_PATHS: &[&[&str]] = &[
    &["volume"],
    &["day", "volume"],
    &["day", "v"],
    &["dailyBar", "v"],
];
const OPEN_INTEREST_PATHS: &[&[&str]] = &[
    &["open_interest"],
    &["openInterest"],
    &["details", "open_interest"],
];
const DAY_CLOSE_PATHS: &[&[&str]] = &[
    &["day_close"],
    &["day", "close"],
    &["day", "c"],
    &["dailyBar", "c"],
    &["prevDailyBar", "c"],
];
const BID_PATHS: &[&[&str]] = &[
    &["bid"],
    &["last_quote", "bid"],
    &["last_quote", "b"],
    &["latestQuote", "bp"],
    &["quote", "bid"],
];
const ASK_PATHS: &[&[&str]] = &[
    &["ask"],
    &["last_quote", "ask"],
    &["last_quote", "a"],
    &["latestQuote", "ap"],
    &["quote", "ask"],
];
const LAST_PATHS: &[&[&str]] = &[
    &["last"],
    &["last_trade", "price"],
    &["last_trade", "p"],
    &["latestTrade", "p"],
    &["day", "last"],
];

/// Normalize one raw record. Returns `None` when the record is not a JSON object.
pub fn normalize_contract(raw: &Value) -> Option<OptionContract> {
    let obj = raw.as_object()?;

    let ticker = first_string(obj, TICKER_PATHS);
    let occ = ticker.as_deref().and_then(parse_occ_symbol);

    let expiration_date = first_string(obj, EXPIRATION_PATHS)
        .or_else(|| occ.as_ref().map(|o| o.expiration.clone()));
    let contract_type = first_string(obj, TYPE_PATHS)
        .and_then(|raw| ContractType::from_label(&raw))
        .or_else(|| occ.as_ref().map(|o| o.contract_type));
    let strike_price = first_number(obj, STRIKE_PATHS).or_else(|| occ.as_ref().map(|o| o.strike));

    let top_level_iv = first_number(obj, IV_PATHS);
    let greeks = match obj.get("greeks").and_then(Value::as_object) {
        Some(g) => Greeks {
            delta: number_at(g, &["delta"]),
            gamma: number_at(g, &["gamma"]),
            theta: number_at(g, &["theta"]),
            vega: number_at(g, &["vega"]),
            rho: number_at(g, &["rho"]),
            iv: number_at(g, &["iv"]).or(top_level_iv),
        },
        None => Greeks {
            iv: top_level_iv,
            ..Greeks::default()
        },
    };

    Some(OptionContract {
        ticker,
        expiration_date,
        contract_type,
        strike_price,
        implied_volatility: top_level_iv.or(greeks.iv),
        volume: first_number(obj, VOLUME_PATHS),
        open_interest: first_number(obj, OPEN_INTEREST_PATHS),
        day_close: first_number(obj, DAY_CLOSE_PATHS),
        bid: first_number(obj, BID_PATHS),
        ask: first_number(obj, ASK_PATHS),
        last: first_number(obj, LAST_PATHS),
        greeks,
    })
}

/// Normalize a page of raw records, dropping anything that isn't an object.
pub fn normalize_chain(raw: &[Value]) -> Vec<OptionContract> {
    raw.iter().filter_map(normalize_contract).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct OccSymbol {
    pub underlying: String,
    pub expiration: String,
    pub contract_type: ContractType,
    pub strike: f64,
}

/// Parse `O:SPY240119C00100000` (or the same without the `O:` prefix).
pub fn parse_occ_symbol(symbol: &str) -> Option<OccSymbol> {
    let sym = symbol.trim();
    let sym = sym.strip_prefix("O:").unwrap_or(sym);
    // <UNDERLYING><YYMMDD><C|P><STRIKE x1000, 8 digits>
    if sym.len() < 16 || !sym.is_ascii() {
        return None;
    }
    let len = sym.len();
    let date_start = len - 15;
    let underlying = sym[..date_start].trim_end().to_string();
    if underlying.is_empty() {
        return None;
    }

    let yy: i32 = sym[date_start..date_start + 2].parse().ok()?;
    let mm: u32 = sym[date_start + 2..date_start + 4].parse().ok()?;
    let dd: u32 = sym[date_start + 4..date_start + 6].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(2000 + yy, mm, dd)?;

    let contract_type = ContractType::from_label(&sym[len - 9..len - 8])?;
    let strike_thousandths: u64 = sym[len - 8..].parse().ok()?;

    Some(OccSymbol {
        underlying,
        expiration: date.format("%Y-%m-%d").to_string(),
        contract_type,
        strike: strike_thousandths as f64 / 1000.0,
    })
}

fn lookup<'a>(obj: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = obj.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn number_at(obj: &Map<String, Value>, path: &[&str]) -> Option<f64> {
    let value = match lookup(obj, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

fn string_at(obj: &Map<String, Value>, path: &[&str]) -> Option<String> {
    match lookup(obj, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn first_number(obj: &Map<String, Value>, paths: &[&[&str]]) -> Option<f64> {
    paths.iter().find_map(|p| number_at(obj, p))
}

fn first_string(obj: &Map<String, Value>, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|p| string_at(obj, p))
}
