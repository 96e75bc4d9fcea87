// src/services/filters.rs
//! Cascading filter over contracts or spreads.
//!
//! `apply_filters` is a pure function of the full record set and the current
//! selections. Each dropdown is computed from the eligible records filtered by
//! the *other* two dropdowns, so no offered value can lead to an empty result.

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

/// Label for an unconstrained dropdown.
pub const ALL: &str = "All";

/// Canonical strike text used both for display and for filter-key equality.
/// `100`, `100.0` and `100.00` all render as `100`; `102.50` renders as `102.5`.
pub fn format_strike(value: f64) -> String {
    if !value.is_finite() || value.fract() == 0.0 {
        return format!("{:.0}", value);
    }
    let fixed = format!("{:.2}", value);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Accepts `0.5`, `50` or `50%`. Anything above 1 is read as a percentage.
pub fn parse_min_likelihood(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: f64 = trimmed.parse().ok().filter(|v: &f64| v.is_finite())?;
    let fraction = if value > 1.0 { value / 100.0 } else { value };
    Some(fraction.clamp(0.0, 1.0))
}

pub fn parse_max_loss(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_start_matches('$').trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok().filter(|v: &f64| v.is_finite())
}

/// What the filter engine needs to know about a row.
pub trait FilterRecord {
    fn expiration_key(&self) -> Option<String>;
    fn strike_key(&self) -> Option<String>;
    fn contract_type_key(&self) -> Option<String>;
    /// Premium (spreads) or mid-price (single legs).
    fn premium(&self) -> Option<f64>;
    fn likelihood(&self) -> Option<f64>;
    fn ticker_key(&self) -> Option<String>;

    /// Identity that survives a filter change: ticker, expiration, type, strike.
    fn record_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.ticker_key().unwrap_or_default(),
            self.expiration_key().unwrap_or_default(),
            self.contract_type_key().unwrap_or_default(),
            self.strike_key().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Expiration,
    Strike,
    ContractType,
}

impl Dimension {
    // Order in which conflicting selections are dropped: the most specific first.
    const RESET_ORDER: [Dimension; 3] = [Dimension::Strike, Dimension::ContractType, Dimension::Expiration];

    fn key_of<R: FilterRecord>(&self, record: &R) -> Option<String> {
        match self {
            Dimension::Expiration => record.expiration_key(),
            Dimension::Strike => record.strike_key(),
            Dimension::ContractType => record.contract_type_key(),
        }
    }
}

/// `None` in a slot means "All".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub expiration: Option<String>,
    pub strike: Option<String>,
    pub contract_type: Option<String>,
}

impl FilterSelection {
    /// Builds a selection from raw dropdown text; empty or `All` means unconstrained.
    pub fn from_labels(expiration: Option<&str>, strike: Option<&str>, contract_type: Option<&str>) -> Self {
        FilterSelection {
            expiration: selected(expiration),
            strike: selected(strike).map(canonical_strike_label),
            contract_type: selected(contract_type).map(|t| t.to_ascii_uppercase()),
        }
    }

    pub fn get(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Expiration => self.expiration.as_deref(),
            Dimension::Strike => self.strike.as_deref(),
            Dimension::ContractType => self.contract_type.as_deref(),
        }
    }

    fn clear(&mut self, dim: Dimension) {
        match dim {
            Dimension::Expiration => self.expiration = None,
            Dimension::Strike => self.strike = None,
            Dimension::ContractType => self.contract_type = None,
        }
    }

    fn matches<R: FilterRecord>(&self, record: &R, ignore: Option<Dimension>) -> bool {
        [Dimension::Expiration, Dimension::Strike, Dimension::ContractType]
            .into_iter()
            .filter(|dim| Some(*dim) != ignore)
            .all(|dim| match self.get(dim) {
                None => true,
                Some(wanted) => dim.key_of(record).as_deref() == Some(wanted),
            })
    }
}

/// Runs each side of `100.0` or `100.0/105.00` through `format_strike`.
/// Text that isn't numeric on every side is kept as typed.
fn canonical_strike_label(raw: String) -> String {
    let sides: Option<Vec<String>> = raw
        .split('/')
        .map(|side| side.trim().parse::<f64>().ok().map(format_strike))
        .collect();
    match sides {
        Some(sides) => sides.join("/"),
        None => raw,
    }
}

fn selected(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(ALL) {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericConstraints {
    pub max_loss: Option<f64>,
    pub min_likelihood: Option<f64>,
}

impl NumericConstraints {
    /// Fails closed: an active constraint excludes rows lacking the field.
    pub fn admits<R: FilterRecord>(&self, record: &R) -> bool {
        let loss_ok = match self.max_loss {
            None => true,
            Some(max) => record.premium().map_or(false, |p| p <= max),
        };
        let likelihood_ok = match self.min_likelihood {
            None => true,
            Some(min) => record.likelihood().map_or(false, |l| l >= min),
        };
        loss_ok && likelihood_ok
    }
}

#[derive(Debug)]
pub struct FilterOutcome<'a, R> {
    pub expirations: Vec<String>,
    pub strikes: Vec<String>,
    pub contract_types: Vec<String>,
    /// Selections after any reset to "All".
    pub selection: FilterSelection,
    pub results: Vec<&'a R>,
}

pub fn apply_filters<'a, R: FilterRecord>(
    records: &'a [R],
    selection: &FilterSelection,
    constraints: &NumericConstraints,
) -> FilterOutcome<'a, R> {
    let eligible: Vec<&R> = records.iter().filter(|r| constraints.admits(*r)).collect();

    let mut effective = selection.clone();
    let (expirations, strikes, contract_types) = loop {
        let expirations = available(&eligible, &effective, Dimension::Expiration);
        let strikes = available(&eligible, &effective, Dimension::Strike);
        let contract_types = available(&eligible, &effective, Dimension::ContractType);

        let invalid = Dimension::RESET_ORDER.into_iter().find(|dim| {
            let values = match dim {
                Dimension::Expiration => &expirations,
                Dimension::Strike => &strikes,
                Dimension::ContractType => &contract_types,
            };
            effective
                .get(*dim)
                .map_or(false, |current| !values.iter().any(|v| v == current))
        });

        // Dropping one selection widens the others, so recompute before judging them.
        match invalid {
            Some(dim) => {
                debug!("Selection {:?}={:?} no longer available, resetting to {}", dim, effective.get(dim), ALL);
                effective.clear(dim);
            }
            None => break (expirations, strikes, contract_types),
        }
    };

    let results: Vec<&R> = eligible
        .into_iter()
        .filter(|r| effective.matches(*r, None))
        .collect();

    FilterOutcome {
        expirations,
        strikes,
        contract_types,
        selection: effective,
        results,
    }
}

fn available<R: FilterRecord>(eligible: &[&R], selection: &FilterSelection, dim: Dimension) -> Vec<String> {
    let values: BTreeSet<String> = eligible
        .iter()
        .filter(|r| selection.matches(**r, Some(dim)))
        .filter_map(|r| dim.key_of(*r))
        .collect();
    let mut values: Vec<String> = values.into_iter().collect();
    if dim == Dimension::Strike {
        values.sort_by(|a, b| strike_sort_value(a).total_cmp(&strike_sort_value(b)).then_with(|| a.cmp(b)));
    }
    values
}

// "100/105" sorts by its lower strike.
fn strike_sort_value(label: &str) -> f64 {
    label
        .split('/')
        .next()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(f64::MAX)
}

/// Keep the previous pick if it survived the filter change, otherwise fall back to the first row.
pub fn resolve_selected<R: FilterRecord>(results: &[&R], previous: Option<&str>) -> Option<String> {
    if let Some(prev) = previous {
        if results.iter().any(|r| r.record_key() == prev) {
            return Some(prev.to_string());
        }
    }
    results.first().map(|r| r.record_key())
}
