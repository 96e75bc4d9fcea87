// src/models.rs
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    Call,
    Put,
}

impl ContractType {
    /// Case-insensitive; accepts the one-letter OCC forms too.
    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Some(ContractType::Call),
            "PUT" | "P" => Some(ContractType::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Call => "CALL",
            ContractType::Put => "PUT",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Greeks as reported by the provider. Nothing here is computed locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
    pub iv: Option<f64>,
}

/// Canonical option contract. `None` always means "the provider did not say",
/// never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionContract {
    pub ticker: Option<String>,
    pub expiration_date: Option<String>,
    pub contract_type: Option<ContractType>,
    pub strike_price: Option<f64>,
    pub implied_volatility: Option<f64>,
    pub volume: Option<f64>,
    pub open_interest: Option<f64>,
    pub day_close: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub greeks: Greeks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadCandidate {
    pub strategy: String,
    pub ticker: Option<String>,
    pub contract_type: Option<ContractType>,
    pub long_leg: OptionContract,
    pub short_leg: OptionContract,
    pub strike_pair_label: String,
    pub expiration_label: String,
    pub net_premium: Option<f64>,
    pub likelihood: Option<f64>,
    pub combined_greeks: Greeks,
}

/// Previous-session summary for the underlying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockSnapshot {
    pub close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

impl StockSnapshot {
    pub fn is_empty(&self) -> bool {
        self.close.is_none()
            && self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.volume.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBar {
    pub price: f64,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Everything persisted for one ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePayload {
    pub last_updated: Option<String>,
    pub stock: Option<StockSnapshot>,
    pub options: Option<Vec<OptionContract>>,
    pub aggregates: BTreeMap<String, Vec<AggregateBar>>,
    /// Trading-day label each aggregate bucket was fetched on. Buckets without
    /// an entry are dated by `last_updated`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregates_updated: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    #[serde(rename = "Stock Analysis")]
    StockAnalysis,
    #[serde(rename = "Naked Call")]
    NakedCall,
    #[serde(rename = "Naked Put")]
    NakedPut,
    #[serde(rename = "Vertical Spread")]
    VerticalSpread,
    #[serde(rename = "Calendar Spread")]
    CalendarSpread,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::StockAnalysis,
        Strategy::NakedCall,
        Strategy::NakedPut,
        Strategy::VerticalSpread,
        Strategy::CalendarSpread,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::StockAnalysis => "Stock Analysis",
            Strategy::NakedCall => "Naked Call",
            Strategy::NakedPut => "Naked Put",
            Strategy::VerticalSpread => "Vertical Spread",
            Strategy::CalendarSpread => "Calendar Spread",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Strategy::ALL
            .into_iter()
            .find(|s| s.label().eq_ignore_ascii_case(wanted))
    }

    pub fn is_spread(&self) -> bool {
        matches!(self, Strategy::VerticalSpread | Strategy::CalendarSpread)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_type_labels_are_case_insensitive() {
        assert_eq!(ContractType::from_label("call"), Some(ContractType::Call));
        assert_eq!(ContractType::from_label(" Put "), Some(ContractType::Put));
        assert_eq!(ContractType::from_label("p"), Some(ContractType::Put));
        assert_eq!(ContractType::from_label("straddle"), None);
        assert_eq!(serde_json::to_string(&ContractType::Call).unwrap(), "\"CALL\"");
    }

    #[test]
    fn strategy_round_trips_through_its_label() {
        for strategy in Strategy::ALL {
            assert_eq!(Strategy::from_label(strategy.label()), Some(strategy));
        }
        assert_eq!(Strategy::from_label("calendar spread"), Some(Strategy::CalendarSpread));
        assert_eq!(Strategy::from_label("Iron Condor"), None);
    }

    #[test]
    fn payload_with_missing_fields_deserializes_to_defaults() {
        let payload: CachePayload = serde_json::from_str(r#"{"last_updated":"2024-01-19"}"#).unwrap();
        assert_eq!(payload.last_updated.as_deref(), Some("2024-01-19"));
        assert!(payload.stock.is_none());
        assert!(payload.options.is_none());
        assert!(payload.aggregates.is_empty());
    }
}
