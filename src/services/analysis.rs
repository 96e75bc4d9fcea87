// src/services/analysis.rs
use serde::Serialize;

use crate::models::{ContractType, OptionContract, SpreadCandidate, Strategy};
use crate::services::analytics::{likelihood, mid_price};
use crate::services::filters::{format_strike, FilterRecord};
use crate::services::normalizer::parse_occ_symbol;
use crate::services::spreads::build_spreads;

/// A single contract traded on its own, with its derived metrics attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleLeg {
    pub strategy: String,
    pub contract: OptionContract,
    pub strike_label: Option<String>,
    pub mid_price: Option<f64>,
    pub likelihood: Option<f64>,
}

impl SingleLeg {
    pub fn new(strategy: Strategy, contract: OptionContract) -> Self {
        SingleLeg {
            strategy: strategy.label().to_string(),
            strike_label: contract.strike_price.map(format_strike),
            mid_price: mid_price(&contract),
            likelihood: likelihood(&contract),
            contract,
        }
    }
}

/// One row of an analysis result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisRecord {
    Single(SingleLeg),
    Spread(SpreadCandidate),
}

/// Turn a canonical chain into the rows a strategy looks at.
pub fn build_records(chain: &[OptionContract], strategy: Strategy) -> Vec<AnalysisRecord> {
    match strategy {
        Strategy::StockAnalysis => Vec::new(),
        Strategy::NakedCall => single_legs(chain, strategy, ContractType::Call),
        Strategy::NakedPut => single_legs(chain, strategy, ContractType::Put),
        Strategy::VerticalSpread | Strategy::CalendarSpread => build_spreads(chain, strategy)
            .into_iter()
            .map(AnalysisRecord::Spread)
            .collect(),
    }
}

fn single_legs(chain: &[OptionContract], strategy: Strategy, kind: ContractType) -> Vec<AnalysisRecord> {
    let mut legs: Vec<SingleLeg> = chain
        .iter()
        .filter(|c| c.contract_type == Some(kind))
        .map(|c| SingleLeg::new(strategy, c.clone()))
        .collect();
    legs.sort_by(|a, b| {
        a.contract
            .expiration_date
            .cmp(&b.contract.expiration_date)
            .then_with(|| {
                let sa = a.contract.strike_price.unwrap_or(f64::MAX);
                let sb = b.contract.strike_price.unwrap_or(f64::MAX);
                sa.total_cmp(&sb)
            })
    });
    legs.into_iter().map(AnalysisRecord::Single).collect()
}

impl FilterRecord for SingleLeg {
    fn expiration_key(&self) -> Option<String> {
        self.contract.expiration_date.clone()
    }

    fn strike_key(&self) -> Option<String> {
        self.strike_label.clone()
    }

    fn contract_type_key(&self) -> Option<String> {
        self.contract.contract_type.map(|t| t.as_str().to_string())
    }

    fn premium(&self) -> Option<f64> {
        self.mid_price
    }

    fn likelihood(&self) -> Option<f64> {
        self.likelihood
    }

    fn ticker_key(&self) -> Option<String> {
        let ticker = self.contract.ticker.as_deref()?;
        Some(
            parse_occ_symbol(ticker)
                .map(|occ| occ.underlying)
                .unwrap_or_else(|| ticker.to_string()),
        )
    }
}

impl FilterRecord for SpreadCandidate {
    fn expiration_key(&self) -> Option<String> {
        Some(self.expiration_label.clone()).filter(|s| !s.is_empty())
    }

    fn strike_key(&self) -> Option<String> {
        Some(self.strike_pair_label.clone())
    }

    fn contract_type_key(&self) -> Option<String> {
        self.contract_type.map(|t| t.as_str().to_string())
    }

    fn premium(&self) -> Option<f64> {
        self.net_premium
    }

    fn likelihood(&self) -> Option<f64> {
        self.likelihood
    }

    fn ticker_key(&self) -> Option<String> {
        self.ticker.clone()
    }
}

impl FilterRecord for AnalysisRecord {
    fn expiration_key(&self) -> Option<String> {
        match self {
            AnalysisRecord::Single(leg) => leg.expiration_key(),
            AnalysisRecord::Spread(spread) => spread.expiration_key(),
        }
    }

    fn strike_key(&self) -> Option<String> {
        match self {
            AnalysisRecord::Single(leg) => leg.strike_key(),
            AnalysisRecord::Spread(spread) => spread.strike_key(),
        }
    }

    fn contract_type_key(&self) -> Option<String> {
        match self {
            AnalysisRecord::Single(leg) => leg.contract_type_key(),
            AnalysisRecord::Spread(spread) => spread.contract_type_key(),
        }
    }

    fn premium(&self) -> Option<f64> {
        match self {
            AnalysisRecord::Single(leg) => leg.premium(),
            AnalysisRecord::Spread(spread) => spread.premium(),
        }
    }

    fn likelihood(&self) -> Option<f64> {
        match self {
            AnalysisRecord::Single(leg) => FilterRecord::likelihood(leg),
            AnalysisRecord::Spread(spread) => FilterRecord::likelihood(spread),
        }
    }

    fn ticker_key(&self) -> Option<String> {
        match self {
            AnalysisRecord::Single(leg) => leg.ticker_key(),
            AnalysisRecord::Spread(spread) => spread.ticker_key(),
        }
    }
}
