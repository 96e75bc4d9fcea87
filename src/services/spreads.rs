// src/services/spreads.rs
//! Builds two-leg spread candidates out of a flat canonical chain.
//!
//! Only neighbours are paired: an N-contract partition yields N-1 candidates.
//! Candidates carry no identity between reloads.

use std::collections::BTreeMap;

use log::debug;

use crate::models::{ContractType, OptionContract, SpreadCandidate, Strategy};
use crate::services::analytics::{average_present, combined_greeks, likelihood, mid_price};
use crate::services::filters::format_strike;
use crate::services::normalizer::parse_occ_symbol;

/// Everything other than `Calendar Spread` is built as a vertical.
pub fn build_spreads(chain: &[OptionContract], strategy: Strategy) -> Vec<SpreadCandidate> {
    let spreads = match strategy {
        Strategy::CalendarSpread => calendar_spreads(chain, strategy.label()),
        _ => vertical_spreads(chain, strategy.label()),
    };
    debug!(
        "Built {} {} candidates from {} contracts",
        spreads.len(),
        strategy,
        chain.len()
    );
    spreads
}

/// Same type and expiration, adjacent strikes.
pub fn vertical_spreads(chain: &[OptionContract], label: &str) -> Vec<SpreadCandidate> {
    let mut partitions: BTreeMap<(Option<ContractType>, Option<String>), Vec<(f64, &OptionContract)>> =
        BTreeMap::new();
    for contract in chain {
        // Nothing to order by without a strike.
        let Some(strike) = contract.strike_price else { continue };
        partitions
            .entry((contract.contract_type, contract.expiration_date.clone()))
            .or_default()
            .push((strike, contract));
    }

    let mut spreads = Vec::new();
    for ((contract_type, expiration), mut legs) in partitions {
        legs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in legs.windows(2) {
            let (low_strike, low) = pair[0];
            let (high_strike, high) = pair[1];
            // A long put wants the higher strike; calls the lower.
            let (long_leg, short_leg) = match contract_type {
                Some(ContractType::Put) => (high, low),
                _ => (low, high),
            };
            spreads.push(assemble(
                label,
                contract_type,
                long_leg,
                short_leg,
                format!("{}/{}", format_strike(low_strike), format_strike(high_strike)),
                expiration.clone().unwrap_or_default(),
            ));
        }
    }
    spreads
}

/// Same type and strike, adjacent expirations: short the near month, long the far one.
pub fn calendar_spreads(chain: &[OptionContract], label: &str) -> Vec<SpreadCandidate> {
    // Keyed by the formatted strike so 100 and 100.0 land together.
    let mut partitions: BTreeMap<(Option<ContractType>, String), Vec<(&str, &OptionContract)>> =
        BTreeMap::new();
    for contract in chain {
        let (Some(strike), Some(expiration)) = (contract.strike_price, contract.expiration_date.as_deref())
        else {
            continue;
        };
        partitions
            .entry((contract.contract_type, format_strike(strike)))
            .or_default()
            .push((expiration, contract));
    }

    let mut spreads = Vec::new();
    for ((contract_type, strike_label), mut legs) in partitions {
        // ISO dates sort lexicographically in date order.
        legs.sort_by(|a, b| a.0.cmp(b.0));
        for pair in legs.windows(2) {
            let (near_date, near) = pair[0];
            let (far_date, far) = pair[1];
            spreads.push(assemble(
                label,
                contract_type,
                far,
                near,
                strike_label.clone(),
                format!("{}/{}", near_date, far_date),
            ));
        }
    }
    spreads
}

fn assemble(
    strategy: &str,
    contract_type: Option<ContractType>,
    long_leg: &OptionContract,
    short_leg: &OptionContract,
    strike_pair_label: String,
    expiration_label: String,
) -> SpreadCandidate {
    let net_premium = match (mid_price(long_leg), mid_price(short_leg)) {
        (None, None) => None,
        (long, short) => Some((long.unwrap_or(0.0) - short.unwrap_or(0.0)).abs()),
    };

    SpreadCandidate {
        strategy: strategy.to_string(),
        ticker: underlying_of(long_leg).or_else(|| underlying_of(short_leg)),
        contract_type,
        strike_pair_label,
        expiration_label,
        net_premium,
        likelihood: average_present(likelihood(long_leg), likelihood(short_leg)),
        combined_greeks: combined_greeks(&long_leg.greeks, &short_leg.greeks),
        long_leg: long_leg.clone(),
        short_leg: short_leg.clone(),
    }
}

fn underlying_of(contract: &OptionContract) -> Option<String> {
    let ticker = contract.ticker.as_deref()?;
    Some(
        parse_occ_symbol(ticker)
            .map(|occ| occ.underlying)
            .unwrap_or_else(|| ticker.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Greeks;

    fn contract(kind: ContractType, expiration: &str, strike: f64) -> OptionContract {
        OptionContract {
            ticker: Some("SPY".to_string()),
            expiration_date: Some(expiration.to_string()),
            contract_type: Some(kind),
            strike_price: Some(strike),
            ..OptionContract::default()
        }
    }

    fn priced(mut c: OptionContract, bid: f64, ask: f64, delta: Option<f64>) -> OptionContract {
        c.bid = Some(bid);
        c.ask = Some(ask);
        c.greeks = Greeks { delta, ..Greeks::default() };
        c
    }

    #[test]
    fn call_verticals_pair_adjacent_strikes_long_low() {
        let chain = vec![
            contract(ContractType::Call, "2024-01-19", 110.0),
            contract(ContractType::Call, "2024-01-19", 100.0),
            contract(ContractType::Call, "2024-01-19", 105.0),
        ];
        let spreads = build_spreads(&chain, Strategy::VerticalSpread);

        assert_eq!(spreads.len(), 2);
        assert_eq!(spreads[0].strike_pair_label, "100/105");
        assert_eq!(spreads[0].long_leg.strike_price, Some(100.0));
        assert_eq!(spreads[0].short_leg.strike_price, Some(105.0));
        assert_eq!(spreads[1].strike_pair_label, "105/110");
        assert_eq!(spreads[1].long_leg.strike_price, Some(105.0));
        assert_eq!(spreads[1].short_leg.strike_price, Some(110.0));
        assert_eq!(spreads[0].expiration_label, "2024-01-19");
        assert_eq!(spreads[0].strategy, "Vertical Spread");
    }

    #[test]
    fn put_verticals_go_long_the_higher_strike() {
        let chain = vec![
            contract(ContractType::Put, "2024-01-19", 100.0),
            contract(ContractType::Put, "2024-01-19", 105.0),
        ];
        let spreads = build_spreads(&chain, Strategy::VerticalSpread);

        assert_eq!(spreads.len(), 1);
        assert_eq!(spreads[0].long_leg.strike_price, Some(105.0));
        assert_eq!(spreads[0].short_leg.strike_price, Some(100.0));
        assert_eq!(spreads[0].strike_pair_label, "100/105");
        assert_eq!(spreads[0].contract_type, Some(ContractType::Put));
    }

    #[test]
    fn verticals_never_cross_type_or_expiration() {
        let chain = vec![
            contract(ContractType::Call, "2024-01-19", 100.0),
            contract(ContractType::Put, "2024-01-19", 105.0),
            contract(ContractType::Call, "2024-02-16", 110.0),
        ];
        assert!(build_spreads(&chain, Strategy::VerticalSpread).is_empty());
    }

    #[test]
    fn calendar_shorts_the_near_expiration() {
        let chain = vec![
            contract(ContractType::Call, "2024-02-16", 100.0),
            contract(ContractType::Call, "2024-01-19", 100.0),
        ];
        let spreads = build_spreads(&chain, Strategy::CalendarSpread);

        assert_eq!(spreads.len(), 1);
        assert_eq!(spreads[0].short_leg.expiration_date.as_deref(), Some("2024-01-19"));
        assert_eq!(spreads[0].long_leg.expiration_date.as_deref(), Some("2024-02-16"));
        assert_eq!(spreads[0].expiration_label, "2024-01-19/2024-02-16");
        assert_eq!(spreads[0].strike_pair_label, "100");
    }

    #[test]
    fn calendar_groups_numerically_equal_strikes() {
        let chain = vec![
            contract(ContractType::Put, "2024-01-19", 100.0),
            contract(ContractType::Put, "2024-02-16", 100.000),
            contract(ContractType::Put, "2024-03-15", 102.5),
        ];
        let spreads = calendar_spreads(&chain, "Calendar Spread");
        assert_eq!(spreads.len(), 1);
        assert_eq!(spreads[0].strike_pair_label, "100");
    }

    #[test]
    fn premium_and_likelihood_are_derived_from_legs() {
        let chain = vec![
            priced(contract(ContractType::Call, "2024-01-19", 100.0), 4.0, 4.4, Some(0.6)),
            priced(contract(ContractType::Call, "2024-01-19", 105.0), 1.8, 2.2, Some(0.4)),
        ];
        let spread = &build_spreads(&chain, Strategy::VerticalSpread)[0];

        assert!((spread.net_premium.unwrap() - 2.2).abs() < 1e-9);
        assert!((spread.likelihood.unwrap() - 0.5).abs() < 1e-9);
        assert!((spread.combined_greeks.delta.unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn premium_is_non_negative_and_missing_without_quotes() {
        let chain = vec![
            priced(contract(ContractType::Put, "2024-01-19", 100.0), 1.0, 1.2, None),
            contract(ContractType::Put, "2024-01-19", 105.0),
        ];
        let spread = &build_spreads(&chain, Strategy::VerticalSpread)[0];
        // long = 105 (unpriced), short = 100 at 1.1
        assert!((spread.net_premium.unwrap() - 1.1).abs() < 1e-9);
        assert_eq!(spread.likelihood, None);

        let bare = vec![
            contract(ContractType::Call, "2024-01-19", 100.0),
            contract(ContractType::Call, "2024-01-19", 105.0),
        ];
        assert_eq!(build_spreads(&bare, Strategy::VerticalSpread)[0].net_premium, None);
    }

    #[test]
    fn candidate_ticker_is_the_underlying() {
        let mut near = contract(ContractType::Call, "2024-01-19", 190.0);
        near.ticker = Some("O:AAPL240119C00190000".to_string());
        let mut far = contract(ContractType::Call, "2024-02-16", 190.0);
        far.ticker = Some("O:AAPL240216C00190000".to_string());
        let spreads = build_spreads(&[near, far], Strategy::CalendarSpread);
        assert_eq!(spreads[0].ticker.as_deref(), Some("AAPL"));
    }
}
