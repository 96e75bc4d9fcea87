// src/services/analytics.rs
use crate::models::{Greeks, OptionContract};

/// Best available estimate of a tradable price, most reliable source first:
/// bid/ask midpoint, last trade, previous close, bid alone, ask alone.
pub fn mid_price(contract: &OptionContract) -> Option<f64> {
    match (contract.bid, contract.ask) {
        (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
        _ => contract
            .last
            .or(contract.day_close)
            .or(contract.bid)
            .or(contract.ask),
    }
}

/// |delta| clamped to [0, 1]. A rough in-the-money proxy, not a calibrated probability.
pub fn likelihood(contract: &OptionContract) -> Option<f64> {
    contract.greeks.delta.map(|d| d.abs().clamp(0.0, 1.0))
}

/// Net greeks of holding `long` and writing `short`.
pub fn combined_greeks(long: &Greeks, short: &Greeks) -> Greeks {
    Greeks {
        delta: net(long.delta, short.delta),
        gamma: net(long.gamma, short.gamma),
        theta: net(long.theta, short.theta),
        vega: net(long.vega, short.vega),
        rho: net(long.rho, short.rho),
        iv: average_present(long.iv, short.iv),
    }
}

// A missing side only counts as zero when the other side is known.
fn net(long: Option<f64>, short: Option<f64>) -> Option<f64> {
    match (long, short) {
        (None, None) => None,
        (l, s) => Some(l.unwrap_or(0.0) - s.unwrap_or(0.0)),
    }
}

pub(crate) fn average_present(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: Option<f64>, ask: Option<f64>, last: Option<f64>, close: Option<f64>) -> OptionContract {
        OptionContract {
            bid,
            ask,
            last,
            day_close: close,
            ..OptionContract::default()
        }
    }

    fn with_delta(delta: Option<f64>) -> OptionContract {
        OptionContract {
            greeks: Greeks { delta, ..Greeks::default() },
            ..OptionContract::default()
        }
    }

    #[test]
    fn mid_price_walks_the_fallback_chain() {
        assert_eq!(mid_price(&quote(Some(10.0), Some(12.0), Some(9.0), None)), Some(11.0));
        assert_eq!(mid_price(&quote(None, None, Some(9.0), Some(8.0))), Some(9.0));
        assert_eq!(mid_price(&quote(None, None, None, Some(8.0))), Some(8.0));
        assert_eq!(mid_price(&quote(Some(1.5), None, None, None)), Some(1.5));
        assert_eq!(mid_price(&quote(None, Some(2.5), None, None)), Some(2.5));
        assert_eq!(mid_price(&quote(None, None, None, None)), None);
    }

    #[test]
    fn one_sided_quote_prefers_last_trade() {
        assert_eq!(mid_price(&quote(Some(1.0), None, Some(1.2), None)), Some(1.2));
    }

    #[test]
    fn likelihood_is_clamped_absolute_delta() {
        assert_eq!(likelihood(&with_delta(Some(-0.35))), Some(0.35));
        assert_eq!(likelihood(&with_delta(Some(1.4))), Some(1.0));
        assert_eq!(likelihood(&with_delta(Some(0.0))), Some(0.0));
        assert_eq!(likelihood(&with_delta(None)), None);
    }

    #[test]
    fn combined_greeks_distinguish_zero_from_unknown() {
        let long = Greeks { delta: Some(0.5), gamma: None, theta: None, vega: Some(0.1), rho: None, iv: Some(0.2) };
        let short = Greeks { delta: Some(0.2), gamma: Some(0.03), theta: None, vega: Some(0.1), rho: None, iv: Some(0.3) };
        let net = combined_greeks(&long, &short);

        assert!((net.delta.unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(net.gamma, Some(-0.03));
        assert_eq!(net.theta, None);
        assert_eq!(net.vega, Some(0.0));
        assert_eq!(net.rho, None);
        assert!((net.iv.unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn combined_delta_with_missing_long_leg() {
        let long = Greeks::default();
        let short = Greeks { delta: Some(0.2), ..Greeks::default() };
        assert_eq!(combined_greeks(&long, &short).delta, Some(-0.2));
        assert_eq!(combined_greeks(&long, &Greeks::default()).delta, None);
    }

    #[test]
    fn iv_uses_whichever_leg_has_it() {
        let long = Greeks { iv: None, ..Greeks::default() };
        let short = Greeks { iv: Some(0.4), ..Greeks::default() };
        assert_eq!(combined_greeks(&long, &short).iv, Some(0.4));
        assert_eq!(combined_greeks(&short, &long).iv, Some(0.4));
    }
}
