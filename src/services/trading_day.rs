// src/services/trading_day.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// Daily close of the listing exchange, in exchange-local time.
pub const EXCHANGE_CLOSE_HOUR: u32 = 16;

/// Resolves the trading-day label the cache is keyed on.
#[derive(Debug, Clone, Copy)]
pub struct TradingDayResolver {
    tz: Tz,
    close: NaiveTime,
}

impl Default for TradingDayResolver {
    fn default() -> Self {
        TradingDayResolver {
            tz: New_York,
            close: NaiveTime::from_hms_opt(EXCHANGE_CLOSE_HOUR, 0, 0).unwrap_or_default(),
        }
    }
}

impl TradingDayResolver {
    pub fn new(tz: Tz, close: NaiveTime) -> Self {
        TradingDayResolver { tz, close }
    }

    /// The label only advances once the day's session has closed; before
    /// that the previous calendar day is used.
    pub fn effective_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = now.with_timezone(&self.tz);
        if local.time() >= self.close {
            local.date_naive()
        } else {
            local.date_naive() - Duration::days(1)
        }
    }

    pub fn effective_label(&self, now: DateTime<Utc>) -> String {
        self.effective_date(now).format("%Y-%m-%d").to_string()
    }
}
