// src/bin/test_trading_day.rs
use stoptions::services::trading_day::{TradingDayResolver, EXCHANGE_CLOSE_HOUR};
use log::info;
use env_logger;
use chrono::Utc;
use chrono_tz::America::New_York;

fn main() {
    env_logger::init();

    let now = Utc::now();
    let resolver = TradingDayResolver::default();

    info!("Current time:");
    info!("  UTC: {}", now);
    info!("  New York: {}", now.with_timezone(&New_York));
    info!("Exchange close: {}:00 New York", EXCHANGE_CLOSE_HOUR);
    info!("Effective trading day: {}", resolver.effective_label(now));
}
