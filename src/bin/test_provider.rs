// src/bin/test_provider.rs
use stoptions::services::cache::normalize_ticker;
use stoptions::services::config::AppConfig;
use stoptions::services::horizons;
use stoptions::services::normalizer::normalize_chain;
use log::{info, error};
use env_logger;
use dotenv::dotenv;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let ticker = normalize_ticker(&std::env::args().nth(1).unwrap_or_else(|| "SPY".to_string()));
    let config = AppConfig::from_env()?;
    let provider = config.build_provider()?;
    info!("Testing {} provider with {}...", provider.name(), ticker);

    match provider.fetch_previous_close(&ticker).await {
        Ok(stock) => info!("SUCCESS: previous close: {:?}", stock),
        Err(e) => {
            error!("ERROR: previous close failed: {} ({})", e, e.hint());
            return Err(e.into());
        }
    }

    let raw = provider.fetch_option_snapshots(&ticker).await?;
    let chain = normalize_chain(&raw);
    info!("Option snapshots: {} raw, {} normalized", raw.len(), chain.len());
    if let Some(first) = chain.first() {
        info!("First contract: {:?}", first);
    }

    let (_, horizon) = horizons::horizon(0);
    let bars = provider
        .fetch_aggregates(&ticker, horizon.days_back, horizon.minutes_per_bar, chrono::Utc::now())
        .await?;
    info!("{} bars for horizon {} ({})", bars.len(), horizon.label, horizon.cadence);

    Ok(())
}
