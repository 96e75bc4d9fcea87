use anyhow::Result;
use dotenv::dotenv;
use env_logger;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use warp::Filter;

use stoptions::routes;
use stoptions::services::cache::{CacheStore, MarketDataCache};
use stoptions::services::config::AppConfig;
use stoptions::services::trading_day::TradingDayResolver;

// Requests are served one at a time against the per-ticker cache files.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env()?;
    let provider = config.build_provider()?;
    info!("Caching market data under {}", config.cache_dir.display());

    let cache = MarketDataCache::new(
        CacheStore::new(&config.cache_dir),
        provider,
        TradingDayResolver::default(),
    );
    let shared = Arc::new(Mutex::new(cache));

    let addr: SocketAddr = ([127, 0, 0, 1], config.port).into();
    info!("Will bind to: {}", addr);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET"]);

    let api = routes::routes(shared).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
    Ok(())
}
