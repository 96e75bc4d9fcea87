// src/routes.rs
use crate::handlers::analysis::{export_analysis, get_analysis, AnalysisQuery};
use crate::handlers::market::{get_horizons, get_market, get_strategies, MarketQuery};
use crate::handlers::SharedCache;
use log::info;

use std::convert::Infallible;
use warp::{Filter, Reply};
use warp::http::StatusCode;
use warp::reject::Rejection;
use crate::handlers::error::ApiError;

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;
    let mut hint = None;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
        hint = api_error.hint.clone();
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        code = StatusCode::BAD_REQUEST;
        message = e.to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
            "hint": hint,
        })),
        code,
    ))
}

pub fn routes(cache: SharedCache) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let cache_filter = warp::any().map(move || cache.clone());

    let horizons_route = warp::path!("api" / "v1" / "horizons")
        .and(warp::get())
        .and_then(get_horizons);

    let strategies_route = warp::path!("api" / "v1" / "strategies")
        .and(warp::get())
        .and_then(get_strategies);

    let market_route = warp::path!("api" / "v1" / "market" / String)
        .and(warp::get())
        .and(warp::query::<MarketQuery>())
        .and(cache_filter.clone())
        .and_then(get_market);

    let analysis_route = warp::path!("api" / "v1" / "analysis" / String)
        .and(warp::get())
        .and(warp::query::<AnalysisQuery>())
        .and(cache_filter.clone())
        .and_then(get_analysis);

    let export_route = warp::path!("api" / "v1" / "analysis" / String / "export")
        .and(warp::get())
        .and(warp::query::<AnalysisQuery>())
        .and(cache_filter.clone())
        .and_then(export_analysis);

    info!("All routes configured successfully.");

    horizons_route
        .or(strategies_route)
        .or(market_route)
        .or(analysis_route)
        .or(export_route)
        .recover(handle_rejection)
}
