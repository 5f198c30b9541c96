// src/routes.rs
use std::convert::Infallible;
use std::sync::Arc;

use log::{error, info};
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::batch::{batch_pe_ratios, batch_value_pe_avg};
use crate::handlers::cache::{clear_cache_all, clear_cache_ticker, get_cache_info, health};
use crate::handlers::error::{failure, ApiError};
use crate::handlers::pe_ratios::get_pe_ratios;
use crate::handlers::valuation::{get_value_pe_avg, get_value_pe_min_max, ValuationQuery};
use crate::services::valuation::{PeRatioOptions, Valuator};

/// Batch bodies are small lists of tickers.
const MAX_BODY_BYTES: u64 = 64 * 1024;

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message: String;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        code = StatusCode::BAD_REQUEST;
        message = e.to_string();
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        message = e.to_string();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = StatusCode::PAYLOAD_TOO_LARGE;
        message = "Payload Too Large".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        error!("Unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(failure(message, code))
}

pub fn routes(valuator: Arc<Valuator>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let valuator_filter = warp::any().map(move || valuator.clone());

    let health_route = warp::path!("api" / "health")
        .and(warp::get())
        .and_then(health);

    let value_avg_route = warp::path!("api" / "value_pe_avg" / String)
        .and(warp::get())
        .and(warp::query::<ValuationQuery>())
        .and(valuator_filter.clone())
        .and_then(get_value_pe_avg);

    let value_min_max_route = warp::path!("api" / "value_pe_min_max" / String)
        .and(warp::get())
        .and(warp::query::<ValuationQuery>())
        .and(valuator_filter.clone())
        .and_then(get_value_pe_min_max);

    let pe_ratios_route = warp::path!("api" / "pe_ratios" / String)
        .and(warp::get())
        .and(warp::query::<PeRatioOptions>())
        .and(valuator_filter.clone())
        .and_then(get_pe_ratios);

    let batch_value_route = warp::path!("api" / "batch" / "value_pe_avg")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(valuator_filter.clone())
        .and_then(batch_value_pe_avg);

    let batch_pe_ratios_route = warp::path!("api" / "batch" / "pe_ratios")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(valuator_filter.clone())
        .and_then(batch_pe_ratios);

    let cache_info_route = warp::path!("api" / "cache")
        .and(warp::get())
        .and(valuator_filter.clone())
        .and_then(get_cache_info);

    let cache_clear_all_route = warp::path!("api" / "cache")
        .and(warp::delete())
        .and(valuator_filter.clone())
        .and_then(clear_cache_all);

    let cache_clear_route = warp::path!("api" / "cache" / String)
        .and(warp::delete())
        .and(valuator_filter.clone())
        .and_then(clear_cache_ticker);

    info!("All routes configured successfully.");

    health_route
        .or(value_avg_route)
        .or(value_min_max_route)
        .or(pe_ratios_route)
        .or(batch_value_route)
        .or(batch_pe_ratios_route)
        .or(cache_info_route)
        .or(cache_clear_all_route)
        .or(cache_clear_route)
        .recover(handle_rejection)
}
