// src/handlers/pe_ratios.rs
use log::{error, info};
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Rejection;

use super::error::failure;
use crate::models::PeRatioSeries;
use crate::services::valuation::{PeRatioOptions, Valuator};

pub(crate) fn series_body(ticker: &str, series: &PeRatioSeries) -> Value {
    json!({
        "success": true,
        "ticker": ticker,
        "pe_ttm": series.pe_ttm,
        "pe_forward": series.pe_forward,
        "price": series.price,
        "unsupported": series.unsupported,
        "price_freshness": series.price_freshness,
    })
}

pub async fn get_pe_ratios(
    ticker: String,
    options: PeRatioOptions,
    valuator: Arc<Valuator>,
) -> Result<impl warp::Reply, Rejection> {
    info!(
        "Handling pe_ratios for {} ({} years, source {}, smoothing {})",
        ticker, options.years, options.source, options.smoothing
    );

    match valuator.pe_ratios(&ticker, &options).await {
        Ok(series) => Ok(warp::reply::with_status(
            warp::reply::json(&series_body(&ticker, &series)),
            StatusCode::OK,
        )),
        Err(e) => {
            error!("pe_ratios failed for {}: {}", ticker, e);
            Ok(failure(e, StatusCode::BAD_REQUEST))
        }
    }
}
