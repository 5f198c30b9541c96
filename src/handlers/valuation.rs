// src/handlers/valuation.rs
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Rejection;

use super::error::failure;
use crate::models::{AvgValuation, MinMaxValuation};
use crate::services::valuation::Valuator;

#[derive(Debug, Deserialize)]
pub struct ValuationQuery {
    #[serde(default = "default_years")]
    pub years: u32,
    #[serde(default)]
    pub filename: Option<String>,
}

pub fn default_years() -> u32 {
    2
}

pub(crate) fn avg_body(ticker: &str, valuation: &AvgValuation) -> Value {
    json!({
        "success": true,
        "ticker": ticker,
        "score": valuation.score,
        "score_100": valuation.score * 100.0,
        "details": valuation.details,
        "price_freshness": valuation.price_freshness,
    })
}

fn min_max_body(ticker: &str, valuation: &MinMaxValuation) -> Value {
    json!({
        "success": true,
        "ticker": ticker,
        "score": valuation.score,
        "score_100": valuation.score * 100.0,
        "current_pe": valuation.current_pe,
        "min_pe": valuation.min_pe,
        "max_pe": valuation.max_pe,
        "data_points": valuation.pe_history.len(),
        "price_freshness": valuation.price_freshness,
    })
}

pub async fn get_value_pe_avg(
    ticker: String,
    query: ValuationQuery,
    valuator: Arc<Valuator>,
) -> Result<impl warp::Reply, Rejection> {
    info!("Handling value_pe_avg for {} ({} years)", ticker, query.years);

    match valuator.value_pe_avg(&ticker, query.years, query.filename.as_deref()).await {
        Ok(valuation) => Ok(warp::reply::with_status(
            warp::reply::json(&avg_body(&ticker, &valuation)),
            StatusCode::OK,
        )),
        Err(e) => {
            error!("value_pe_avg failed for {}: {}", ticker, e);
            Ok(failure(e, StatusCode::BAD_REQUEST))
        }
    }
}

pub async fn get_value_pe_min_max(
    ticker: String,
    query: ValuationQuery,
    valuator: Arc<Valuator>,
) -> Result<impl warp::Reply, Rejection> {
    info!("Handling value_pe_min_max for {} ({} years)", ticker, query.years);

    match valuator.value_pe_min_max(&ticker, query.years, query.filename.as_deref()).await {
        Ok(valuation) => Ok(warp::reply::with_status(
            warp::reply::json(&min_max_body(&ticker, &valuation)),
            StatusCode::OK,
        )),
        Err(e) => {
            error!("value_pe_min_max failed for {}: {}", ticker, e);
            Ok(failure(e, StatusCode::BAD_REQUEST))
        }
    }
}
