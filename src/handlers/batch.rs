// src/handlers/batch.rs
//! Multi-ticker variants. Each ticker succeeds or fails on its own; the batch
//! itself always answers 200.

use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::pe_ratios::series_body;
use super::valuation::{avg_body, default_years};
use crate::services::valuation::{PeRatioOptions, Valuator};

#[derive(Debug, Deserialize)]
pub struct BatchValuationRequest {
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default = "default_years")]
    pub years: u32,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchPeRatioRequest {
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(flatten)]
    pub options: PeRatioOptions,
}

fn failed(ticker: &str, error: impl std::fmt::Display) -> Value {
    json!({
        "ticker": ticker,
        "success": false,
        "error": error.to_string(),
    })
}

pub async fn batch_value_pe_avg(
    request: BatchValuationRequest,
    valuator: Arc<Valuator>,
) -> Result<Json, Rejection> {
    info!("Handling batch value_pe_avg for {} tickers", request.tickers.len());

    let mut results = Vec::with_capacity(request.tickers.len());
    for ticker in &request.tickers {
        match valuator
            .value_pe_avg(ticker, request.years, request.filename.as_deref())
            .await
        {
            Ok(valuation) => results.push(avg_body(ticker, &valuation)),
            Err(e) => {
                warn!("Batch value_pe_avg: {} failed: {}", ticker, e);
                results.push(failed(ticker, e));
            }
        }
    }

    Ok(warp::reply::json(&json!({
        "success": true,
        "results": results,
    })))
}

pub async fn batch_pe_ratios(
    request: BatchPeRatioRequest,
    valuator: Arc<Valuator>,
) -> Result<Json, Rejection> {
    info!("Handling batch pe_ratios for {} tickers", request.tickers.len());

    let mut results = Vec::with_capacity(request.tickers.len());
    for ticker in &request.tickers {
        match valuator.pe_ratios(ticker, &request.options).await {
            Ok(series) => results.push(series_body(ticker, &series)),
            Err(e) => {
                warn!("Batch pe_ratios: {} failed: {}", ticker, e);
                results.push(failed(ticker, e));
            }
        }
    }

    Ok(warp::reply::json(&json!({
        "success": true,
        "results": results,
    })))
}
