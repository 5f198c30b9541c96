// src/handlers/cache.rs
use log::info;
use serde_json::json;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use crate::services::price_cache::is_valid_ticker;
use crate::services::valuation::Valuator;

pub async fn get_cache_info(valuator: Arc<Valuator>) -> Result<Json, Rejection> {
    let entries = valuator.prices().cache().info();
    info!("Cache holds {} entries", entries.len());
    Ok(warp::reply::json(&json!({
        "success": true,
        "entries": entries,
    })))
}

pub async fn clear_cache_ticker(ticker: String, valuator: Arc<Valuator>) -> Result<Json, Rejection> {
    if !is_valid_ticker(&ticker) {
        return Err(warp::reject::custom(ApiError::bad_request(format!(
            "Invalid ticker: {}",
            ticker
        ))));
    }

    let removed = valuator.prices().cache().clear(Some(&ticker));
    info!("Cleared cache for {} ({} removed)", ticker, removed);
    Ok(warp::reply::json(&json!({
        "success": true,
        "removed": removed,
    })))
}

pub async fn clear_cache_all(valuator: Arc<Valuator>) -> Result<Json, Rejection> {
    let removed = valuator.prices().cache().clear(None);
    info!("Cleared whole cache ({} removed)", removed);
    Ok(warp::reply::json(&json!({
        "success": true,
        "removed": removed,
    })))
}

pub async fn health() -> Result<Json, Rejection> {
    Ok(warp::reply::json(&json!({ "status": "ok" })))
}
