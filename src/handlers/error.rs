// src/handlers/error.rs
use serde_json::json;
use std::fmt;
use warp::http::StatusCode;
use warp::reject::Reject;
use warp::reply::{Json, WithStatus};

#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
    pub status: StatusCode,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
impl Reject for ApiError {}

/// `{success: false, error}` with the given status.
pub fn failure(message: impl fmt::Display, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({
            "success": false,
            "error": message.to_string(),
        })),
        status,
    )
}
