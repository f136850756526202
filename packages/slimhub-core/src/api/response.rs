//! HTTP response helpers for consistent API responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// `{ "success": true }`
pub fn api_ok() -> impl IntoResponse {
    api_success(json!({ "success": true }))
}
