//! Response envelopes shared by middleware and handlers.
//!
//! Errors: `{"success": false, "code", "message", "error", "timestamp", "request_id"}`.
//! Success: `{"success": true, "data", "timestamp", "request_id"}`.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use crate::request_id::REQUEST_ID_HEADER;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    code: u16,
    message: &'a str,
    error: &'static str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SuccessBody<'a, T> {
    success: bool,
    data: T,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

/// Request id assigned by the request-id layer, if any.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl AsRef<str>,
    request_id: Option<&str>,
) -> Response {
    let body = ErrorBody {
        success: false,
        code: status.as_u16(),
        message: message.as_ref(),
        error: code,
        timestamp: Utc::now().timestamp(),
        request_id,
    };
    (status, axum::Json(body)).into_response()
}

pub fn json_ok<T: Serialize>(data: T, request_id: Option<&str>) -> Response {
    let body = SuccessBody {
        success: true,
        data,
        timestamp: Utc::now().timestamp(),
        request_id,
    };
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub fn unauthorized(message: &str, request_id: Option<&str>) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message, request_id)
}

pub fn forbidden(message: &str, request_id: Option<&str>) -> Response {
    json_error(StatusCode::FORBIDDEN, "FORBIDDEN", message, request_id)
}

pub fn bad_request(message: &str, request_id: Option<&str>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message, request_id)
}
