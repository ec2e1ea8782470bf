//! `{data, meta}` on success, `{error, meta}` on failure.
//!
//! Error codes are the status's canonical reason in upper snake case
//! (`503` → `SERVICE_UNAVAILABLE`), so handlers only pick a status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    pub engine_version: &'static str,
}

impl ResponseMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            engine_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        Self::respond(StatusCode::OK, data)
    }

    /// Background work was started; poll for its outcome.
    pub fn accepted(data: T) -> Response {
        Self::respond(StatusCode::ACCEPTED, data)
    }

    fn respond(status: StatusCode, data: T) -> Response {
        let meta = ResponseMeta::now();
        (status, Json(Self { data, meta })).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    pub fn respond(status: StatusCode, message: impl Into<String>) -> Response {
        let code = status
            .canonical_reason()
            .unwrap_or("ERROR")
            .to_uppercase()
            .replace(' ', "_");
        let error = ErrorDetail {
            code,
            message: message.into(),
        };
        let meta = ResponseMeta::now();
        (status, Json(Self { error, meta })).into_response()
    }

    pub fn not_found(message: impl Into<String>) -> Response {
        Self::respond(StatusCode::NOT_FOUND, message)
    }

    /// Unparseable or out-of-range input.
    pub fn bad_request(message: impl Into<String>) -> Response {
        Self::respond(StatusCode::BAD_REQUEST, message)
    }

    /// The session is busy.
    pub fn conflict(message: impl Into<String>) -> Response {
        Self::respond(StatusCode::CONFLICT, message)
    }

    /// No model is loaded.
    pub fn service_unavailable(message: impl Into<String>) -> Response {
        Self::respond(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}
