//! Response envelopes
//!
//! Success: `{"status":"success","data":…,"meta":{"cached":…}}`
//! Error:   `{"status":"error","error":{"code":…,"message":…}}`

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

/// Envelope for successful responses
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `"success"`
    pub status: &'static str,
    /// Payload
    pub data: T,
    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// Response metadata
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Meta {
    /// Whether the payload was served from the cache
    pub cached: bool,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful payload tagged with its cache provenance
    pub fn with_cache(data: T, cached: bool) -> Self {
        Self {
            status: "success",
            data,
            meta: Some(Meta { cached }),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error returned by handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Create an error with an explicit status
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 404 Not Found
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 405 Method Not Allowed
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    }

    /// 500, logged at error level
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(message = %message, "Internal server error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// HTTP status of this error
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    status: &'static str,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: "error",
            error: ErrorBody {
                code: self.status.as_u16(),
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        match err.status_code() {
            StatusCode::NOT_FOUND => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}
