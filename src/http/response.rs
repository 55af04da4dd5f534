//! Gateway error responses.
//!
//! # Responsibilities
//! - Map every terminal rejection to an HTTP status and a stable error code
//! - Render the shared JSON error envelope
//!
//! # Design Decisions
//! - Upstream transport failures are 502, never 500: 502 tells clients a retry
//!   may succeed once the backend recovers, 500 points at the gateway itself
//! - Authentication failures carry one message regardless of cause

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// A terminal rejection produced by a pipeline stage or the forwarder.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("target service is unavailable")]
    UpstreamUnavailable,

    #[error("{0}")]
    Proxy(&'static str),

    #[error("{0}")]
    InvalidRequest(&'static str),

    #[error("route not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            GatewayError::Proxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::Unauthorized(_) => "UNAUTHORIZED",
            GatewayError::Forbidden(_) => "FORBIDDEN",
            GatewayError::UpstreamUnavailable => "SERVICE_UNAVAILABLE",
            GatewayError::Proxy(_) => "PROXY_ERROR",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::NotFound => "NOT_FOUND",
            GatewayError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
        }
    }
}

/// `{"success": false, "error": {"code": ..., "message": ...}}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::RateLimited {
            retry_after: Some(wait),
        } = self
        {
            // Whole seconds, rounded up so clients never retry early.
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}
