//! Error types for the generation service.
//!
//! `ApiError` is the run-level taxonomy surfaced to HTTP callers;
//! `RemoteError` covers failures talking to the remote CRM batch API.
//! Per-item batch failures are not errors at all: the item is dropped and
//! reported through counts.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

/// Failures from the remote CRM batch API.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote call failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote API error: {0}")]
    Api(String),

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Run-level error taxonomy for generation requests.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or unknown session.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Generation is paused; the client should reconnect to resume.
    #[error("generation is paused for this session; reconnect to resume")]
    Conflict,

    /// Run aborted because the session disconnected or its pause expired.
    #[error("session inactive")]
    SessionInactive,

    /// Remote call or result assembly failed; the run was stopped.
    #[error("remote API failure: {0}")]
    Remote(#[from] RemoteError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::SessionInactive => StatusCode::REQUEST_TIMEOUT,
            ApiError::Remote(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
