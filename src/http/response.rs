//! Client-visible error responses.
//!
//! # Responsibilities
//! - Map a [`ProxyError`] to its status code and `{"error": "..."}` body
//! - Record every translated error at error level before it is written
//!
//! # Design Decisions
//! - One envelope shape for every failure, core or pipeline
//! - Messages carry the failure detail but never header values

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;

/// JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Translate an error into status + envelope.
pub fn translate(err: &ProxyError) -> (StatusCode, ErrorBody) {
    (
        err.status(),
        ErrorBody {
            error: err.to_string(),
        },
    )
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = translate(&self);
        tracing::error!(
            status = status.as_u16(),
            kind = self.kind(),
            error = %body.error,
            "Request failed"
        );
        (status, Json(body)).into_response()
    }
}
