// SPDX-License-Identifier: Apache-2.0
//! Translating `theatreos_types::EngineError` to HTTP-style codes (spec §7
//! "Transport translates engine errors to HTTP-style codes at the
//! boundary"). This is the only place in the workspace that maps an error
//! *kind* onto a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use theatreos_types::EngineError;

/// Wraps an [`EngineError`] so it can be returned directly from an axum
/// handler.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::InsufficientFunds(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            EngineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "kind": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
