//! api error handling for http handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyserver_grants::OperationError;

/// api error type for handler responses
///
/// bodies stay generic where detail would help an attacker; the detail goes
/// to the server log instead.
#[derive(Debug)]
pub enum ApiError {
    /// authentication failed (401)
    Unauthorized,
    /// the authenticated account may not perform an operation (403)
    Forbidden,
    /// any other batch failure (400)
    BadRequest,
    /// not found error (404)
    NotFound(String),
    /// internal server error (500)
    Internal(String),
}

impl ApiError {
    /// create internal server error from any error type
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }

    /// create not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        if err.is_forbidden() {
            Self::Forbidden
        } else {
            Self::BadRequest
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication failed.".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Particular operation forbidden.".to_string(),
            ),
            ApiError::BadRequest => (
                StatusCode::BAD_REQUEST,
                "Request processing failed. See server logs for details.".to_string(),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                format!("Request processing failed: {msg}"),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, message).into_response()
    }
}

/// extension trait for converting results to apierror
pub trait ResultExt<T> {
    /// convert error to internal server error
    fn map_internal(self) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn map_internal(self) -> Result<T, ApiError> {
        self.map_err(ApiError::internal)
    }
}

/// extension trait for converting options to apierror
pub trait OptionExt<T> {
    /// convert none to not found error
    fn or_not_found(self, msg: &str) -> Result<T, ApiError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(msg))
    }
}
