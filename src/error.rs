use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use crate::api::json_response;
use crate::core::PayloadError;
use crate::report::ReportError;
use crate::store::StoreError;

/// Errors surfaced to HTTP callers. Every variant renders as a JSON body
/// with `success: false`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Assumptions validation failed")]
    Validation { violations: Vec<String> },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("Data integrity error")]
    Integrity(String),
    #[error("Resource not found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. }
            | ApiError::BadRequest(_)
            | ApiError::Duplicate(_)
            | ApiError::Integrity(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.to_string(),
        });
        match self {
            ApiError::Validation { violations } => {
                body["violations"] = json!(violations);
            }
            ApiError::Integrity(details) => {
                body["details"] = json!(details);
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(msg) = &self {
            error!(error = %msg, "request failed");
        }
        json_response(self.status(), self.body())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::DuplicateName => ApiError::Duplicate(err.to_string()),
            StoreError::NameRequired | StoreError::InvalidDate(_) => {
                ApiError::BadRequest(err.to_string())
            }
            StoreError::Validation(violations) => ApiError::Validation { violations },
            StoreError::Integrity(details) => ApiError::Integrity(details),
            StoreError::Sqlite(_) | StoreError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<PayloadError> for ApiError {
    fn from(err: PayloadError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
