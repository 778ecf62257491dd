use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::assessment::errors::AssessmentError;
use crate::reference::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No occupation match: {0}")]
    NoOccupationMatch(String),

    #[error("Reference data unavailable: {0}")]
    ReferenceDataUnavailable(#[from] StoreError),
}

impl From<AssessmentError> for AppError {
    fn from(err: AssessmentError) -> Self {
        match err {
            AssessmentError::NoOccupationMatch(title) => AppError::NoOccupationMatch(format!(
                "Could not determine an occupation for '{title}'"
            )),
            AssessmentError::EmptyOrInvalidTaskInput(msg) => AppError::Validation(msg),
            AssessmentError::ReferenceDataUnavailable(e) => AppError::ReferenceDataUnavailable(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NoOccupationMatch(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "NO_OCCUPATION_MATCH",
                msg.clone(),
            ),
            AppError::ReferenceDataUnavailable(e) => {
                tracing::error!("Reference data error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "REFERENCE_DATA_UNAVAILABLE",
                    "Occupation reference data is unavailable".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
