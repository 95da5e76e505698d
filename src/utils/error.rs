use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::services::RegistryError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

/// Seconds a client should wait before retrying a transient failure.
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Event full: {0}")]
    EventFull(String),

    #[error("Capacity below occupancy: {0}")]
    CapacityBelowOccupancy(String),

    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyRegistered(_)
            | AppError::EventFull(_)
            | AppError::CapacityBelowOccupancy(_) => StatusCode::CONFLICT,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            AppError::EventFull(_) => "EVENT_FULL",
            AppError::CapacityBelowOccupancy(_) => "CAPACITY_BELOW_OCCUPANCY",
            AppError::Transient(_) => "TRANSIENT_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    fn log(&self) {
        match self {
            // Expected outcomes of normal traffic.
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::AlreadyRegistered(msg)
            | AppError::EventFull(msg)
            | AppError::CapacityBelowOccupancy(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::Transient(msg) => {
                warn!(message = %msg, "Transient store failure");
            }
            AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        let message = err.to_string();
        match err {
            RegistryError::Validation(msg) => AppError::ValidationError(msg),
            RegistryError::EventNotFound(_) | RegistryError::RegistrationNotFound(_) => {
                AppError::NotFound(message)
            }
            RegistryError::AlreadyRegistered { .. } => AppError::AlreadyRegistered(message),
            RegistryError::EventFull { .. } => AppError::EventFull(message),
            RegistryError::CapacityBelowOccupancy { .. } => {
                AppError::CapacityBelowOccupancy(message)
            }
            RegistryError::Transient(msg) => AppError::Transient(msg),
            RegistryError::Store(StoreError::Database(e)) => AppError::DatabaseError(e),
            RegistryError::Store(other) => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::AlreadyRegistered(msg)
            | AppError::EventFull(msg)
            | AppError::CapacityBelowOccupancy(msg) => msg.clone(),
            AppError::Transient(_) => {
                "The event is busy, please retry shortly".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        };

        let details = self
            .is_retryable()
            .then(|| json!({ "retryable": true }));

        let mut response = error_response(code, public_message, details, status);
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_registry_errors_map_to_distinct_codes() {
        let event_id = Uuid::new_v4();
        let cases = [
            (RegistryError::EventNotFound(event_id), "NOT_FOUND", StatusCode::NOT_FOUND),
            (
                RegistryError::AlreadyRegistered {
                    event_id,
                    registrant_id: Uuid::new_v4(),
                },
                "ALREADY_REGISTERED",
                StatusCode::CONFLICT,
            ),
            (
                RegistryError::EventFull {
                    event_id,
                    capacity: 2,
                },
                "EVENT_FULL",
                StatusCode::CONFLICT,
            ),
            (
                RegistryError::Transient("lock timeout".into()),
                "TRANSIENT_ERROR",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RegistryError::from(StoreError::Transient("pool timed out".into())),
                "TRANSIENT_ERROR",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, code, status) in cases {
            let app_error = AppError::from(err);
            assert_eq!(app_error.code(), code);
            assert_eq!(app_error.status_code(), status);
        }
    }

    #[test]
    fn test_transient_response_carries_retry_after() {
        let response = AppError::Transient("lock timeout".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            RETRY_AFTER_SECS
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let app_error = AppError::from(RegistryError::Store(StoreError::Inconsistent(
            "secret detail".into(),
        )));
        assert_eq!(app_error.code(), "INTERNAL_SERVER_ERROR");
    }
}
