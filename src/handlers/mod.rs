use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::{extract::Path, response::IntoResponse, response::Response, Json};
use serde::Serialize;

use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod events;
pub mod registrations;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "huddle-api",
    };

    success(payload, "Health check successful").into_response()
}

/// Unwraps a JSON body, turning extractor rejections into the API envelope.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

fn path_params<T>(params: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    params
        .map(|Path(value)| value)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}
