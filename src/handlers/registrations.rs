use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{json_body, path_params};
use crate::models::{ContactInput, ContactSnapshot, Registration};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Supplied by the identity layer in front of this service.
    pub registrant_id: Uuid,
    #[serde(default)]
    pub contact: ContactInput,
}

#[derive(Serialize)]
pub struct RegistrationReceipt {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub registrant_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&Registration> for RegistrationReceipt {
    fn from(registration: &Registration) -> Self {
        Self {
            registration_id: registration.id,
            event_id: registration.event_id,
            registrant_id: registration.registrant_id,
            created_at: registration.created_at,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    event_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let event_id = path_params(event_id)?;
    let request = json_body(body)?;
    // Rejected here, before the capacity guard sees it.
    let contact = ContactSnapshot::try_from(request.contact)?;

    let outcome = state
        .guard
        .attempt_register(event_id, request.registrant_id, contact)
        .await?;

    Ok(created(
        RegistrationReceipt::from(&outcome.registration),
        "Registration confirmed",
        outcome.warnings,
    ))
}

pub async fn list_registrations(
    State(state): State<AppState>,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let registrations = state.ledger.list(path_params(event_id)?).await?;
    Ok(success(registrations, "Registrations retrieved"))
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    params: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<Response, AppError> {
    let (event_id, registration_id) = path_params(params)?;
    state.guard.cancel(event_id, registration_id).await?;
    Ok(empty_success("Registration cancelled"))
}
