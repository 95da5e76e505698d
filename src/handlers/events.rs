use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::{json_body, path_params};
use crate::models::{Event, EventPatch, EventState, NewEvent};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

/// An event together with its derived registration state.
#[derive(Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub state: EventState,
    pub remaining: Option<i32>,
}

impl From<Event> for EventView {
    fn from(event: Event) -> Self {
        Self {
            state: event.state(),
            remaining: event.remaining(),
            event,
        }
    }
}

#[derive(Serialize)]
pub struct DeletedEvent {
    pub event_id: Uuid,
    pub deleted_registration_count: u64,
}

pub async fn create_event(
    State(state): State<AppState>,
    body: Result<Json<NewEvent>, JsonRejection>,
) -> Result<Response, AppError> {
    let event = state.catalog.create_event(json_body(body)?).await?;
    Ok(created(EventView::from(event), "Event created", Vec::new()))
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events: Vec<EventView> = state
        .catalog
        .list_events()
        .await?
        .into_iter()
        .map(EventView::from)
        .collect();
    Ok(success(events, "Events retrieved"))
}

pub async fn get_event(
    State(state): State<AppState>,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let event = state.catalog.get_event(path_params(event_id)?).await?;
    Ok(success(EventView::from(event), "Event retrieved"))
}

pub async fn update_event(
    State(state): State<AppState>,
    event_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<EventPatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let event_id = path_params(event_id)?;
    let event = state
        .catalog
        .update_event(event_id, json_body(body)?)
        .await?;
    Ok(success(EventView::from(event), "Event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    event_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let event_id = path_params(event_id)?;
    let deleted_registration_count = state.catalog.delete_event(event_id).await?;
    Ok(success(
        DeletedEvent {
            event_id,
            deleted_registration_count,
        },
        "Event deleted",
    ))
}
