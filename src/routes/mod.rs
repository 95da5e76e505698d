use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_request_id_layer};
use crate::handlers::events::{create_event, delete_event, get_event, list_events, update_event};
use crate::handlers::health_check;
use crate::handlers::registrations::{cancel_registration, list_registrations, register};
use crate::state::AppState;

pub fn create_routes(state: AppState, cors_allowed_origins: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/:event_id",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route(
            "/events/:event_id/registrations",
            get(list_registrations).post(register),
        )
        .route(
            "/events/:event_id/registrations/:registration_id",
            axum::routing::delete(cancel_registration),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_request_id_layer())
        .layer(create_cors_layer(cors_allowed_origins))
}
