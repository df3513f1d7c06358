use crate::{
    AppState,
    handlers::{
        admin::{orphans_handler, reproject_handler},
        health_check_handler,
        relationships::{accept_handler, cancel_invitation_handler, remove_handler, request_handler, view_handler},
        reviews::{append_handler, card_events_handler, events_since_handler},
        sessions::create_handler,
        study::{next_card_handler, queue_counts_handler, review_handler},
    },
};
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check_handler))
        .route("/sessions", post(create_handler))
        // Event Log
        .route("/reviews", post(append_handler))
        .route("/reviews", get(events_since_handler))
        .route("/cards/:id/events", get(card_events_handler))
        // Session Selector
        .route("/study/next-card", get(next_card_handler))
        .route("/study/review", post(review_handler))
        .route("/cards/queue-counts", get(queue_counts_handler))
        // Relationship Graph
        .route("/relationships", post(request_handler))
        .route("/relationships", get(view_handler))
        .route("/relationships/:id/accept", post(accept_handler))
        .route("/relationships/:id", delete(remove_handler))
        .route("/invitations/:id", delete(cancel_invitation_handler))
        // Admin
        .route("/admin/reproject", post(reproject_handler))
        .route("/admin/orphans", get(orphans_handler))
        .with_state(app_state)
}
