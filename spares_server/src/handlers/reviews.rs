use crate::{AppState, handlers::{AuthUser, error_to_response}};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use spares::{event_log, schema};
use std::sync::Arc;

pub async fn append_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<schema::AppendReviewsRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let events: Vec<event_log::NewReviewEvent> = body.events.into_iter().map(Into::into).collect();
    let result = event_log::append_batch(&state.db, user_id, &events)
        .await
        .map_err(error_to_response)?;
    Ok(Json(schema::AppendReviewsResponse::from(result)))
}

pub async fn events_since_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<schema::EventsSinceQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let page = event_log::events_since(&state.db, user_id, query.since, query.limit)
        .await
        .map_err(error_to_response)?;
    Ok(Json(schema::EventsSinceResponse::from(page)))
}

pub async fn card_events_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(card_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let events = event_log::events_for_card(&state.db, card_id, user_id)
        .await
        .map_err(error_to_response)?;
    Ok(Json(events))
}
