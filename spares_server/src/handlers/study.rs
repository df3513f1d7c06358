use crate::{AppState, handlers::{AuthUser, error_to_response}};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use spares::{
    event_log,
    model::{Queue, Rating},
    projector, schema, scheduler, selector, store,
};
use std::sync::Arc;

pub async fn next_card_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<schema::NextCardQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let result = selector::next_card(
        &state.db,
        user_id,
        query.deck_id,
        &query.exclude_notes,
        query.ignore_daily_limit,
        &state.config.algorithm_version,
    )
    .await
    .map_err(error_to_response)?;
    Ok(Json(schema::NextCardResponse::from(result)))
}

pub async fn queue_counts_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<schema::NextCardQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let counts = selector::counts_only(&state.db, user_id, query.deck_id, &state.config.algorithm_version)
        .await
        .map_err(error_to_response)?;
    Ok(Json(counts))
}

/// POST /study/review, the server-side (non-offline) rating path:
/// computes the next state, records the daily-count side effect when
/// the card was NEW, then appends the event — in that order, so a
/// crash between the two over-reports the count rather than
/// under-reporting it.
pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<schema::ReviewRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let card = store::get_card(&state.db, body.card_id)
        .await
        .map_err(error_to_response)?;
    let deck = store::deck_for_card(&state.db, card.id)
        .await
        .map_err(error_to_response)?;
    if deck.owner_id != user_id {
        return Err(error_to_response(spares::Error::PermissionDenied(
            "user does not own this card".to_string(),
        )));
    }
    let rating = Rating::from_id(body.rating)
        .ok_or_else(|| error_to_response(spares::Error::InvalidArgument(format!("invalid rating {}", body.rating))))?;

    let params = scheduler::SchedulerParams::for_deck(&deck, &state.config.algorithm_version)
        .map_err(error_to_response)?;
    let now = Utc::now();
    let current = projector::get_card_state(&state.db, card.id, &params)
        .await
        .map_err(error_to_response)?;
    let was_new = current.queue == Queue::New;
    let next = scheduler::schedule(&current, rating, now, &params).map_err(error_to_response)?;

    if was_new {
        selector::record_daily_new_card(&state.db, user_id, deck.id, now)
            .await
            .map_err(error_to_response)?;
    }

    let event_id = uuid::Uuid::new_v4().to_string();
    let new_event = event_log::NewReviewEvent {
        id: event_id.clone(),
        card_id: card.id,
        rating: body.rating,
        reviewed_at: now,
        time_spent_ms: body.time_spent_ms,
        user_answer: body.user_answer,
        recording_blob_key: None,
    };
    event_log::append_batch(&state.db, user_id, &[new_event])
        .await
        .map_err(error_to_response)?;

    let applied_interval = schema::IntervalPreviewResponse::from(scheduler::IntervalPreview {
        rating,
        next_review_at: next.due_at,
        interval_label: scheduler::format_interval(next.due_at - now),
    });
    Ok(Json(schema::ReviewResponse { event_id, applied_interval }))
}
