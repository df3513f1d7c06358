use crate::{AppState, handlers::{AuthUser, error_to_response}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use spares::{projector, scheduler::SchedulerParams, store};
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize)]
pub struct ReprojectRequest {
    pub card_id: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReprojectResponse {
    pub card_id: i64,
    pub algorithm_version: String,
}

pub async fn reproject_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ReprojectRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<spares::schema::ErrorResponse>)> {
    store::assert_admin(&state.db, user_id).await.map_err(error_to_response)?;
    let card = store::get_card(&state.db, body.card_id).await.map_err(error_to_response)?;
    let deck = store::deck_for_card(&state.db, card.id).await.map_err(error_to_response)?;
    let params = SchedulerParams::for_deck(&deck, &state.config.algorithm_version).map_err(error_to_response)?;
    let state_after = projector::reproject(&state.db, card.id, &params)
        .await
        .map_err(error_to_response)?;
    Ok(Json(ReprojectResponse {
        card_id: card.id,
        algorithm_version: state_after.algorithm_version,
    }))
}

#[derive(Clone, Debug, Serialize)]
pub struct OrphansResponse {
    pub referenced_blob_keys: Vec<String>,
}

pub async fn orphans_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, (StatusCode, Json<spares::schema::ErrorResponse>)> {
    store::assert_admin(&state.db, user_id).await.map_err(error_to_response)?;
    let referenced_blob_keys = store::list_referenced_blob_keys(&state.db)
        .await
        .map_err(error_to_response)?;
    Ok(Json(OrphansResponse { referenced_blob_keys }))
}
