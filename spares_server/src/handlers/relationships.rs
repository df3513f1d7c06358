use crate::{AppState, handlers::{AuthUser, error_to_response}};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use spares::{relationships, schema};
use std::sync::Arc;

pub async fn request_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<schema::RequestRelationshipRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let outcome = relationships::request_relationship(
        &state.db,
        user_id,
        &body.recipient_email,
        body.role,
        state.config.invitation_expiry_days,
    )
    .await
    .map_err(error_to_response)?;
    let response = match outcome {
        relationships::RelationshipRequestOutcome::Relationship(r) => {
            schema::RequestRelationshipResponse::Relationship(r.into())
        }
        relationships::RelationshipRequestOutcome::Invitation(i) => {
            schema::RequestRelationshipResponse::Invitation(i.into())
        }
    };
    Ok(Json(response))
}

pub async fn accept_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(relationship_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let relationship = relationships::accept_relationship(&state.db, relationship_id, user_id)
        .await
        .map_err(error_to_response)?;
    Ok(Json(schema::RelationshipResponse::from(relationship)))
}

pub async fn remove_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(relationship_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let relationship = relationships::remove_relationship(&state.db, relationship_id, user_id)
        .await
        .map_err(error_to_response)?;
    Ok(Json(schema::RelationshipResponse::from(relationship)))
}

pub async fn cancel_invitation_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(invitation_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let invitation = relationships::cancel_invitation(&state.db, invitation_id, user_id)
        .await
        .map_err(error_to_response)?;
    Ok(Json(schema::InvitationResponse::from(invitation)))
}

pub async fn view_handler(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let view = relationships::categorised_view(&state.db, user_id)
        .await
        .map_err(error_to_response)?;
    Ok(Json(schema::RelationshipsViewResponse::from(view)))
}
