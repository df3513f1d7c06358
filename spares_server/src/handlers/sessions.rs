use crate::{AppState, handlers::error_to_response};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use spares::{relationships, schema, store};
use std::sync::Arc;

/// POST /sessions. Bootstraps (or logs back into) an account and mints a
/// session id; real deployments front this with OAuth, but the core
/// still owns session issuance and the sign-up side effects it gates
/// (auto-bind to the AI tutor, invitation promotion).
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<schema::CreateSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<schema::ErrorResponse>)> {
    let user = store::get_or_create_user_by_email(&state.db, &body.email, &body.display_name)
        .await
        .map_err(error_to_response)?;

    relationships::bind_to_ai_tutor(&state.db, user.id)
        .await
        .map_err(error_to_response)?;
    if let Err(e) = relationships::process_pending_invitations_on_sign_up(&state.db, &user).await {
        log::error!("failed to process pending invitations for user {}: {e}", user.id);
    }

    let session = store::create_session(&state.db, user.id, state.config.session_duration_days)
        .await
        .map_err(error_to_response)?;
    Ok(Json(schema::CreateSessionResponse {
        session_id: session.id,
        user_id: session.user_id,
        expires_at: session.expires_at,
    }))
}
