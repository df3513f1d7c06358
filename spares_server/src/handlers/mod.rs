use crate::AppState;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
};
use spares::{Error, ErrorKind, model::UserId, schema::ErrorResponse, store};
use std::sync::Arc;

pub mod admin;
pub mod relationships;
pub mod reviews;
pub mod sessions;
pub mod study;

pub fn error_to_response(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e.kind() {
        ErrorKind::InvalidArgument | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

/// Authenticated user, resolved from the bearer token or cookie carrying
/// a session id. Every authenticated route accepts either form.
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        let from_cookie = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| {
                cookies.split(';').find_map(|pair| {
                    let (name, value) = pair.trim().split_once('=')?;
                    (name == "session_id").then(|| value.to_string())
                })
            });
        let session_id = from_header
            .or(from_cookie)
            .ok_or_else(|| error_to_response(Error::Unauthenticated))?;
        let session = store::get_valid_session(&state.db, &session_id)
            .await
            .map_err(error_to_response)?;
        Ok(AuthUser(session.user_id))
    }
}

pub async fn health_check_handler() -> impl IntoResponse {
    Json(spares::schema::HealthResponse { status: "ok" })
}
