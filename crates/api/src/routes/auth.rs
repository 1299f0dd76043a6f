//! Admin sign-in routes.

use axum::{extract::State, http::StatusCode, Json};
use domain::models::{LoginRequest, LoginResponse, SessionInfo};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminAuth;

/// POST /api/v1/auth/login
///
/// Exchanges email and password for an admin bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    request.validate()?;
    let response = state.auth.login(&request.email, &request.password).await?;
    Ok(Json(response))
}

/// GET /api/v1/auth/session
pub async fn session(
    State(state): State<AppState>,
    auth: AdminAuth,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = state.auth.session(auth.admin_id, auth.expires_at).await?;
    Ok(Json(info))
}

/// POST /api/v1/auth/logout
///
/// Revokes the presented token. Idempotent.
pub async fn logout(
    State(state): State<AppState>,
    auth: AdminAuth,
) -> Result<StatusCode, ApiError> {
    let revoked = state.auth.logout(&auth.jti).await?;
    info!(admin_id = %auth.admin_id, revoked, "Admin signed out");
    Ok(StatusCode::NO_CONTENT)
}
