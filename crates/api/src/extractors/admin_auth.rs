//! Authenticated admin extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::auth::authenticate_admin;

/// Admin identity from a bearer token whose session is still active.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub admin_id: Uuid,
    /// Session (token) id, used to revoke on sign-out.
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Set by `require_admin` on admin routes.
        if let Some(auth) = parts.extensions.get::<AdminAuth>() {
            return Ok(auth.clone());
        }
        authenticate_admin(state, &parts.headers).await
    }
}
