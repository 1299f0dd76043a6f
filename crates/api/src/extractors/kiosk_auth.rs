//! Unlocked kiosk extractor.

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::services::KioskSession;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::auth::authenticate_kiosk;

/// Kiosk holding a valid kiosk token and an open session.
#[derive(Debug, Clone)]
pub struct KioskAuth {
    pub kiosk_id: Uuid,
    pub session: Arc<KioskSession>,
}

#[async_trait]
impl FromRequestParts<AppState> for KioskAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<KioskAuth>() {
            return Ok(auth.clone());
        }
        authenticate_kiosk(state, &parts.headers)
    }
}
