//! Scanner kiosk routes.
//!
//! `unlock` trades the configured passcode for a kiosk token bound to a new
//! kiosk session. Everything else runs against that session.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{Announcement, KioskState, KioskStatus, ScanResult, SearchOutcome};
use serde::{Deserialize, Serialize};
use shared::validation::validate_not_blank;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::KioskAuth;
use crate::middleware::metrics::{record_scan, record_unlock};

/// Request to unlock a kiosk.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    #[validate(length(min = 1, max = 64, message = "Passcode is required"))]
    pub passcode: String,
}

/// Kiosk token issued on unlock.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub kiosk_id: Uuid,
    pub status: KioskStatus,
}

/// Scanned QR payload or a student id picked from search.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[validate(custom(function = "validate_not_blank"))]
    #[validate(length(max = 64, message = "Code must be at most 64 characters"))]
    pub code: String,
}

/// Query parameters for manual search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// POST /api/v1/kiosk/unlock
pub async fn unlock(
    State(state): State<AppState>,
    Json(request): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    request.validate()?;

    let admitted = state.auth.admit_kiosk(&request.passcode).await;
    record_unlock(admitted.is_ok());
    admitted?;

    let session = state.kiosks.open();
    let issued = match state.auth.kiosk_token(session.id()) {
        Ok(issued) => issued,
        Err(e) => {
            state.kiosks.close(session.id());
            return Err(e.into());
        }
    };

    info!(kiosk_id = %session.id(), "Kiosk unlocked");

    Ok(Json(UnlockResponse {
        access_token: issued.token,
        token_type: "Bearer",
        expires_in: issued.expires_in,
        kiosk_id: session.id(),
        status: session.status(),
    }))
}

/// POST /api/v1/kiosk/lock
///
/// Ends the kiosk session. The kiosk token stops working immediately.
pub async fn lock(State(state): State<AppState>, auth: KioskAuth) -> StatusCode {
    if state.kiosks.close(auth.kiosk_id) {
        info!(kiosk_id = %auth.kiosk_id, "Kiosk locked");
    }
    StatusCode::NO_CONTENT
}

/// GET /api/v1/kiosk/status
pub async fn status(auth: KioskAuth) -> Json<KioskStatus> {
    Json(auth.session.status())
}

/// POST /api/v1/kiosk/scan
///
/// Always 200 for a well-formed request; lookup failures are reported as an
/// `error` outcome so the kiosk can speak them.
pub async fn scan(
    auth: KioskAuth,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResult>, ApiError> {
    request.validate()?;
    let result = auth.session.process_check_in(&request.code).await;
    record_scan(&result);

    if let Some(outcome) = result.outcome() {
        if outcome.state == KioskState::Error {
            tracing::debug!(kiosk_id = %auth.kiosk_id, reason = outcome.reason.as_str(), "Scan rejected");
        }
    }

    Ok(Json(result))
}

/// GET /api/v1/kiosk/search?q=
pub async fn search(
    auth: KioskAuth,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let outcome = auth.session.search(&query.q).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/kiosk/announcements/test
pub async fn test_announcement(auth: KioskAuth) -> Json<Announcement> {
    Json(auth.session.test_announcement())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_request_validation() {
        let ok = UnlockRequest {
            passcode: "2468".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty = UnlockRequest {
            passcode: String::new(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_scan_request_validation() {
        let ok = ScanRequest {
            code: "6401001".to_string(),
        };
        assert!(ok.validate().is_ok());

        let blank = ScanRequest {
            code: "   ".to_string(),
        };
        assert!(blank.validate().is_err());

        let long = ScanRequest {
            code: "9".repeat(65),
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_search_query_defaults_to_empty() {
        let query: SearchQuery = serde_json::from_str("{}").unwrap();
        assert!(query.q.is_empty());
    }
}
