//! Bearer-token authentication for admin and kiosk routes.
//!
//! Both surfaces use signed tokens from `shared::jwt`. Admin tokens are also
//! checked against the recorded session so sign-out takes effect at once.
//! Kiosk tokens must name a kiosk session that is still open.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use shared::jwt::{extract_subject, Claims, TokenType};
use tracing::warn;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{AdminAuth, KioskAuth};

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn validate_claims(
    state: &AppState,
    headers: &HeaderMap,
    expected: TokenType,
) -> Result<Claims, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| {
        ApiError::Unauthorized("Missing or invalid Authorization header".into())
    })?;

    let claims = state.jwt.validate_token(token).map_err(|e| {
        warn!(error = %e, expected = ?expected, "Bearer token rejected");
        ApiError::Unauthorized("Invalid or expired token".into())
    })?;

    if claims.token_type != expected {
        warn!(presented = ?claims.token_type, expected = ?expected, "Token used on the wrong surface");
        return Err(match expected {
            TokenType::Admin => ApiError::Forbidden("Admin access required".into()),
            TokenType::Kiosk => ApiError::Forbidden("Kiosk token required".into()),
        });
    }

    Ok(claims)
}

/// Validates an admin token and its session.
pub async fn authenticate_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AdminAuth, ApiError> {
    let claims = validate_claims(state, headers, TokenType::Admin)?;
    let admin_id = extract_subject(&claims)?;

    if !state.accounts.is_session_active(&claims.jti).await? {
        warn!(admin_id = %admin_id, "Admin token for an ended session");
        return Err(ApiError::Unauthorized("Session has ended".into()));
    }

    Ok(AdminAuth {
        admin_id,
        expires_at: DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now),
        jti: claims.jti,
    })
}

/// Validates a kiosk token and resolves its open session.
pub fn authenticate_kiosk(state: &AppState, headers: &HeaderMap) -> Result<KioskAuth, ApiError> {
    let claims = validate_claims(state, headers, TokenType::Kiosk)?;
    let kiosk_id = extract_subject(&claims)?;

    let session = state.kiosks.get(kiosk_id).ok_or_else(|| {
        warn!(kiosk_id = %kiosk_id, "Kiosk token for a closed session");
        ApiError::Unauthorized("Kiosk is locked".into())
    })?;

    Ok(KioskAuth { kiosk_id, session })
}

/// Rejects requests without an active admin session.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let authenticated = authenticate_admin(&state, req.headers()).await;
    match authenticated {
        Ok(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

/// Rejects requests without an unlocked kiosk.
pub async fn require_kiosk(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let authenticated = authenticate_kiosk(&state, req.headers());
    match authenticated {
        Ok(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
