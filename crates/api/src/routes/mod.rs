//! HTTP route handlers.

use std::time::Duration;

use axum::response::sse::KeepAlive;

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod kiosk;

/// Comment-line interval that keeps idle event streams open through proxies.
pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(30);

pub(crate) fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(SSE_KEEP_ALIVE).text("keepalive")
}
