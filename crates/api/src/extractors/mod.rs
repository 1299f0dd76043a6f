//! Custom Axum extractors.

pub mod admin_auth;
pub mod kiosk_auth;

pub use admin_auth::AdminAuth;
pub use kiosk_auth::KioskAuth;
