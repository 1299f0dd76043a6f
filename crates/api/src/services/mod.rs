//! Application services used by the route handlers.

pub mod admin_bootstrap;
pub mod auth;

pub use admin_bootstrap::{bootstrap_admin, BootstrapError, BootstrapOutcome};
pub use auth::{AuthError, AuthService};
