//! Creates the first admin account on startup.
//!
//! Runs only while no admin account exists, so removing the bootstrap
//! settings after the first start leaves the account in place.

use domain::models::NewAdminAccount;
use domain::services::{AccountError, AdminAccountStore};
use shared::password::{hash_password, PasswordError};
use shared::validation::normalize_email;
use tracing::{info, warn};

use crate::config::AdminBootstrapConfig;

/// Error types for admin bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Account storage error: {0}")]
    Account(#[from] AccountError),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] PasswordError),
}

/// What the bootstrap step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    NotConfigured,
    AlreadyProvisioned,
    Created,
}

/// Creates the configured admin account when no account exists yet.
pub async fn bootstrap_admin(
    accounts: &dyn AdminAccountStore,
    config: &AdminBootstrapConfig,
) -> Result<BootstrapOutcome, BootstrapError> {
    if config.bootstrap_email.trim().is_empty() {
        return Ok(BootstrapOutcome::NotConfigured);
    }

    if config.bootstrap_password.is_empty() {
        warn!("GC__ADMIN__BOOTSTRAP_EMAIL is set but GC__ADMIN__BOOTSTRAP_PASSWORD is empty - skipping bootstrap");
        return Ok(BootstrapOutcome::NotConfigured);
    }

    if accounts.count_accounts().await? > 0 {
        info!("Admin account already exists - skipping bootstrap");
        return Ok(BootstrapOutcome::AlreadyProvisioned);
    }

    let email = normalize_email(&config.bootstrap_email);
    let account = accounts
        .create_account(NewAdminAccount {
            email: email.clone(),
            password_hash: hash_password(&config.bootstrap_password)?,
            display_name: config.bootstrap_display_name.clone(),
        })
        .await?;

    info!(email = %email, admin_id = %account.id, "Bootstrap admin account created");
    warn!("SECURITY: remove GC__ADMIN__BOOTSTRAP_PASSWORD from configuration after initial setup");

    Ok(BootstrapOutcome::Created)
}
