//! Admin sign-in and kiosk admission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::models::{AdminAccount, LoginResponse, SessionInfo};
use domain::services::{AccountError, AdminAccountStore};
use shared::jwt::{IssuedToken, JwtConfig, JwtError};
use shared::password::{verify_passcode, verify_password, PasswordError};
use shared::validation::normalize_email;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid passcode")]
    InvalidPasscode,

    #[error("Account no longer exists")]
    UnknownAccount,

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] JwtError),

    #[error("Credential check was interrupted")]
    Interrupted,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::AccountDisabled
            | AuthError::InvalidPasscode
            | AuthError::UnknownAccount => ApiError::Unauthorized(err.to_string()),
            AuthError::Account(e) => e.into(),
            AuthError::Password(e) => e.into(),
            AuthError::Token(e) => e.into(),
            AuthError::Interrupted => ApiError::Internal(err.to_string()),
        }
    }
}

/// Runs an Argon2 verification off the async executor.
async fn verify_blocking<F>(check: F) -> Result<bool, AuthError>
where
    F: FnOnce() -> Result<bool, PasswordError> + Send + 'static,
{
    tokio::task::spawn_blocking(check)
        .await
        .map_err(|_| AuthError::Interrupted)?
        .map_err(AuthError::from)
}

/// Issues admin sessions and kiosk admissions.
pub struct AuthService {
    accounts: Arc<dyn AdminAccountStore>,
    jwt: Arc<JwtConfig>,
    kiosk_passcode: Arc<str>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("jwt", &self.jwt)
            .field("kiosk_passcode", &"[REDACTED]")
            .finish()
    }
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AdminAccountStore>,
        jwt: Arc<JwtConfig>,
        kiosk_passcode: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            accounts,
            jwt,
            kiosk_passcode: kiosk_passcode.into(),
        }
    }

    /// Checks email and password, then issues and records an admin session.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let email = normalize_email(email);
        let Some(account) = self.accounts.find_by_email(&email).await? else {
            warn!(email = %email, "Sign-in for unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        let candidate = password.to_string();
        let hash = account.password_hash.clone();
        if !verify_blocking(move || verify_password(&candidate, &hash)).await? {
            warn!(admin_id = %account.id, "Sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_active {
            warn!(admin_id = %account.id, "Sign-in to disabled account");
            return Err(AuthError::AccountDisabled);
        }

        let issued = self.issue_admin_session(&account).await?;
        info!(admin_id = %account.id, "Admin signed in");

        Ok(LoginResponse {
            access_token: issued.token,
            token_type: "Bearer",
            expires_in: issued.expires_in,
            admin: account,
        })
    }

    async fn issue_admin_session(&self, account: &AdminAccount) -> Result<IssuedToken, AuthError> {
        let issued = self.jwt.generate_admin_token(account.id)?;
        self.accounts
            .record_session(&issued.jti, account.id, issued.expires_at)
            .await?;
        Ok(issued)
    }

    /// Current account for a validated admin session.
    pub async fn session(
        &self,
        admin_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionInfo, AuthError> {
        let admin = self
            .accounts
            .find_by_id(admin_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AuthError::UnknownAccount)?;
        Ok(SessionInfo { admin, expires_at })
    }

    /// Revokes the session; later requests with the same token are rejected.
    pub async fn logout(&self, jti: &str) -> Result<bool, AuthError> {
        let revoked = self.accounts.revoke_session(jti).await?;
        if revoked {
            info!(jti = %jti, "Admin session revoked");
        }
        Ok(revoked)
    }

    /// Checks a kiosk passcode against the configured one.
    pub async fn admit_kiosk(&self, passcode: &str) -> Result<(), AuthError> {
        let candidate = passcode.to_string();
        let configured = self.kiosk_passcode.clone();
        if verify_blocking(move || verify_passcode(&candidate, &configured)).await? {
            Ok(())
        } else {
            warn!("Kiosk unlock with wrong passcode");
            Err(AuthError::InvalidPasscode)
        }
    }

    /// Signs a kiosk token for an opened kiosk session.
    pub fn kiosk_token(&self, kiosk_id: Uuid) -> Result<IssuedToken, AuthError> {
        Ok(self.jwt.generate_kiosk_token(kiosk_id)?)
    }
}
