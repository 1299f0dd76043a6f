//! Admin account storage contract.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AdminAccount, NewAdminAccount};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Account storage failed: {0}")]
    Storage(String),
}

#[async_trait::async_trait]
pub trait AdminAccountStore: Send + Sync {
    /// Looks up an account by normalized (lowercase) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminAccount>, AccountError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminAccount>, AccountError>;

    async fn create_account(&self, account: NewAdminAccount) -> Result<AdminAccount, AccountError>;

    async fn count_accounts(&self) -> Result<i64, AccountError>;

    async fn record_session(
        &self,
        jti: &str,
        admin_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountError>;

    /// Marks a session revoked. Returns false when no active session matched.
    async fn revoke_session(&self, jti: &str) -> Result<bool, AccountError>;

    async fn is_session_active(&self, jti: &str) -> Result<bool, AccountError>;
}
