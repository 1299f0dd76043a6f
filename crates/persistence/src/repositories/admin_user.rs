//! Admin account repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{AdminAccount, NewAdminAccount};
use domain::services::{AccountError, AdminAccountStore};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::AdminUserEntity;
use crate::metrics::QueryTimer;

fn account_error(e: sqlx::Error) -> AccountError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return AccountError::EmailTaken;
        }
    }
    tracing::error!(error = %e, "Admin account query failed");
    AccountError::Storage(e.to_string())
}

/// Repository for admin accounts and their sessions.
#[derive(Clone)]
pub struct AdminUserRepository {
    pool: PgPool,
}

impl AdminUserRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes sessions that expired before `cutoff`.
    pub async fn purge_expired_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64, AccountError> {
        let timer = QueryTimer::new("purge_expired_admin_sessions");
        let result = sqlx::query("DELETE FROM admin_sessions WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(account_error)?.rows_affected())
    }
}

#[async_trait::async_trait]
impl AdminAccountStore for AdminUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminAccount>, AccountError> {
        let timer = QueryTimer::new("find_admin_by_email");
        let result = sqlx::query_as::<_, AdminUserEntity>(
            r#"
            SELECT id, email, password_hash, display_name, is_active, created_at
            FROM admin_users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(account_error)?.map(AdminAccount::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminAccount>, AccountError> {
        let timer = QueryTimer::new("find_admin_by_id");
        let result = sqlx::query_as::<_, AdminUserEntity>(
            r#"
            SELECT id, email, password_hash, display_name, is_active, created_at
            FROM admin_users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(account_error)?.map(AdminAccount::from))
    }

    async fn create_account(&self, account: NewAdminAccount) -> Result<AdminAccount, AccountError> {
        let timer = QueryTimer::new("create_admin");
        let result = sqlx::query_as::<_, AdminUserEntity>(
            r#"
            INSERT INTO admin_users (email, password_hash, display_name, is_active)
            VALUES ($1, $2, $3, true)
            RETURNING id, email, password_hash, display_name, is_active, created_at
            "#,
        )
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.display_name)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(account_error)?.into())
    }

    async fn count_accounts(&self) -> Result<i64, AccountError> {
        let timer = QueryTimer::new("count_admins");
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM admin_users")
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result.map_err(account_error)
    }

    async fn record_session(
        &self,
        jti: &str,
        admin_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        let timer = QueryTimer::new("create_admin_session");
        let result = sqlx::query(
            r#"
            INSERT INTO admin_sessions (jti, admin_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(jti)
        .bind(admin_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map_err(account_error)?;
        Ok(())
    }

    async fn revoke_session(&self, jti: &str) -> Result<bool, AccountError> {
        let timer = QueryTimer::new("revoke_admin_session");
        let result = sqlx::query(
            r#"
            UPDATE admin_sessions
            SET revoked_at = NOW()
            WHERE jti = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(jti)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(account_error)?.rows_affected() > 0)
    }

    async fn is_session_active(&self, jti: &str) -> Result<bool, AccountError> {
        let timer = QueryTimer::new("is_admin_session_active");
        let result = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM admin_sessions
                WHERE jti = $1 AND revoked_at IS NULL AND expires_at > NOW()
            )
            "#,
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map_err(account_error)
    }
}
