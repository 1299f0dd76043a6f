//! Admin account entity definitions for database queries.

use chrono::{DateTime, Utc};
use domain::models::AdminAccount;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the admin_users table.
#[derive(Debug, Clone, FromRow)]
pub struct AdminUserEntity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AdminUserEntity> for AdminAccount {
    fn from(entity: AdminUserEntity) -> Self {
        Self {
            id: entity.id,
            email: entity.email,
            password_hash: entity.password_hash,
            display_name: entity.display_name,
            is_active: entity.is_active,
            created_at: entity.created_at,
        }
    }
}
