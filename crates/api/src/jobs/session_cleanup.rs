//! Deletes admin session rows long past expiry.

use chrono::{Duration, Utc};
use persistence::repositories::AdminUserRepository;
use tracing::info;

use super::scheduler::{Job, JobFrequency};

/// Expired sessions are kept this long for audit before deletion.
const SESSION_RETENTION_DAYS: i64 = 7;

pub struct SessionCleanupJob {
    accounts: AdminUserRepository,
}

impl SessionCleanupJob {
    pub fn new(accounts: AdminUserRepository) -> Self {
        Self { accounts }
    }
}

#[async_trait::async_trait]
impl Job for SessionCleanupJob {
    fn name(&self) -> &'static str {
        "session_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        let cutoff = Utc::now() - Duration::days(SESSION_RETENTION_DAYS);
        let purged = self
            .accounts
            .purge_expired_sessions(cutoff)
            .await
            .map_err(|e| e.to_string())?;
        if purged > 0 {
            info!(purged, "Purged expired admin sessions");
        }
        Ok(())
    }
}
