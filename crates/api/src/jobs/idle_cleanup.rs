//! Evicts idle kiosk sessions and stale rate-limit buckets.

use std::sync::Arc;
use std::time::Duration;

use domain::services::KioskRegistry;
use tracing::info;

use super::scheduler::{Job, JobFrequency};
use crate::middleware::RateLimiterState;

pub struct IdleCleanupJob {
    kiosks: Arc<KioskRegistry>,
    max_idle: Duration,
    limiters: Vec<Arc<RateLimiterState>>,
}

impl IdleCleanupJob {
    pub fn new(
        kiosks: Arc<KioskRegistry>,
        max_idle: Duration,
        limiters: Vec<Arc<RateLimiterState>>,
    ) -> Self {
        Self {
            kiosks,
            max_idle,
            limiters,
        }
    }
}

#[async_trait::async_trait]
impl Job for IdleCleanupJob {
    fn name(&self) -> &'static str {
        "idle_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(1)
    }

    async fn execute(&self) -> Result<(), String> {
        let evicted = self.kiosks.evict_idle(self.max_idle);
        if evicted > 0 {
            info!(evicted, remaining = self.kiosks.len(), "Evicted idle kiosk sessions");
        }

        let pruned: usize = self.limiters.iter().map(|l| l.prune()).sum();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned idle rate-limit buckets");
        }
        Ok(())
    }
}
