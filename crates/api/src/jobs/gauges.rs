//! Jobs that refresh Prometheus gauges.

use std::sync::Arc;

use domain::services::SnapshotCache;
use sqlx::PgPool;

use super::scheduler::{Job, JobFrequency};

/// Records database connection pool gauges.
pub struct PoolMetricsJob {
    pool: PgPool,
}

impl PoolMetricsJob {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Job for PoolMetricsJob {
    fn name(&self) -> &'static str {
        "pool_metrics"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(10)
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(&self.pool);
        Ok(())
    }
}

/// Records roster size and attendance from the snapshot cache.
pub struct RosterGaugesJob {
    snapshot: Arc<SnapshotCache>,
}

impl RosterGaugesJob {
    pub fn new(snapshot: Arc<SnapshotCache>) -> Self {
        Self { snapshot }
    }
}

#[async_trait::async_trait]
impl Job for RosterGaugesJob {
    fn name(&self) -> &'static str {
        "roster_gauges"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(15)
    }

    async fn execute(&self) -> Result<(), String> {
        let stats = self.snapshot.stats();
        persistence::metrics::record_roster_gauges(stats.total, stats.present_count);
        Ok(())
    }
}
