//! Background job scheduler and job implementations.

mod gauges;
mod idle_cleanup;
mod scheduler;
mod session_cleanup;

pub use gauges::{PoolMetricsJob, RosterGaugesJob};
pub use idle_cleanup::IdleCleanupJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
pub use session_cleanup::SessionCleanupJob;
