//! Roster storage contract.
//!
//! Implemented by the Postgres repository and by the in-memory store used for
//! single-node runs and tests.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Graduate, NewGraduate};

/// Storage-level failure.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Invalid roster data: {0}")]
    Validation(String),

    #[error("Roster storage failed: {0}")]
    Storage(String),

    #[error("Roster storage unavailable")]
    Unavailable,
}

/// Result of the pending → present compare-and-set.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkPresentResult {
    /// This call performed the transition.
    CheckedIn(Graduate),
    /// The entry was already present; it is returned unchanged.
    AlreadyPresent(Graduate),
    /// No entry with that id exists (it may have been bulk-deleted).
    NotFound,
}

/// Ordering for full roster listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RosterOrder {
    /// Order of insertion.
    #[default]
    Insertion,
    /// Ascending by student id, as shown in the admin console.
    StudentId,
}

#[async_trait::async_trait]
pub trait RosterStore: Send + Sync {
    /// Returns every entry.
    async fn list(&self, order: RosterOrder) -> Result<Vec<Graduate>, RosterError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Graduate>, RosterError>;

    /// Exact student id match. The first inserted entry wins on duplicates.
    async fn find_by_student_id(&self, student_id: &str) -> Result<Option<Graduate>, RosterError>;

    /// Exact student id OR case-insensitive substring of the full name.
    /// Returns the first match in insertion order.
    async fn search(&self, query: &str) -> Result<Option<Graduate>, RosterError>;

    /// Inserts all rows as pending entries. All or nothing.
    async fn insert_many(&self, rows: Vec<NewGraduate>) -> Result<Vec<Graduate>, RosterError>;

    /// Transitions a pending entry to present at `at`, only if still pending.
    async fn mark_present(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<MarkPresentResult, RosterError>;

    /// Removes every entry and returns how many were removed.
    async fn delete_all(&self) -> Result<u64, RosterError>;

    async fn count(&self) -> Result<i64, RosterError>;
}

/// Mock roster store for unit tests.
///
/// Keeps entries in a vector and yields to the scheduler on every lookup, so
/// concurrent callers interleave the way they would against a real database.
#[derive(Debug, Default)]
pub struct MockRosterStore {
    entries: std::sync::Mutex<Vec<Graduate>>,
    /// Whether to simulate storage failures.
    pub simulate_failure: std::sync::atomic::AtomicBool,
}

impl MockRosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock store seeded with pending entries.
    pub fn with_entries(rows: Vec<NewGraduate>) -> Self {
        let now = Utc::now();
        let entries = rows
            .into_iter()
            .map(|row| Graduate::pending(Uuid::new_v4(), row, now))
            .collect();
        Self {
            entries: std::sync::Mutex::new(entries),
            simulate_failure: Default::default(),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.simulate_failure
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<(), RosterError> {
        if self.simulate_failure.load(std::sync::atomic::Ordering::SeqCst) {
            tracing::warn!("Mock roster store simulating failure");
            return Err(RosterError::Storage("Simulated failure".to_string()));
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<Graduate> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl RosterStore for MockRosterStore {
    async fn list(&self, order: RosterOrder) -> Result<Vec<Graduate>, RosterError> {
        self.check_failure()?;
        let mut entries = self.snapshot();
        if order == RosterOrder::StudentId {
            entries.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        }
        Ok(entries)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Graduate>, RosterError> {
        self.check_failure()?;
        Ok(self.snapshot().into_iter().find(|g| g.id == id))
    }

    async fn find_by_student_id(&self, student_id: &str) -> Result<Option<Graduate>, RosterError> {
        tokio::task::yield_now().await;
        self.check_failure()?;
        Ok(self
            .snapshot()
            .into_iter()
            .find(|g| g.student_id == student_id))
    }

    async fn search(&self, query: &str) -> Result<Option<Graduate>, RosterError> {
        self.check_failure()?;
        let needle = query.to_lowercase();
        Ok(self
            .snapshot()
            .into_iter()
            .find(|g| g.student_id == query || g.fullname.to_lowercase().contains(&needle)))
    }

    async fn insert_many(&self, rows: Vec<NewGraduate>) -> Result<Vec<Graduate>, RosterError> {
        self.check_failure()?;
        let now = Utc::now();
        let inserted: Vec<Graduate> = rows
            .into_iter()
            .map(|row| Graduate::pending(Uuid::new_v4(), row, now))
            .collect();
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn mark_present(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<MarkPresentResult, RosterError> {
        tokio::task::yield_now().await;
        self.check_failure()?;
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(entry) = entries.iter_mut().find(|g| g.id == id) else {
            return Ok(MarkPresentResult::NotFound);
        };
        if entry.is_present() {
            return Ok(MarkPresentResult::AlreadyPresent(entry.clone()));
        }
        *entry = entry.checked_in(at);
        Ok(MarkPresentResult::CheckedIn(entry.clone()))
    }

    async fn delete_all(&self) -> Result<u64, RosterError> {
        self.check_failure()?;
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<i64, RosterError> {
        self.check_failure()?;
        Ok(self.snapshot().len() as i64)
    }
}
