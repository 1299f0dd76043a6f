//! Kiosk check-in state machine.
//!
//! Each kiosk session walks `ready → processing → success|error → ready`.
//! Outcomes clear after a fixed delay; the delay is evaluated lazily against
//! tokio's monotonic clock whenever the session is touched, so no timer task
//! is spawned per attempt.
//!
//! Session state sits behind a `std::sync::Mutex` that is only held for short
//! synchronous sections, never across a store call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use super::announcement::Phrasebook;
use super::roster::{MarkPresentResult, RosterError, RosterStore};
use crate::models::{
    Announcement, CheckInOutcome, CheckInReason, Graduate, IgnoreReason, KioskState, KioskStatus,
    ScanResult, SearchOutcome,
};

/// Delays governing the kiosk state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInTimings {
    /// How long an error outcome stays on screen.
    pub error_delay: Duration,
    /// How long a success outcome stays on screen.
    pub success_delay: Duration,
    /// Quiet period before a manual search runs.
    pub search_debounce: Duration,
    /// Shorter queries are not looked up.
    pub min_search_chars: usize,
}

impl Default for CheckInTimings {
    fn default() -> Self {
        Self {
            error_delay: Duration::from_millis(2000),
            success_delay: Duration::from_millis(5000),
            search_debounce: Duration::from_millis(600),
            min_search_chars: 2,
        }
    }
}

impl CheckInTimings {
    fn delay_for(&self, state: KioskState) -> Duration {
        match state {
            KioskState::Success => self.success_delay,
            _ => self.error_delay,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Ready,
    Processing,
    Showing { state: KioskState, until: Instant },
}

#[derive(Debug)]
struct SessionState {
    phase: Phase,
    last_scanned: Option<String>,
    manual_search: String,
    search_result: Option<Graduate>,
    search_generation: u64,
    last_activity: Instant,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            phase: Phase::Ready,
            last_scanned: None,
            manual_search: String::new(),
            search_result: None,
            search_generation: 0,
            last_activity: now,
        }
    }

    /// Clears an outcome whose display time has passed.
    fn settle(&mut self, now: Instant) {
        if let Phase::Showing { until, .. } = self.phase {
            if now >= until {
                self.phase = Phase::Ready;
            }
        }
    }

    fn state(&self) -> KioskState {
        match self.phase {
            Phase::Ready => KioskState::Ready,
            Phase::Processing => KioskState::Processing,
            Phase::Showing { state, .. } => state,
        }
    }
}

/// One scanner kiosk.
pub struct KioskSession {
    id: Uuid,
    store: Arc<dyn RosterStore>,
    phrasebook: Arc<Phrasebook>,
    timings: CheckInTimings,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for KioskSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KioskSession")
            .field("id", &self.id)
            .field("timings", &self.timings)
            .finish()
    }
}

/// Puts the session into an error outcome if an attempt is dropped mid-flight.
struct ProcessingGuard<'a> {
    session: &'a KioskSession,
    armed: bool,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(kiosk_id = %self.session.id, "Check-in attempt abandoned");
            self.session.show(KioskState::Error);
        }
    }
}

impl KioskSession {
    pub fn new(
        id: Uuid,
        store: Arc<dyn RosterStore>,
        phrasebook: Arc<Phrasebook>,
        timings: CheckInTimings,
    ) -> Self {
        Self {
            id,
            store,
            phrasebook,
            timings,
            state: Mutex::new(SessionState::new(Instant::now())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show(&self, state: KioskState) -> u64 {
        let delay = self.timings.delay_for(state);
        let mut session = self.lock();
        session.phase = Phase::Showing {
            state,
            until: Instant::now() + delay,
        };
        delay.as_millis() as u64
    }

    /// Runs one check-in attempt for a scanned or selected student id.
    pub async fn process_check_in(&self, code: &str) -> ScanResult {
        let code = code.trim();
        {
            let mut session = self.lock();
            let now = Instant::now();
            session.settle(now);
            session.last_activity = now;

            if let Phase::Showing {
                state: KioskState::Success,
                ..
            } = session.phase
            {
                if session.last_scanned.as_deref() == Some(code) {
                    return ScanResult::Ignored {
                        reason: IgnoreReason::DuplicateScan,
                    };
                }
            }
            if !matches!(session.phase, Phase::Ready) {
                return ScanResult::Ignored {
                    reason: IgnoreReason::Busy,
                };
            }

            session.phase = Phase::Processing;
            session.last_scanned = Some(code.to_string());
            session.manual_search.clear();
            session.search_result = None;
            session.search_generation += 1;
        }

        let mut guard = ProcessingGuard {
            session: self,
            armed: true,
        };
        let (reason, graduate, announcement) = self.resolve(code).await;
        guard.armed = false;

        let ready_in_ms = self.show(reason.state());
        ScanResult::Processed(CheckInOutcome {
            state: reason.state(),
            reason,
            graduate,
            announcement,
            ready_in_ms,
        })
    }

    async fn resolve(&self, code: &str) -> (CheckInReason, Option<Graduate>, Announcement) {
        let book = &self.phrasebook;

        let graduate = match self.store.find_by_student_id(code).await {
            Ok(Some(graduate)) => graduate,
            Ok(None) => {
                tracing::info!(kiosk_id = %self.id, student_id = %code, "Check-in code not found");
                return (CheckInReason::NotFound, None, book.not_found());
            }
            Err(e) => return self.failed(code, e),
        };

        if graduate.is_present() {
            return self.already_checked_in(graduate);
        }

        match self.store.mark_present(graduate.id, Utc::now()).await {
            Ok(MarkPresentResult::CheckedIn(updated)) => {
                tracing::info!(
                    kiosk_id = %self.id,
                    student_id = %updated.student_id,
                    "Graduate checked in"
                );
                let announcement = book.success(&updated);
                (CheckInReason::CheckedIn, Some(updated), announcement)
            }
            Ok(MarkPresentResult::AlreadyPresent(current)) => self.already_checked_in(current),
            Ok(MarkPresentResult::NotFound) => {
                tracing::info!(kiosk_id = %self.id, student_id = %code, "Entry removed during check-in");
                (CheckInReason::NotFound, None, book.not_found())
            }
            Err(e) => self.failed(code, e),
        }
    }

    fn already_checked_in(
        &self,
        graduate: Graduate,
    ) -> (CheckInReason, Option<Graduate>, Announcement) {
        tracing::info!(
            kiosk_id = %self.id,
            student_id = %graduate.student_id,
            "Graduate already checked in"
        );
        let announcement = self.phrasebook.already_checked_in(&graduate);
        (CheckInReason::AlreadyCheckedIn, Some(graduate), announcement)
    }

    fn failed(
        &self,
        code: &str,
        error: RosterError,
    ) -> (CheckInReason, Option<Graduate>, Announcement) {
        tracing::error!(kiosk_id = %self.id, student_id = %code, error = %error, "Check-in failed");
        (CheckInReason::Failed, None, self.phrasebook.failure())
    }

    /// Debounced manual lookup by student id or name.
    ///
    /// A newer search, or any accepted check-in attempt, supersedes a search
    /// still waiting out its debounce period.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, RosterError> {
        let query = query.trim().to_string();
        let generation = {
            let mut session = self.lock();
            session.last_activity = Instant::now();
            session.manual_search = query.clone();
            session.search_result = None;
            session.search_generation += 1;
            session.search_generation
        };

        if query.chars().count() < self.timings.min_search_chars {
            return Ok(SearchOutcome::TooShort);
        }

        tokio::time::sleep(self.timings.search_debounce).await;
        let superseded = self.lock().search_generation != generation;
        if superseded {
            return Ok(SearchOutcome::Superseded);
        }

        let found = self.store.search(&query).await?;

        let mut session = self.lock();
        if session.search_generation != generation {
            return Ok(SearchOutcome::Superseded);
        }
        session.search_result = found.clone();
        Ok(match found {
            Some(graduate) => SearchOutcome::Found(graduate),
            None => SearchOutcome::NoMatch,
        })
    }

    pub fn status(&self) -> KioskStatus {
        let mut session = self.lock();
        let now = Instant::now();
        session.settle(now);

        let ready_in_ms = match session.phase {
            Phase::Showing { until, .. } => Some(until.saturating_duration_since(now).as_millis() as u64),
            _ => None,
        };

        KioskStatus {
            kiosk_id: self.id,
            state: session.state(),
            last_scanned: session.last_scanned.clone(),
            manual_search: session.manual_search.clone(),
            search_result: session.search_result.clone(),
            ready_in_ms,
        }
    }

    /// Voice test phrase for this kiosk.
    pub fn test_announcement(&self) -> Announcement {
        self.phrasebook.ready()
    }

    fn idle_for(&self, now: Instant) -> Option<Duration> {
        let session = self.lock();
        if matches!(session.phase, Phase::Processing) {
            return None;
        }
        Some(now.saturating_duration_since(session.last_activity))
    }
}

/// Open kiosk sessions keyed by kiosk id.
pub struct KioskRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<KioskSession>>>,
    store: Arc<dyn RosterStore>,
    phrasebook: Arc<Phrasebook>,
    timings: CheckInTimings,
}

impl std::fmt::Debug for KioskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KioskRegistry")
            .field("sessions", &self.len())
            .field("timings", &self.timings)
            .finish()
    }
}

impl KioskRegistry {
    pub fn new(
        store: Arc<dyn RosterStore>,
        phrasebook: Arc<Phrasebook>,
        timings: CheckInTimings,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            phrasebook,
            timings,
        }
    }

    /// Opens a session under a new kiosk id.
    pub fn open(&self) -> Arc<KioskSession> {
        self.get_or_insert(Uuid::new_v4())
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<KioskSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Returns the session for `id`, creating it in the ready state if absent.
    /// Sessions are never recreated for an existing token: a locked or
    /// evicted kiosk has to unlock again.
    fn get_or_insert(&self, id: Uuid) -> Arc<KioskSession> {
        if let Some(session) = self.get(id) {
            return session;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(kiosk_id = %id, "Kiosk session opened");
                Arc::new(KioskSession::new(
                    id,
                    self.store.clone(),
                    self.phrasebook.clone(),
                    self.timings,
                ))
            })
            .clone()
    }

    pub fn close(&self, id: Uuid) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(kiosk_id = %id, "Kiosk session closed");
        }
        removed
    }

    /// Drops sessions idle for longer than `max_idle`. Sessions in the middle
    /// of an attempt are kept.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| match session.idle_for(now) {
            Some(idle) => idle <= max_idle,
            None => true,
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewGraduate;
    use crate::services::roster::{MockRosterStore, RosterOrder};
    use std::future::Future;

    fn row(student_id: &str, fullname: &str, faculty: &str, degree: Option<&str>) -> NewGraduate {
        NewGraduate {
            student_id: student_id.to_string(),
            fullname: fullname.to_string(),
            faculty: faculty.to_string(),
            degree: degree.map(str::to_string),
        }
    }

    fn seeded_store() -> Arc<MockRosterStore> {
        Arc::new(MockRosterStore::with_entries(vec![
            row("6401", "สมชาย ใจดี", "วิศวกรรมศาสตร์", Some("ปริญญาตรี")),
            row("6402", "Jane Doe", "", None),
        ]))
    }

    fn session(store: Arc<MockRosterStore>) -> KioskSession {
        KioskSession::new(
            Uuid::new_v4(),
            store,
            Arc::new(Phrasebook::default()),
            CheckInTimings::default(),
        )
    }

    fn outcome(result: ScanResult) -> CheckInOutcome {
        match result {
            ScanResult::Processed(outcome) => outcome,
            other => panic!("Expected processed outcome, got {:?}", other),
        }
    }

    async fn entry(store: &MockRosterStore, student_id: &str) -> Graduate {
        store
            .find_by_student_id(student_id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_check_in() {
        let store = seeded_store();
        let kiosk = session(store.clone());
        let issued_at = Utc::now();

        let result = outcome(kiosk.process_check_in("6401").await);
        assert_eq!(result.state, KioskState::Success);
        assert_eq!(result.reason, CheckInReason::CheckedIn);
        assert_eq!(result.ready_in_ms, 5000);
        assert_eq!(
            result.announcement.text,
            "ปริญญาตรี คณะวิศวกรรมศาสตร์ สมชาย ใจดี"
        );

        let stored = entry(&store, "6401").await;
        assert!(stored.is_present());
        assert!(stored.check_in_at.unwrap() >= issued_at);
        assert_eq!(kiosk.status().state, KioskState::Success);
        assert_eq!(kiosk.status().last_scanned.as_deref(), Some("6401"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_code_errors_then_resets() {
        let store = seeded_store();
        let kiosk = session(store.clone());
        assert_eq!(kiosk.status().state, KioskState::Ready);

        let result = outcome(kiosk.process_check_in("9999").await);
        assert_eq!(result.state, KioskState::Error);
        assert_eq!(result.reason, CheckInReason::NotFound);
        assert_eq!(result.announcement.text, "ไม่พบรายชื่อในระบบครับ");
        assert_eq!(result.ready_in_ms, 2000);
        assert_eq!(kiosk.status().state, KioskState::Error);

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert_eq!(kiosk.status().state, KioskState::Error);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(kiosk.status().state, KioskState::Ready);

        let roster = store.list(RosterOrder::Insertion).await.unwrap();
        assert!(roster.iter().all(|g| !g.is_present()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_check_in_reports_already_present() {
        let store = seeded_store();
        let kiosk = session(store.clone());

        outcome(kiosk.process_check_in("6402").await);
        let first_at = entry(&store, "6402").await.check_in_at;

        tokio::time::advance(Duration::from_secs(5)).await;
        let result = outcome(kiosk.process_check_in("6402").await);
        assert_eq!(result.state, KioskState::Error);
        assert_eq!(result.reason, CheckInReason::AlreadyCheckedIn);
        assert_eq!(
            result.announcement.text,
            "บัณฑิต Jane Doe รายงานตัวแล้วครับ"
        );
        assert_eq!(entry(&store, "6402").await.check_in_at, first_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guards_while_outcome_is_shown() {
        let kiosk = session(seeded_store());

        outcome(kiosk.process_check_in("6401").await);

        let repeat = kiosk.process_check_in("6401").await;
        assert!(matches!(
            repeat,
            ScanResult::Ignored {
                reason: IgnoreReason::DuplicateScan
            }
        ));

        let other = kiosk.process_check_in("6402").await;
        assert!(matches!(
            other,
            ScanResult::Ignored {
                reason: IgnoreReason::Busy
            }
        ));

        tokio::time::advance(Duration::from_secs(5)).await;
        let next = outcome(kiosk.process_check_in("6402").await);
        assert_eq!(next.reason, CheckInReason::CheckedIn);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_yields_generic_error() {
        let store = seeded_store();
        store.set_failing(true);
        let kiosk = session(store);

        let result = outcome(kiosk.process_check_in("6401").await);
        assert_eq!(result.reason, CheckInReason::Failed);
        assert_eq!(result.announcement.text, "เกิดข้อผิดพลาดในการบันทึกครับ");
        assert_eq!(result.ready_in_ms, 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_kiosks_racing_on_one_code() {
        let store = seeded_store();
        let a = session(store.clone());
        let b = session(store.clone());

        let (first, second) = tokio::join!(a.process_check_in("6401"), b.process_check_in("6401"));
        let reasons = [outcome(first).reason, outcome(second).reason];

        assert_eq!(
            reasons.iter().filter(|r| **r == CheckInReason::CheckedIn).count(),
            1
        );
        assert!(reasons.contains(&CheckInReason::AlreadyCheckedIn));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_attempt_clears_manual_search() {
        let kiosk = session(seeded_store());

        assert!(matches!(
            kiosk.search("Jane").await.unwrap(),
            SearchOutcome::Found(_)
        ));
        assert!(kiosk.status().search_result.is_some());

        outcome(kiosk.process_check_in("6402").await);
        let status = kiosk.status();
        assert!(status.manual_search.is_empty());
        assert!(status.search_result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_too_short() {
        let kiosk = session(seeded_store());
        assert!(matches!(
            kiosk.search(" J ").await.unwrap(),
            SearchOutcome::TooShort
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_search_supersedes_pending_one() {
        let kiosk = Arc::new(session(seeded_store()));

        let first = tokio::spawn({
            let kiosk = kiosk.clone();
            async move { kiosk.search("สมชาย").await }
        });
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(300)).await;

        let second = kiosk.search("Jane").await.unwrap();
        assert!(matches!(first.await.unwrap().unwrap(), SearchOutcome::Superseded));
        match second {
            SearchOutcome::Found(g) => assert_eq!(g.student_id, "6402"),
            other => panic!("Expected Found, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_no_match() {
        let kiosk = session(seeded_store());
        assert!(matches!(
            kiosk.search("nobody").await.unwrap(),
            SearchOutcome::NoMatch
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_evicts_idle_sessions() {
        let store = seeded_store();
        let registry = KioskRegistry::new(
            store,
            Arc::new(Phrasebook::default()),
            CheckInTimings::default(),
        );

        let idle = registry.open();
        tokio::time::advance(Duration::from_secs(60)).await;
        let active = registry.open();
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.evict_idle(Duration::from_secs(30)), 1);
        assert!(registry.get(idle.id()).is_none());
        assert!(registry.get(active.id()).is_some());
    }

    #[tokio::test]
    async fn test_registry_open_get_close() {
        let registry = KioskRegistry::new(
            seeded_store(),
            Arc::new(Phrasebook::default()),
            CheckInTimings::default(),
        );
        let first = registry.open();
        let second = registry.open();
        assert_ne!(first.id(), second.id());
        assert!(Arc::ptr_eq(&first, &registry.get(first.id()).unwrap()));

        let id = first.id();
        assert!(Arc::ptr_eq(&first, &registry.get_or_insert(id)));
        assert_eq!(registry.len(), 2);

        assert!(registry.close(id));
        assert!(!registry.close(id));
        assert!(registry.get(id).is_none());
        assert!(registry.close(second.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_attempt_does_not_wedge_kiosk() {
        let kiosk = session(seeded_store());

        {
            let attempt = kiosk.process_check_in("6401");
            tokio::pin!(attempt);
            // One poll reaches the store lookup, which yields.
            assert!(futures_poll_once(attempt.as_mut()).await.is_none());
        }

        assert_eq!(kiosk.status().state, KioskState::Error);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(kiosk.status().state, KioskState::Ready);
    }

    async fn futures_poll_once<F: Future + Unpin>(fut: F) -> Option<F::Output> {
        let mut fut = fut;
        std::future::poll_fn(|cx| {
            std::task::Poll::Ready(match std::pin::Pin::new(&mut fut).poll(cx) {
                std::task::Poll::Ready(out) => Some(out),
                std::task::Poll::Pending => None,
            })
        })
        .await
    }
}
