//! In-memory storage backends.
//!
//! Used for single-node deployments without Postgres and by the API
//! integration tests. The roster store publishes change events itself, since
//! there is no database trigger to do it. Events are published while the
//! write lock is held, so subscribers see them in mutation order.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use domain::models::{AdminAccount, AdminSession, Graduate, NewAdminAccount, NewGraduate};
use domain::services::{
    AccountError, AdminAccountStore, ChangeEvent, ChangeFeed, MarkPresentResult, RosterError,
    RosterOrder, RosterStore,
};
use uuid::Uuid;

/// Roster kept in process memory, in insertion order.
#[derive(Debug)]
pub struct MemoryRosterStore {
    entries: RwLock<Vec<Graduate>>,
    feed: ChangeFeed,
}

impl MemoryRosterStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            feed,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Graduate>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Graduate>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl RosterStore for MemoryRosterStore {
    async fn list(&self, order: RosterOrder) -> Result<Vec<Graduate>, RosterError> {
        let mut entries = self.read().clone();
        if order == RosterOrder::StudentId {
            // stable: duplicates keep insertion order
            entries.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        }
        Ok(entries)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Graduate>, RosterError> {
        Ok(self.read().iter().find(|g| g.id == id).cloned())
    }

    async fn find_by_student_id(&self, student_id: &str) -> Result<Option<Graduate>, RosterError> {
        Ok(self
            .read()
            .iter()
            .find(|g| g.student_id == student_id)
            .cloned())
    }

    async fn search(&self, query: &str) -> Result<Option<Graduate>, RosterError> {
        let needle = query.to_lowercase();
        Ok(self
            .read()
            .iter()
            .find(|g| g.student_id == query || g.fullname.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn insert_many(&self, rows: Vec<NewGraduate>) -> Result<Vec<Graduate>, RosterError> {
        let now = Utc::now();
        let inserted: Vec<Graduate> = rows
            .into_iter()
            .map(|row| Graduate::pending(Uuid::new_v4(), row, now))
            .collect();

        {
            // Publish under the write guard so event order matches mutation order.
            let mut entries = self.write();
            entries.extend(inserted.iter().cloned());
            for graduate in &inserted {
                self.feed.publish(ChangeEvent::inserted(graduate.clone()));
            }
        }
        tracing::info!(count = inserted.len(), "Imported roster batch");
        Ok(inserted)
    }

    async fn mark_present(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<MarkPresentResult, RosterError> {
        let updated = {
            let mut entries = self.write();
            let Some(entry) = entries.iter_mut().find(|g| g.id == id) else {
                return Ok(MarkPresentResult::NotFound);
            };
            if entry.is_present() {
                return Ok(MarkPresentResult::AlreadyPresent(entry.clone()));
            }
            *entry = entry.checked_in(at);
            self.feed.publish(ChangeEvent::updated(entry.clone()));
            entry.clone()
        };

        Ok(MarkPresentResult::CheckedIn(updated))
    }

    async fn delete_all(&self) -> Result<u64, RosterError> {
        let removed = {
            let mut entries = self.write();
            let removed = entries.len() as u64;
            entries.clear();
            self.feed.publish(ChangeEvent::cleared());
            removed
        };

        tracing::warn!(removed, "Roster cleared");
        Ok(removed)
    }

    async fn count(&self) -> Result<i64, RosterError> {
        Ok(self.read().len() as i64)
    }
}

/// Admin accounts and sessions kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<AdminAccount>>,
    sessions: RwLock<HashMap<String, AdminSession>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AdminAccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminAccount>, AccountError> {
        Ok(self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminAccount>, AccountError> {
        Ok(self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn create_account(&self, account: NewAdminAccount) -> Result<AdminAccount, AccountError> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if accounts.iter().any(|a| a.email == account.email) {
            return Err(AccountError::EmailTaken);
        }

        let created = AdminAccount {
            id: Uuid::new_v4(),
            email: account.email,
            password_hash: account.password_hash,
            display_name: account.display_name,
            is_active: true,
            created_at: Utc::now(),
        };
        accounts.push(created.clone());
        Ok(created)
    }

    async fn count_accounts(&self) -> Result<i64, AccountError> {
        Ok(self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as i64)
    }

    async fn record_session(
        &self,
        jti: &str,
        admin_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        // Expired sessions are dropped whenever a new one is recorded.
        let now = Utc::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(
            jti.to_string(),
            AdminSession {
                jti: jti.to_string(),
                admin_id,
                expires_at,
                revoked_at: None,
            },
        );
        Ok(())
    }

    async fn revoke_session(&self, jti: &str) -> Result<bool, AccountError> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(jti) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_session_active(&self, jti: &str) -> Result<bool, AccountError> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(jti)
            .is_some_and(|s| s.is_active_at(Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::services::{ChangeKind, EventFilter, SnapshotCache};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tokio::sync::watch;
    use fake::faker::name::en::Name;
    use fake::Fake;

    fn rows(n: usize) -> Vec<NewGraduate> {
        (0..n)
            .map(|i| NewGraduate {
                student_id: format!("64{:08}", i),
                fullname: Name().fake(),
                faculty: "Science".to_string(),
                degree: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_import_grows_roster() {
        let store = MemoryRosterStore::new(ChangeFeed::default());
        store.insert_many(rows(3)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        let inserted = store.insert_many(rows(4)).await.unwrap();
        assert_eq!(inserted.len(), 4);
        assert!(inserted.iter().all(|g| !g.is_present()));
        assert_eq!(store.count().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_duplicate_student_id_first_insert_wins() {
        let store = MemoryRosterStore::new(ChangeFeed::default());
        let mut batch = rows(1);
        batch.push(NewGraduate {
            fullname: "Second".to_string(),
            ..batch[0].clone()
        });
        let inserted = store.insert_many(batch).await.unwrap();

        let found = store
            .find_by_student_id(&inserted[0].student_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, inserted[0].id);
    }

    #[tokio::test]
    async fn test_list_ordered_by_student_id() {
        let store = MemoryRosterStore::new(ChangeFeed::default());
        let mut batch = rows(3);
        batch.reverse();
        store.insert_many(batch).await.unwrap();

        let listed = store.list(RosterOrder::StudentId).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|g| g.student_id.as_str()).collect();
        assert_eq!(ids, vec!["6400000000", "6400000001", "6400000002"]);

        let insertion = store.list(RosterOrder::Insertion).await.unwrap();
        assert_eq!(insertion[0].student_id, "6400000002");
    }

    #[tokio::test]
    async fn test_search_case_insensitive_name() {
        let store = MemoryRosterStore::new(ChangeFeed::default());
        store
            .insert_many(vec![NewGraduate {
                student_id: "6401".to_string(),
                fullname: "Jane Doe".to_string(),
                faculty: String::new(),
                degree: None,
            }])
            .await
            .unwrap();

        assert!(store.search("jAnE").await.unwrap().is_some());
        assert!(store.search("6401").await.unwrap().is_some());
        assert!(store.search("640").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mutations_publish_changes() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe("test", EventFilter::All);
        let store = MemoryRosterStore::new(feed);

        let inserted = store.insert_many(rows(1)).await.unwrap();
        assert_eq!(sub.recv().await.unwrap().kind, ChangeKind::Insert);

        store.mark_present(inserted[0].id, Utc::now()).await.unwrap();
        let update = sub.recv().await.unwrap();
        assert_eq!(update.kind, ChangeKind::Update);
        assert!(update.record.unwrap().is_present());

        assert_eq!(store.delete_all().await.unwrap(), 1);
        let delete = sub.recv().await.unwrap();
        assert_eq!(delete.kind, ChangeKind::Delete);
        assert!(delete.record.is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_present_only_once() {
        let feed = ChangeFeed::default();
        let store = MemoryRosterStore::new(feed.clone());
        let id = store.insert_many(rows(1)).await.unwrap()[0].id;

        let first_at = Utc::now();
        assert!(matches!(
            store.mark_present(id, first_at).await.unwrap(),
            MarkPresentResult::CheckedIn(_)
        ));

        let mut sub = feed.subscribe("after", EventFilter::All);
        match store
            .mark_present(id, first_at + Duration::seconds(5))
            .await
            .unwrap()
        {
            MarkPresentResult::AlreadyPresent(g) => assert_eq!(g.check_in_at, Some(first_at)),
            other => panic!("Expected AlreadyPresent, got {:?}", other),
        }
        drop(feed);
        drop(store);
        // No update event for the losing attempt.
        assert!(sub.recv().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshot_converges_when_import_races_clear() {
        for _ in 0..20 {
            let feed = ChangeFeed::default();
            let store = Arc::new(MemoryRosterStore::new(feed.clone()));
            let cache = Arc::new(SnapshotCache::new(store.clone()));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let maintainer = cache.clone().spawn_maintainer(&feed, shutdown_rx);

            store.insert_many(rows(50)).await.unwrap();

            let importer = {
                let store = store.clone();
                tokio::spawn(async move { store.insert_many(rows(500)).await })
            };
            let clearer = {
                let store = store.clone();
                tokio::spawn(async move { store.delete_all().await })
            };
            importer.await.unwrap().unwrap();
            clearer.await.unwrap().unwrap();

            let expected = store.count().await.unwrap() as usize;
            tokio::time::timeout(StdDuration::from_secs(5), async {
                while cache.stats().total != expected {
                    tokio::time::sleep(StdDuration::from_millis(5)).await;
                }
            })
            .await
            .expect("snapshot never caught up with the store");

            // Late events must not push it away again.
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            assert_eq!(cache.stats().total, expected);

            shutdown_tx.send(true).unwrap();
            maintainer.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_account_store_sessions() {
        let store = MemoryAccountStore::new();
        let account = store
            .create_account(NewAdminAccount {
                email: "ops@grad.ac.th".to_string(),
                password_hash: "$argon2id$x".to_string(),
                display_name: "Ops".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            store
                .create_account(NewAdminAccount {
                    email: "ops@grad.ac.th".to_string(),
                    password_hash: "$argon2id$y".to_string(),
                    display_name: "Dup".to_string(),
                })
                .await,
            Err(AccountError::EmailTaken)
        ));

        store
            .record_session("jti-1", account.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(store.is_session_active("jti-1").await.unwrap());
        assert!(store.revoke_session("jti-1").await.unwrap());
        assert!(!store.revoke_session("jti-1").await.unwrap());
        assert!(!store.is_session_active("jti-1").await.unwrap());
        assert!(!store.is_session_active("unknown").await.unwrap());
    }
}
