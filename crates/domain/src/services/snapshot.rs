//! Versioned in-process copy of the roster.
//!
//! The cache applies change events as deltas and falls back to a full refetch
//! when an event cannot be applied. Statistics are always projected from the
//! cached snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::change_feed::{ChangeEvent, ChangeFeed, ChangeKind, EventFilter, FeedError};
use super::roster::{RosterError, RosterOrder, RosterStore};
use crate::models::{Graduate, RosterStats};

/// Whether an event could be applied to the snapshot in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    NeedsRefresh,
}

/// Roster entries in insertion order, with a version bumped on every change.
#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
    version: u64,
    entries: Vec<Graduate>,
}

impl RosterSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[Graduate] {
        &self.entries
    }

    /// Replaces the contents with a freshly fetched roster.
    pub fn replace(&mut self, entries: Vec<Graduate>) {
        self.entries = entries;
        self.version += 1;
    }

    /// Applies one event in place.
    pub fn apply(&mut self, event: &ChangeEvent) -> ApplyOutcome {
        let Some(record) = event.record.as_ref() else {
            return ApplyOutcome::NeedsRefresh;
        };

        let position = self.entries.iter().position(|g| g.id == record.id);
        match (event.kind, position) {
            (ChangeKind::Insert, None) => self.entries.push(record.clone()),
            (ChangeKind::Insert | ChangeKind::Update, Some(idx)) => {
                // A stale pending image must not undo a check-in.
                if self.entries[idx].is_present() && !record.is_present() {
                    return ApplyOutcome::Applied;
                }
                self.entries[idx] = record.clone();
            }
            // Missed the insert for this row.
            (ChangeKind::Update, None) => return ApplyOutcome::NeedsRefresh,
            (ChangeKind::Delete, Some(idx)) => {
                self.entries.remove(idx);
            }
            (ChangeKind::Delete, None) => return ApplyOutcome::Applied,
        }

        self.version += 1;
        ApplyOutcome::Applied
    }
}

/// Shared roster snapshot kept current from the change feed.
pub struct SnapshotCache {
    store: Arc<dyn RosterStore>,
    snapshot: RwLock<RosterSnapshot>,
    versions: watch::Sender<u64>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("version", &self.version())
            .finish()
    }
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn RosterStore>) -> Self {
        let (versions, _) = watch::channel(0);
        Self {
            store,
            snapshot: RwLock::new(RosterSnapshot::default()),
            versions,
        }
    }

    pub fn version(&self) -> u64 {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version()
    }

    /// Refetches the whole roster from the store.
    pub async fn refresh(&self) -> Result<u64, RosterError> {
        let entries = self.store.list(RosterOrder::Insertion).await?;
        let version = {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            snapshot.replace(entries);
            snapshot.version()
        };
        tracing::debug!(version, "Roster snapshot refreshed");
        self.versions.send_replace(version);
        Ok(version)
    }

    /// Applies one change event, refetching when it cannot be applied in place.
    pub async fn apply(&self, event: &ChangeEvent) -> Result<u64, RosterError> {
        let (outcome, version) = {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            let before = snapshot.version();
            let outcome = snapshot.apply(event);
            (outcome, (snapshot.version() != before).then(|| snapshot.version()))
        };

        match outcome {
            ApplyOutcome::Applied => {
                if let Some(version) = version {
                    self.versions.send_replace(version);
                }
                Ok(self.version())
            }
            ApplyOutcome::NeedsRefresh => self.refresh().await,
        }
    }

    /// Statistics over the current snapshot.
    pub fn stats(&self) -> RosterStats {
        let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        RosterStats::from_roster(snapshot.entries())
    }

    /// Copy of the current entries in insertion order.
    pub fn entries(&self) -> Vec<Graduate> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
            .to_vec()
    }

    /// Receiver notified with the new version after every change.
    pub fn subscribe_versions(&self) -> watch::Receiver<u64> {
        self.versions.subscribe()
    }

    /// Keeps the cache current from the change feed until `shutdown` flips.
    ///
    /// The subscription is opened before the task starts so no event
    /// published after this call is missed.
    pub fn spawn_maintainer(
        self: Arc<Self>,
        feed: &ChangeFeed,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut subscription = feed.subscribe("snapshot", EventFilter::All);

        tokio::spawn(async move {
            tracing::info!("Snapshot maintainer started");
            loop {
                tokio::select! {
                    received = subscription.recv() => {
                        let result = match received {
                            Ok(event) => self.apply(&event).await,
                            Err(FeedError::Lagged(_)) => self.refresh().await,
                            Err(FeedError::Closed) => break,
                        };
                        if let Err(e) = result {
                            tracing::error!(error = %e, "Failed to update roster snapshot");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Snapshot maintainer stopped");
        })
    }
}
