//! Forwards Postgres roster notifications into the change feed.
//!
//! Triggers on the graduates table call `pg_notify` with a JSON payload for
//! every inserted or updated row, and once per `DELETE` statement. This task
//! `LISTEN`s on that channel and republishes each payload as a
//! [`ChangeEvent`].

use std::time::Duration;

use domain::services::{ChangeEvent, ChangeFeed};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::entities::GraduateChangeNotification;

/// Notification channel used by the graduates table triggers.
pub const ROSTER_CHANGES_CHANNEL: &str = "graduates_changes";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Parses one notification payload.
pub fn parse_notification(payload: &str) -> Result<ChangeEvent, serde_json::Error> {
    serde_json::from_str::<GraduateChangeNotification>(payload).map(ChangeEvent::from)
}

/// Spawns the listener task. It reconnects after connection failures and
/// stops when `shutdown` flips to true.
///
/// Every successful `LISTEN`, the first one included, is followed by a resync
/// event. Notifications sent before the channel was live are lost, and
/// consumers holding a copy of the roster refetch to cover them.
pub fn spawn_change_listener(
    pool: PgPool,
    feed: ChangeFeed,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let mut listener = match PgListener::connect_with(&pool).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to connect change listener");
                    if wait_or_shutdown(&mut shutdown, RECONNECT_DELAY).await {
                        break;
                    }
                    continue;
                }
            };

            if let Err(e) = listener.listen(ROSTER_CHANGES_CHANNEL).await {
                tracing::error!(error = %e, "Failed to LISTEN on roster channel");
                if wait_or_shutdown(&mut shutdown, RECONNECT_DELAY).await {
                    break;
                }
                continue;
            }

            tracing::info!(channel = ROSTER_CHANGES_CHANNEL, "Roster change listener connected");
            request_resync(&feed);

            loop {
                tokio::select! {
                    received = listener.recv() => match received {
                        Ok(notification) => match parse_notification(notification.payload()) {
                            Ok(event) => {
                                feed.publish(event);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Ignoring malformed roster notification");
                            }
                        },
                        Err(e) => {
                            tracing::error!(error = %e, "Roster change listener disconnected");
                            break;
                        }
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Roster change listener stopped");
                            return;
                        }
                    }
                }
            }
        }
        tracing::info!("Roster change listener stopped");
    })
}

/// Publishes a bulk-delete event without row images, which makes the
/// snapshot cache refetch the roster.
fn request_resync(feed: &ChangeFeed) -> usize {
    tracing::debug!("Requesting roster resync");
    feed.publish(ChangeEvent::cleared())
}

/// Sleeps for `delay` unless shutdown is requested first. Returns true on shutdown.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use domain::models::NewGraduate;
    use domain::services::{ChangeKind, EventFilter, RosterStore, SnapshotCache};

    use crate::memory::MemoryRosterStore;

    #[test]
    fn test_parse_insert_notification() {
        let payload = r#"{"kind":"insert","record":{"id":"00000000-0000-0000-0000-000000000001","student_id":"1","fullname":"A","faculty":"","degree":null,"status":"pending","check_in_at":null,"created_at":"2024-11-01T08:00:00.5+00:00","seq":1}}"#;
        let event = parse_notification(payload).unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert!(!event.record.unwrap().is_present());
    }

    #[test]
    fn test_parse_malformed_notification() {
        assert!(parse_notification("not json").is_err());
        assert!(parse_notification(r#"{"kind":"truncate","record":null}"#).is_err());
    }

    #[tokio::test]
    async fn test_resync_picks_up_unannounced_writes() {
        // Writes published on a feed nobody forwards stand in for
        // notifications sent before LISTEN was active.
        let store = Arc::new(MemoryRosterStore::new(ChangeFeed::default()));
        let feed = ChangeFeed::default();
        let cache = Arc::new(SnapshotCache::new(store.clone()));
        cache.refresh().await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let maintainer = cache.clone().spawn_maintainer(&feed, shutdown_rx);

        store
            .insert_many(vec![NewGraduate {
                student_id: "6401".to_string(),
                fullname: "Jane Doe".to_string(),
                faculty: String::new(),
                degree: None,
            }])
            .await
            .unwrap();
        assert_eq!(cache.stats().total, 0);

        let mut observed = feed.subscribe("observer", EventFilter::All);
        let mut versions = cache.subscribe_versions();
        assert_eq!(request_resync(&feed), 2);

        let event = observed.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert!(event.record.is_none());

        tokio::time::timeout(
            Duration::from_secs(2),
            versions.wait_for(|_| cache.stats().total == 1),
        )
        .await
        .unwrap()
        .unwrap();

        shutdown_tx.send(true).unwrap();
        maintainer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_or_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        assert!(!wait_or_shutdown(&mut rx, Duration::from_secs(1)).await);

        tx.send(true).unwrap();
        assert!(wait_or_shutdown(&mut rx, Duration::from_secs(60)).await);
    }
}
