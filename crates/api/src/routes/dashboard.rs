//! Public dashboard and monitor routes.
//!
//! Both read from the roster snapshot, never from storage directly. The
//! event stream pushes a fresh `stats` event whenever the snapshot version
//! moves.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    Json,
};
use domain::models::RosterStats;
use domain::services::SnapshotCache;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use crate::app::AppState;
use crate::routes::keep_alive;

/// Query parameters for the stats endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// Caps the recently-present list. Counts are unaffected.
    pub limit: Option<usize>,
}

/// GET /api/v1/dashboard and GET /api/v1/monitor
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<RosterStats> {
    Json(state.snapshot.stats().with_recent_limit(query.limit))
}

fn stats_event(snapshot: &SnapshotCache, limit: Option<usize>) -> Result<Event, axum::Error> {
    Event::default()
        .event("stats")
        .id(snapshot.version().to_string())
        .json_data(snapshot.stats().with_recent_limit(limit))
}

struct StatsStream {
    snapshot: Arc<SnapshotCache>,
    versions: watch::Receiver<u64>,
    limit: Option<usize>,
    sent_initial: bool,
}

/// Stats event stream: the current stats, then one event per snapshot change.
pub fn stats_stream(
    snapshot: Arc<SnapshotCache>,
    limit: Option<usize>,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    let versions = snapshot.subscribe_versions();
    let initial = StatsStream {
        snapshot,
        versions,
        limit,
        sent_initial: false,
    };

    stream::unfold(initial, |mut s| async move {
        if s.sent_initial {
            // Sender gone means the cache was dropped; end the stream.
            s.versions.changed().await.ok()?;
        } else {
            s.sent_initial = true;
            s.versions.borrow_and_update();
        }
        let event = stats_event(&s.snapshot, s.limit);
        Some((event, s))
    })
}

/// GET /api/v1/dashboard/events
pub async fn stats_events(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!(subscribers = state.feed.subscriber_count(), "Dashboard stream opened");
    Sse::new(stats_stream(state.snapshot.clone(), query.limit)).keep_alive(keep_alive())
}
