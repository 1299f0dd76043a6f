//! Admin console routes: roster management and credentials.
//!
//! Every route here sits behind `require_admin`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    Json,
};
use domain::models::import::parse_rows;
use domain::models::{Credential, Graduate, ImportRequest, ImportSummary, RosterStats};
use domain::services::{EventFilter, FeedError, RosterOrder, Subscription};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::AdminAuth;
use crate::middleware::metrics::record_import;
use crate::routes::dashboard::StatsQuery;
use crate::routes::keep_alive;

/// Full roster listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraduateListResponse {
    pub graduates: Vec<Graduate>,
    pub total: usize,
}

/// Result of clearing the roster.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllResponse {
    pub deleted: u64,
}

/// Query parameters for the admin change stream.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// `*` (default), `insert`, `update` or `delete`.
    pub filter: Option<String>,
}

/// GET /api/v1/admin/graduates
///
/// Reads storage directly so the console sees writes the snapshot has not
/// applied yet.
pub async fn list_graduates(
    State(state): State<AppState>,
) -> Result<Json<GraduateListResponse>, ApiError> {
    let graduates = state.roster.list(RosterOrder::StudentId).await?;
    Ok(Json(GraduateListResponse {
        total: graduates.len(),
        graduates,
    }))
}

/// POST /api/v1/admin/graduates/import
///
/// Appends every row as a pending entry. One invalid row rejects the batch.
pub async fn import_graduates(
    State(state): State<AppState>,
    auth: AdminAuth,
    Json(request): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportSummary>), ApiError> {
    let rows = parse_rows(&request.rows, state.config.limits.max_import_rows)?;
    let inserted = state.roster.insert_many(rows).await?;
    let total = state.roster.count().await?;
    record_import(inserted.len());

    info!(
        admin_id = %auth.admin_id,
        inserted = inserted.len(),
        total,
        "Roster rows imported"
    );

    Ok((
        StatusCode::CREATED,
        Json(ImportSummary {
            inserted: inserted.len(),
            total,
        }),
    ))
}

/// DELETE /api/v1/admin/graduates
pub async fn delete_all_graduates(
    State(state): State<AppState>,
    auth: AdminAuth,
) -> Result<Json<DeleteAllResponse>, ApiError> {
    let deleted = state.roster.delete_all().await?;
    warn!(admin_id = %auth.admin_id, deleted, "Roster cleared");
    Ok(Json(DeleteAllResponse { deleted }))
}

/// GET /api/v1/admin/graduates/:graduate_id/credential
pub async fn get_credential(
    State(state): State<AppState>,
    Path(graduate_id): Path<Uuid>,
) -> Result<Json<Credential>, ApiError> {
    let graduate = state
        .roster
        .find_by_id(graduate_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Graduate not found".to_string()))?;
    Ok(Json(Credential::from(&graduate)))
}

/// GET /api/v1/admin/stats
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<RosterStats> {
    Json(state.snapshot.stats().with_recent_limit(query.limit))
}

/// Change events as SSE. Lagging subscribers get a `lagged` event and
/// should reload the roster.
pub fn change_stream(
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(subscription, |mut subscription| async move {
        let event = match subscription.recv().await {
            Ok(change) => Event::default()
                .event(change.kind.as_str())
                .json_data(&change),
            Err(FeedError::Lagged(missed)) => {
                Ok(Event::default().event("lagged").data(missed.to_string()))
            }
            Err(FeedError::Closed) => return None,
        };
        Some((event, subscription))
    })
}

/// GET /api/v1/admin/events
pub async fn change_events(
    State(state): State<AppState>,
    auth: AdminAuth,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let filter = match query.filter.as_deref() {
        Some(raw) => raw.parse::<EventFilter>().map_err(ApiError::Validation)?,
        None => EventFilter::All,
    };

    let subscription = state.feed.subscribe(format!("admin:{}", auth.admin_id), filter);
    info!(admin_id = %auth.admin_id, filter = ?filter, "Admin change stream opened");

    Ok(Sse::new(change_stream(subscription)).keep_alive(keep_alive()))
}
