use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::{
    AdminAccountStore, ChangeFeed, KioskRegistry, RosterStore, SnapshotCache,
};
use persistence::memory::{MemoryAccountStore, MemoryRosterStore};
use persistence::repositories::{AdminUserRepository, GraduateRepository};
use shared::jwt::{JwtConfig, JwtError};
use sqlx::PgPool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_admin, require_kiosk,
    security_headers_middleware, sign_in_rate_limit, trace_id, RateLimiterState,
};
use crate::routes::{admin, auth, dashboard, health, kiosk};
use crate::services::AuthService;

/// Roster and account storage plus the change feed they publish to.
#[derive(Clone)]
pub struct Stores {
    pub roster: Arc<dyn RosterStore>,
    pub accounts: Arc<dyn AdminAccountStore>,
    pub feed: ChangeFeed,
    /// Present only for the Postgres backend.
    pub pool: Option<PgPool>,
}

impl Stores {
    /// Process-local stores. The roster publishes its own change events.
    pub fn memory() -> Self {
        let feed = ChangeFeed::default();
        Self {
            roster: Arc::new(MemoryRosterStore::new(feed.clone())),
            accounts: Arc::new(MemoryAccountStore::new()),
            feed,
            pool: None,
        }
    }

    /// Postgres-backed stores. Change events arrive through the
    /// notification listener, which must be started separately.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            roster: Arc::new(GraduateRepository::new(pool.clone())),
            accounts: Arc::new(AdminUserRepository::new(pool.clone())),
            feed: ChangeFeed::default(),
            pool: Some(pool),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub roster: Arc<dyn RosterStore>,
    pub accounts: Arc<dyn AdminAccountStore>,
    pub feed: ChangeFeed,
    pub snapshot: Arc<SnapshotCache>,
    pub kiosks: Arc<KioskRegistry>,
    pub jwt: Arc<JwtConfig>,
    pub auth: Arc<AuthService>,
    /// None when `security.rate_limit_per_minute` is 0.
    pub rate_limiter: Option<Arc<RateLimiterState>>,
    pub sign_in_limiter: Arc<RateLimiterState>,
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores) -> Result<Self, JwtError> {
        let jwt = Arc::new(config.jwt.build()?);
        let phrasebook = Arc::new(config.announcement.clone());
        let kiosks = Arc::new(KioskRegistry::new(
            stores.roster.clone(),
            phrasebook,
            config.kiosk.timings(),
        ));
        let auth = Arc::new(AuthService::new(
            stores.accounts.clone(),
            jwt.clone(),
            config.kiosk.passcode.as_str(),
        ));
        let rate_limiter = (config.security.rate_limit_per_minute > 0)
            .then(|| Arc::new(RateLimiterState::new(config.security.rate_limit_per_minute)));
        let sign_in_limiter = Arc::new(RateLimiterState::new(
            config.security.sign_in_attempts_per_minute,
        ));

        Ok(Self {
            snapshot: Arc::new(SnapshotCache::new(stores.roster.clone())),
            roster: stores.roster,
            accounts: stores.accounts,
            feed: stores.feed,
            kiosks,
            jwt,
            auth,
            rate_limiter,
            sign_in_limiter,
            pool: stores.pool,
            config: Arc::new(config),
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Health and metrics stay outside the rate limiter.
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/api/health/ready", get(health::ready))
        .route("/metrics", get(metrics_handler));

    let dashboard_routes = Router::new()
        .route("/api/v1/dashboard", get(dashboard::get_stats))
        .route("/api/v1/monitor", get(dashboard::get_stats))
        .route("/api/v1/dashboard/events", get(dashboard::stats_events));

    let sign_in_routes = Router::new()
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/kiosk/unlock", post(kiosk::unlock))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            sign_in_rate_limit,
        ));

    let admin_routes = Router::new()
        .route("/api/v1/auth/session", get(auth::session))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route(
            "/api/v1/admin/graduates",
            get(admin::list_graduates).delete(admin::delete_all_graduates),
        )
        .route("/api/v1/admin/graduates/import", post(admin::import_graduates))
        .route(
            "/api/v1/admin/graduates/:graduate_id/credential",
            get(admin::get_credential),
        )
        .route("/api/v1/admin/stats", get(admin::get_stats))
        .route("/api/v1/admin/events", get(admin::change_events))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let kiosk_routes = Router::new()
        .route("/api/v1/kiosk/lock", post(kiosk::lock))
        .route("/api/v1/kiosk/status", get(kiosk::status))
        .route("/api/v1/kiosk/scan", post(kiosk::scan))
        .route("/api/v1/kiosk/search", get(kiosk::search))
        .route(
            "/api/v1/kiosk/announcements/test",
            get(kiosk::test_announcement),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_kiosk));

    let api_routes = Router::new()
        .merge(dashboard_routes)
        .merge(sign_in_routes)
        .merge(admin_routes)
        .merge(kiosk_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security_headers_middleware,
        ))
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config.security.cors_origins))
        .with_state(state)
}
