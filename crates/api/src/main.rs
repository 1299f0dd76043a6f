use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use gradcheck_api::app::{self, AppState, Stores};
use gradcheck_api::config::{Config, StorageBackend};
use gradcheck_api::jobs::{
    IdleCleanupJob, JobScheduler, PoolMetricsJob, RosterGaugesJob, SessionCleanupJob,
};
use gradcheck_api::middleware::{self, logging};
use gradcheck_api::services::bootstrap_admin;
use persistence::repositories::AdminUserRepository;

const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging).context("Failed to initialize logging")?;
    middleware::init_metrics().context("Failed to install Prometheus recorder")?;

    info!(
        backend = config.database.backend.as_str(),
        "Starting gradcheck API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let stores = match config.database.backend {
        StorageBackend::Postgres => {
            let db_config = persistence::db::DatabaseConfig::from(&config.database);
            let pool = persistence::db::create_pool(&db_config)
                .await
                .context("Failed to connect to database")?;

            info!("Running database migrations...");
            sqlx::migrate!("../persistence/src/migrations")
                .run(&pool)
                .await?;
            info!("Migrations completed");

            Stores::postgres(pool)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; the roster is lost on restart");
            Stores::memory()
        }
    };

    let addr = config.socket_addr()?;
    let idle_timeout = config.kiosk.idle_timeout();
    let state = AppState::new(config, stores).context("Failed to configure token signing")?;

    let outcome = bootstrap_admin(state.accounts.as_ref(), &state.config.admin).await?;
    info!(outcome = ?outcome, "Admin bootstrap finished");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let version = state.snapshot.refresh().await?;
    info!(version, "Roster snapshot loaded");
    let maintainer = state
        .snapshot
        .clone()
        .spawn_maintainer(&state.feed, shutdown_rx.clone());

    let listener_task = state.pool.clone().map(|pool| {
        persistence::listener::spawn_change_listener(pool, state.feed.clone(), shutdown_rx.clone())
    });

    let mut limiters = vec![state.sign_in_limiter.clone()];
    limiters.extend(state.rate_limiter.clone());

    let mut scheduler = JobScheduler::new(shutdown_rx.clone());
    scheduler.register(IdleCleanupJob::new(
        state.kiosks.clone(),
        idle_timeout,
        limiters,
    ));
    scheduler.register(RosterGaugesJob::new(state.snapshot.clone()));
    if let Some(pool) = &state.pool {
        scheduler.register(PoolMetricsJob::new(pool.clone()));
        scheduler.register(SessionCleanupJob::new(AdminUserRepository::new(pool.clone())));
    }
    scheduler.start();

    let app = app::create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);

    scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;
    let background = async move {
        let _ = maintainer.await;
        if let Some(task) = listener_task {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(JOB_SHUTDOWN_TIMEOUT, background).await.is_err() {
        warn!("Change listener did not stop in time");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
