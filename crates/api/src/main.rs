//! Stockwatch API server binary entrypoint.

use std::sync::Arc;
use std::time::Duration;

use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use stockwatch_common::config::AppConfig;
use stockwatch_common::db::{create_pool, run_migrations};
use stockwatch_engine::pipeline::NotificationPipeline;
use stockwatch_engine::run_guard::RunGuard;
use stockwatch_engine::store::{NotificationStore, PgStore};

use stockwatch_api::routes::create_router;
use stockwatch_api::scheduler::NotifyScheduler;
use stockwatch_api::shutdown::shutdown_signal;
use stockwatch_api::state::AppState;

/// Request bodies are tiny; anything larger is rejected.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "stockwatch_api=debug,stockwatch_engine=debug,stockwatch_notifier=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting Stockwatch API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Open storage
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;
    let store: Arc<dyn NotificationStore> = Arc::new(PgStore::new(pool));

    // Runs are serialized in-process; Redis extends that across replicas.
    // The lock outlives the run timeout so a slow release cannot overlap a new run.
    let guard = match &config.redis_url {
        Some(url) => {
            let ttl = Duration::from_secs(config.run_timeout_secs.saturating_add(60));
            RunGuard::with_redis(url, ttl).await?
        }
        None => RunGuard::local(),
    };

    let pipeline = Arc::new(NotificationPipeline::from_config(
        Arc::clone(&store),
        guard,
        &config,
    )?);

    // Scheduler
    let scheduler = NotifyScheduler::new(Arc::clone(&pipeline), &config).await?;
    if config.scheduler_enabled {
        scheduler.register_jobs().await?;
        scheduler.start().await?;
    } else {
        tracing::info!("Internal scheduler disabled; relying on the HTTP trigger");
    }

    // Build router
    let state = AppState::new(pipeline, config.clone(), scheduler.status());
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("API server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal, stopping gracefully...");
    scheduler.shutdown().await?;
    store.close().await;

    tracing::info!("Stockwatch API server stopped.");
    Ok(())
}
