//! LingoCoach - Tutoring session lifecycle service

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lingocoach::{
    api::{self, AppState, RequestStats},
    config::Config,
    db::{self, repositories::SqlxSessionRepository},
    services::{AccessPolicy, NoShowSweeper, SessionLifecycleService},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lingocoach=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LingoCoach session service...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Services
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let lifecycle = Arc::new(SessionLifecycleService::new(session_repo, &config.sessions));

    // Start no-show sweep
    if config.sessions.sweep_enabled {
        let sweeper = Arc::new(NoShowSweeper::new(lifecycle.clone(), &config.sessions));
        sweeper.spawn(config.sessions.sweep_interval());
        tracing::info!(
            "No-show sweep every {:?} (after {} min)",
            config.sessions.sweep_interval(),
            config.sessions.no_show_after_minutes
        );
    }

    let state = AppState {
        pool: pool.clone(),
        lifecycle,
        policy: AccessPolicy::new(),
        request_stats: Arc::new(RequestStats::new()),
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    pool.close().await;
    Ok(())
}
