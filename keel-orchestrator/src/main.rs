use anyhow::{Context, Result};
use keel_driver::DriverRegistry;
use keel_orchestrator::api::{self, AppState};
use keel_orchestrator::bookmark::{
    BookmarkRepository, MemoryBookmarkRepository, PgBookmarkRepository,
};
use keel_orchestrator::config::{Config, StoreKind};
use keel_orchestrator::db;
use keel_orchestrator::engine::{Orchestrator, RetryPolicy, TaskExecutor};
use keel_orchestrator::scheduler::AdvancePoller;
use keel_orchestrator::store::{MemoryPipelineStore, PgPipelineStore, PipelineStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keel Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    let (store, bookmarks) = open_stores(&config).await?;

    let registry = Arc::new(DriverRegistry::with_default_engines(
        config.connect_options(),
    ));
    tracing::info!("Registered drivers: {:?}", registry.engines());

    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&registry),
        config.task_timeout,
        RetryPolicy::default(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        executor,
        config.max_parallel_tasks,
    ));

    if config.auto_advance {
        let poller = AdvancePoller::new(
            Arc::clone(&orchestrator),
            config.advance_interval,
            config.max_parallel_pipelines,
        );
        tokio::spawn(async move { poller.run().await });
    } else {
        tracing::info!("Automatic advancement disabled");
    }

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        orchestrator,
        bookmarks,
        registry,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

async fn open_stores(
    config: &Config,
) -> Result<(Arc<dyn PipelineStore>, Arc<dyn BookmarkRepository>)> {
    match config.store {
        StoreKind::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok((
                Arc::new(PgPipelineStore::new(pool.clone())),
                Arc::new(PgBookmarkRepository::new(pool)),
            ))
        }
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store, state is lost on restart");
            Ok((
                Arc::new(MemoryPipelineStore::new()),
                Arc::new(MemoryBookmarkRepository::new()),
            ))
        }
    }
}
