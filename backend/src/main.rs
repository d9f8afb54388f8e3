// Cadence Backend - workflow orchestration engine for the CRM

use axum::{routing::get, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod storage;
mod workflows;

#[cfg(test)]
mod tests;

pub use error::{ApiError, ApiResult, AppError};

use config::Config;
use jobs::{JobConfig, JobScheduler};
use storage::Storage;
use workflows::{ExecutorRegistry, InstanceManager, TriggerMatcher, WorkflowEngine};

pub struct AppState {
    pub config: Config,
    pub db_pool: Option<PgPool>,
    pub storage: Storage,
    pub engine: Arc<WorkflowEngine>,
    pub instances: Arc<InstanceManager>,
    pub matcher: Arc<TriggerMatcher>,
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api/v1/workflows/templates", handlers::template_routes())
        .nest("/api/v1/workflows/instances", handlers::instance_routes())
        .nest("/api/v1/workflows/events", handlers::event_routes())
        .nest("/api/v1/workflows/hitl", handlers::hitl_routes())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = database::create_pool(&config.database_url).await?;
    database::migrate(&pool).await?;

    let storage = Storage::postgres(pool.clone());
    let engine = Arc::new(WorkflowEngine::new(
        storage.clone(),
        ExecutorRegistry::with_defaults(),
        config.engine.clone(),
    ));
    let instances = Arc::new(InstanceManager::new(storage.clone(), engine.clone()));
    let matcher = Arc::new(TriggerMatcher::new(storage.clone(), instances.clone()));

    let job_scheduler = JobScheduler::new(engine.clone(), JobConfig::from(&config.engine)).await?;
    job_scheduler.start().await?;

    let state = Arc::new(AppState {
        config: config.clone(),
        db_pool: Some(pool),
        storage,
        engine,
        instances,
        matcher,
    });

    let app = Router::new()
        .route("/", get(handlers::root))
        .merge(handlers::health_routes())
        .merge(api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Cadence backend listening on {}", config.server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
