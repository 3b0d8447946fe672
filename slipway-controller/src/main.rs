use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod cluster;
pub mod config;
pub mod db;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod state;

use cluster::{ClusterClient, KubeClient, RegistryClient};
use config::Config;
use repository::{
    DeploymentHistoryRepository, ExecutionRepository, HealthCheckRepository,
    InMemoryExecutionRepository, InMemoryJobRepository, InMemoryPipelineRepository, LogStore,
    PgExecutionRepository, PgPipelineRepository, PipelineRepository, RuleRepository,
    WebhookEventLog,
};
use scheduler::{Dispatcher, Sweeper};
use service::{
    AutoDeployer, BuildQueue, EventBus, ImageBuilder, PipelineExecutor, RolloutController,
    TriggerRouter,
};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slipway_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Slipway Controller...");

    let config = Config::from_env()?;
    config.validate()?;

    // Pipelines and execution history live in Postgres when configured
    let (pipelines, executions): (Arc<dyn PipelineRepository>, Arc<dyn ExecutionRepository>) =
        match &config.database_url {
            Some(database_url) => {
                tracing::info!("Connecting to database...");
                let pool = db::create_pool(database_url)
                    .await
                    .context("Failed to create database pool")?;
                tracing::info!("Database connection pool created");

                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;

                (
                    Arc::new(PgPipelineRepository::new(pool.clone())),
                    Arc::new(PgExecutionRepository::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, pipelines and history are kept in memory");
                (
                    Arc::new(InMemoryPipelineRepository::new()),
                    Arc::new(InMemoryExecutionRepository::new()),
                )
            }
        };

    let cluster: Arc<dyn ClusterClient> = Arc::new(
        KubeClient::from_config(&config)
            .await
            .context("Failed to create cluster client")?,
    );
    let registry = Arc::new(RegistryClient::new(config.registry_url.clone()));
    let rules = RuleRepository::load(config.rules_path.clone())
        .await
        .context("Failed to load auto-deploy rules")?;

    let events = EventBus::new();
    let jobs = Arc::new(InMemoryJobRepository::new());
    let logs = Arc::new(LogStore::new());

    let rollout = RolloutController::new(
        &config,
        cluster.clone(),
        Arc::new(HealthCheckRepository::new()),
        Arc::new(DeploymentHistoryRepository::new()),
        events.clone(),
    );
    let executor = PipelineExecutor::new(
        &config,
        pipelines.clone(),
        jobs.clone(),
        executions.clone(),
        logs.clone(),
        ImageBuilder::new(&config, cluster.clone()),
        rollout.clone(),
        events.clone(),
    );
    let queue = Arc::new(BuildQueue::new(
        &config,
        jobs,
        pipelines.clone(),
        executions.clone(),
        Arc::new(executor),
        events.clone(),
    ));
    let autodeploy = AutoDeployer::new(
        Arc::new(rules),
        rollout.clone(),
        registry.clone(),
        config.registry_image_prefix.clone(),
    );

    Dispatcher::new(queue.clone(), config.dispatch_interval).spawn();
    Sweeper::new(
        queue.clone(),
        executions.clone(),
        logs.clone(),
        config.execution_history_limit,
        config.sweep_interval,
    )
    .spawn();

    let addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        router: Arc::new(TriggerRouter::new(pipelines.clone(), queue.clone())),
        pipelines,
        executions,
        logs,
        queue,
        rollout,
        autodeploy: Arc::new(autodeploy),
        event_log: Arc::new(WebhookEventLog::new()),
        cluster,
        registry,
        events,
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
