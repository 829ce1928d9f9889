use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use triago_agents::{AgentRegistry, InMemoryActionExecutor};
use triago_core::config::{AppConfig, ConfigError, LoadOptions};
use triago_db::repositories::{
    SqlAuditSink, SqlConversationStore, SqlQuotaRepository, SqlTenantRepository,
};
use triago_db::{connect_with_settings, migrations, DbPool};
use triago_engine::{AgentCallConfig, HttpLlmClient, LlmError, Orchestrator, UsageService};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client construction failed: {0}")]
    Llm(#[source] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let tenants = Arc::new(SqlTenantRepository::new(db_pool.clone()));
    let conversations = Arc::new(SqlConversationStore::new(db_pool.clone()));
    let quota = Arc::new(SqlQuotaRepository::new(db_pool.clone()));
    let audit = Arc::new(SqlAuditSink::new(db_pool.clone()));
    let llm = Arc::new(HttpLlmClient::new(&config.llm).map_err(BootstrapError::Llm)?);

    // Execution adapters run in-memory until real integrations are wired up.
    let registry = AgentRegistry::with_defaults(Arc::new(InMemoryActionExecutor::default()));
    let usage = UsageService::new(quota, config.orchestrator.reserve_estimate_tokens);

    let orchestrator = Arc::new(Orchestrator::new(
        tenants,
        conversations,
        usage,
        registry,
        llm,
        audit,
        &config.orchestrator,
        AgentCallConfig::from(&config.llm),
    ));

    info!(
        event_name = "system.bootstrap.completed",
        reserve_estimate_tokens = config.orchestrator.reserve_estimate_tokens,
        memory_window = config.orchestrator.memory_window,
        "application bootstrap completed"
    );

    Ok(Application { config, db_pool, orchestrator })
}
