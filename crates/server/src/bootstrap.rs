use std::sync::Arc;

use benefitflow_core::clock::SystemClock;
use benefitflow_core::config::{AppConfig, ConfigError, LoadOptions};
use benefitflow_db::{
    connect_with_config, migrations, DbPool, SqlEmployeeDirectory, SqlRequestStore,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::notifications::{spawn_dispatcher, ChannelEventPublisher};
use crate::service::{BenefitsService, SharedClock};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<BenefitsService>,
    /// Finishes once the last handle to `service` is dropped.
    pub dispatcher: JoinHandle<usize>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let offset = config.site.offset()?;
    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let (publisher, receiver) = ChannelEventPublisher::new();
    let dispatcher = spawn_dispatcher(receiver);
    let clock: SharedClock = Arc::new(SystemClock::with_offset(offset));
    let service = BenefitsService::new(
        Arc::new(SqlRequestStore::new(db_pool.clone())),
        Arc::new(SqlEmployeeDirectory::new(db_pool.clone())),
        Arc::new(publisher),
        clock,
        config.benefits.eligibility_policy(),
        config.workflow.max_conflict_retries,
    );

    Ok(Application { config, db_pool, service: Arc::new(service), dispatcher })
}
