use std::sync::Arc;
use std::time::Duration;

use clarifier_agent::ExtractionFallback;
use clarifier_core::audit::TracingAuditSink;
use clarifier_core::config::{AppConfig, ConfigError, SessionBackend};
use clarifier_core::flows::{
    BudgetEstimator, BulletSummaryFlow, FlowRunner, QuizSetupFlow, UnconfiguredBudgetEstimator,
};
use clarifier_core::session::{InMemorySessionStore, SessionStore};
use clarifier_db::{connect_from_config, migrations, DbPool, SqlSessionStore};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::budget::HttpBudgetClient;

pub struct Application {
    pub config: AppConfig,
    pub runner: Arc<FlowRunner>,
    /// Present only for the sqlite session backend.
    pub db_pool: Option<DbPool>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("budget client could not be built: {0}")]
    BudgetClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;
    info!(
        event_name = "clarifier.bootstrap.start",
        correlation_id = "bootstrap",
        session_backend = ?config.sessions.backend,
        "starting application bootstrap"
    );

    let (store, db_pool) = session_store(&config).await?;
    let estimator = budget_estimator(&config)?;

    let mut runner = FlowRunner::new(store)
        .with_audit(Arc::new(TracingAuditSink))
        .with_settings(config.sessions.runner_settings());
    if let Some(extractor) = ExtractionFallback::from_config(&config.extractor) {
        runner = runner.with_extractor(Arc::new(extractor));
    }
    runner.register_flow(QuizSetupFlow::new(
        estimator,
        config.budget.limits(),
        config.budget.retry_policy(),
    ));
    runner.register_flow(BulletSummaryFlow::default());

    info!(
        event_name = "clarifier.bootstrap.flows_registered",
        correlation_id = "bootstrap",
        flows = ?runner.flow_ids(),
        "flows registered"
    );

    Ok(Application { config, runner: Arc::new(runner), db_pool })
}

async fn session_store(
    config: &AppConfig,
) -> Result<(Arc<dyn SessionStore>, Option<DbPool>), BootstrapError> {
    let ttl = config.sessions.ttl();
    match config.sessions.backend {
        SessionBackend::Memory => {
            let store = match ttl {
                Some(ttl) => InMemorySessionStore::with_ttl(ttl),
                None => InMemorySessionStore::new(),
            };
            Ok((Arc::new(store), None))
        }
        SessionBackend::Sqlite => {
            let db_pool = connect_from_config(&config.database)
                .await
                .map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "clarifier.bootstrap.database_connected",
                correlation_id = "bootstrap",
                "database connection established"
            );

            migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "clarifier.bootstrap.migrations_applied",
                correlation_id = "bootstrap",
                "database migrations applied"
            );

            let store = SqlSessionStore::new(db_pool.clone()).with_ttl(ttl);
            Ok((Arc::new(store), Some(db_pool)))
        }
    }
}

fn budget_estimator(config: &AppConfig) -> Result<Arc<dyn BudgetEstimator>, BootstrapError> {
    let base_url = config.budget.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty());
    match base_url {
        Some(base_url) => {
            let client = HttpBudgetClient::new(base_url, config.budget.timeout())
                .map_err(BootstrapError::BudgetClient)?;
            info!(
                event_name = "clarifier.bootstrap.budget_configured",
                correlation_id = "bootstrap",
                endpoint = client.endpoint(),
                "budget service configured"
            );
            Ok(Arc::new(client))
        }
        None => {
            info!(
                event_name = "clarifier.bootstrap.budget_unconfigured",
                correlation_id = "bootstrap",
                "no budget service configured, flows use default budgets"
            );
            Ok(Arc::new(UnconfiguredBudgetEstimator))
        }
    }
}

/// Periodically drops expired sessions. Nothing is spawned when sessions
/// never expire.
pub fn spawn_sweeper(app: &Application) -> Option<JoinHandle<()>> {
    app.config.sessions.ttl()?;
    let runner = Arc::clone(&app.runner);
    let period = Duration::from_secs(app.config.sessions.sweep_interval_secs.max(1));

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match runner.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(
                    event_name = "clarifier.sweeper.purged",
                    correlation_id = "sweeper",
                    removed,
                    "expired sessions purged"
                ),
                Err(error) => tracing::warn!(
                    event_name = "clarifier.sweeper.failed",
                    correlation_id = "sweeper",
                    error = %error,
                    "session sweep failed"
                ),
            }
        }
    }))
}
