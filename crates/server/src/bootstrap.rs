use std::sync::Arc;
use std::time::Duration;

use proptalk_agent::{extractor, AgentRuntime, LlmError, RuntimeSettings};
use proptalk_core::config::{AppConfig, ConfigError, LoadOptions};
use proptalk_core::search::AreaDirectory;
use proptalk_db::repositories::{
    PropertyRepository, SqlConversationHistory, SqlPropertyRepository, SqlSessionStore,
};
use proptalk_db::{connect_with_config, migrations, DbPool};
use proptalk_slack::{
    conversation_dispatcher, NoopSocketTransport, PostError, ReconnectPolicy, SlackDelivery,
    SlackPoster, SocketModeRunner, WebApiPoster,
};
use thiserror::Error;
use tracing::info;

const SLACK_POST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub properties: Arc<dyn PropertyRepository>,
    pub sessions: Arc<SqlSessionStore>,
    pub agent_runtime: Arc<AgentRuntime>,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("extractor setup failed: {0}")]
    Extractor(#[from] LlmError),
    #[error("slack poster setup failed: {0}")]
    SlackPoster(#[from] PostError),
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

    let properties = Arc::new(SqlPropertyRepository::new(db_pool.clone()));
    let sessions = Arc::new(
        SqlSessionStore::new(db_pool.clone()).with_ttl(config.conversation.session_ttl_secs),
    );
    let history = Arc::new(SqlConversationHistory::new(db_pool.clone()));

    let poster: Arc<dyn SlackPoster> = if config.slack.enabled {
        Arc::new(WebApiPoster::new(config.slack.bot_token.clone(), SLACK_POST_TIMEOUT)?)
    } else {
        Arc::new(proptalk_slack::NoopSlackPoster)
    };

    let extractor = extractor::from_config(&config, AreaDirectory::default())?;
    let agent_runtime = Arc::new(
        AgentRuntime::new(
            extractor,
            properties.clone(),
            sessions.clone(),
            Arc::new(SlackDelivery::new(poster)),
        )
        .with_settings(RuntimeSettings::from_config(&config))
        .with_search_settings(config.search.settings())
        .with_history(history),
    );
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        extractor = ?config.conversation.extractor,
        batch_size = config.conversation.batch_size,
        "conversation runtime ready"
    );

    // Socket Mode frames arrive through the `SocketTransport` seam; the
    // process ships with the noop transport, so Slack ingress is idle until
    // a websocket transport is plugged in.
    let slack_runner = SocketModeRunner::new(
        Arc::new(NoopSocketTransport),
        conversation_dispatcher(agent_runtime.clone()),
        ReconnectPolicy::default(),
    );

    Ok(Application { config, db_pool, properties, sessions, agent_runtime, slack_runner })
}
