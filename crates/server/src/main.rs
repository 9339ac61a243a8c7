mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use proptalk_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn init_logging(config: &AppConfig) {
    use proptalk_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.db_pool.clone(), app.properties.clone()),
    )
    .await?;

    let sessions = app.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match sessions.purge_expired(Utc::now()).await {
                Ok(purged) if purged > 0 => tracing::info!(
                    event_name = "session.purged",
                    purged,
                    "expired sessions removed"
                ),
                Ok(_) => {}
                Err(error) => tracing::warn!(
                    event_name = "session.purge_failed",
                    error = %error,
                    "expired session purge failed"
                ),
            }
        }
    });

    tracing::info!(
        event_name = "system.server.slack_transport_mode",
        correlation_id = "bootstrap",
        slack_enabled = app.config.slack.enabled,
        "slack runner starting"
    );
    let slack_runner = app.slack_runner;
    let slack_task = tokio::spawn(async move { slack_runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        batch_size = app.agent_runtime.settings().batch_size,
        currency = %app.agent_runtime.settings().currency,
        "proptalk-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "proptalk-server stopping"
    );

    slack_task.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "database pool did not close within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
