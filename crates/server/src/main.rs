mod bootstrap;
mod health;
mod ingress;

use std::time::Duration;

use anyhow::{Context, Result};
use flowbot_core::config::{AppConfig, LoadOptions, LogFormat};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Used when the configuration itself could not be loaded.
const DEFAULT_STARTUP_FAILURE_DELAY: Duration = Duration::from_secs(60);

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            init_logging("info", LogFormat::Compact);
            return fail_startup(anyhow::Error::new(error), DEFAULT_STARTUP_FAILURE_DELAY).await;
        }
    };
    init_logging(&config.logging.level, config.logging.format);

    let delay = Duration::from_secs(config.server.startup_failure_delay_secs);
    let app = match bootstrap::bootstrap_with_config(config) {
        Ok(app) => app,
        Err(error) => return fail_startup(error.into(), delay).await,
    };

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = match TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))
    {
        Ok(listener) => listener,
        Err(error) => return fail_startup(error, delay).await,
    };

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        slash_command = %app.config.slack.command_name(),
        "⚡️ flowbot-server is running"
    );

    axum::serve(listener, app.router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "flowbot-server stopping"
    );

    Ok(())
}

async fn fail_startup(error: anyhow::Error, delay: Duration) -> Result<()> {
    tracing::error!(
        event_name = "system.server.startup_failed",
        correlation_id = "bootstrap",
        error = %format!("{error:#}"),
        retry_after_secs = delay.as_secs(),
        "⚡️ failed to start flowbot-server"
    );
    tokio::time::sleep(delay).await;
    Err(error)
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
    }
}
