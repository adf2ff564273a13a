use std::sync::Arc;

use axum::Router;
use flowbot_core::config::{AppConfig, ConfigError, LoadOptions};
use flowbot_flowise::FlowiseClient;
use flowbot_slack::{
    commands::AskCommandHandler, events::EventDispatcher, signature::RequestVerifier,
    web::SlackWebClient,
};
use thiserror::Error;
use tracing::info;

use crate::{health, ingress};

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let command = config.slack.command_name();
    let flowise = FlowiseClient::new(&config.flowise).map_err(BootstrapError::HttpClient)?;
    info!(
        event_name = "system.bootstrap.flowise_client",
        correlation_id = "bootstrap",
        endpoint = %flowise.endpoint(),
        api_key = config.flowise.api_key.is_some(),
        "flowise client configured"
    );

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(AskCommandHandler::new(command.clone(), flowise, config.reply.clone()));

    let http = reqwest::Client::builder().build().map_err(BootstrapError::HttpClient)?;
    let poster = SlackWebClient::new(
        http,
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
    );

    let state = ingress::IngressState::new(
        RequestVerifier::new(config.slack.signing_secret.clone()),
        dispatcher,
        Arc::new(poster),
    );
    let router = ingress::router(state).merge(health::router(health::HealthState::new(&command)));

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        slash_command = %command,
        "slash command handler registered"
    );

    Ok(Application { config, router })
}
