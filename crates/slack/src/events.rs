use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use flowbot_core::CommandRequest;
use serde::Deserialize;
use thiserror::Error;

use crate::blocks::MessageTemplate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(CommandRequest),
    SslCheck,
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::SlashCommand(_) => "slash_command",
            Self::SslCheck => "ssl_check",
            Self::Unsupported { event_type } => event_type,
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("slash command form could not be decoded: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
}

/// Form fields Slack posts for a slash command invocation.
#[derive(Debug, Default, Deserialize)]
struct SlashCommandForm {
    command: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    channel_id: String,
    ssl_check: Option<String>,
}

impl SlackEnvelope {
    pub fn from_form(envelope_id: impl Into<String>, body: &[u8]) -> Result<Self, EnvelopeError> {
        let form: SlashCommandForm = serde_urlencoded::from_bytes(body)?;

        let event = if form.ssl_check.as_deref() == Some("1") {
            SlackEvent::SslCheck
        } else {
            match form.command {
                Some(command) => SlackEvent::SlashCommand(CommandRequest {
                    command,
                    user_name: form.user_name,
                    text: form.text,
                    channel_id: form.channel_id,
                }),
                None => SlackEvent::Unsupported { event_type: "unknown".to_owned() },
            }
        };

        Ok(Self { envelope_id: envelope_id.into(), event })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Ignored,
}

/// Handles one slash command. Failures are rendered into the reply, so handling never errors.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn command(&self) -> &str;
    async fn handle(&self, request: &CommandRequest, ctx: &EventContext) -> HandlerResult;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.command().to_owned(), Arc::new(handler));
    }

    pub fn handles(&self, envelope: &SlackEnvelope) -> bool {
        match &envelope.event {
            SlackEvent::SlashCommand(request) => self.handlers.contains_key(&request.command),
            _ => false,
        }
    }

    pub async fn dispatch(&self, envelope: &SlackEnvelope, ctx: &EventContext) -> HandlerResult {
        let SlackEvent::SlashCommand(request) = &envelope.event else {
            return HandlerResult::Ignored;
        };
        let Some(handler) = self.handlers.get(&request.command) else {
            return HandlerResult::Ignored;
        };

        handler.handle(request, ctx).await
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
