use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocks::{Block, MessageTemplate};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PostError {
    #[error("slack web api request failed: {0}")]
    Transport(String),
    #[error("slack web api returned http {0}")]
    Status(u16),
    #[error("slack web api rejected message: {0}")]
    Api(String),
}

#[async_trait]
pub trait ReplyPoster: Send + Sync {
    async fn post(&self, channel_id: &str, message: &MessageTemplate) -> Result<(), PostError>;
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "no_blocks")]
    blocks: &'a [Block],
}

fn no_blocks(blocks: &&[Block]) -> bool {
    blocks.is_empty()
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts replies through `chat.postMessage` with the bot token.
pub struct SlackWebClient {
    http: Client,
    base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(http: Client, base_url: impl Into<String>, bot_token: SecretString) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, bot_token }
    }
}

#[async_trait]
impl ReplyPoster for SlackWebClient {
    async fn post(&self, channel_id: &str, message: &MessageTemplate) -> Result<(), PostError> {
        let request = PostMessageRequest {
            channel: channel_id,
            text: &message.fallback_text,
            blocks: &message.blocks,
        };

        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| PostError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            return Err(PostError::Status(response.status().as_u16()));
        }

        let envelope: ApiEnvelope =
            response.json().await.map_err(|error| PostError::Transport(error.to_string()))?;
        if envelope.ok {
            Ok(())
        } else {
            Err(PostError::Api(envelope.error.unwrap_or_else(|| "unknown_error".to_owned())))
        }
    }
}
