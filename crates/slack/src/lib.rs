//! Slack integration - slash command ingress and replies
//!
//! This crate provides the Slack side of flowbot:
//! - **Signing** (`signature`) - verifies `X-Slack-Signature` on inbound requests
//! - **Events** (`events`) - decodes slash command forms and routes them to handlers
//! - **Commands** (`commands`) - the ask command: question in, answer card or `오류:` notice out
//! - **Block Kit** (`blocks`) - typed message builders (divider, header, context, section, button)
//! - **Web API** (`web`) - posts replies with `chat.postMessage`
//!
//! # Architecture
//!
//! ```text
//! Slack POST → RequestVerifier → ack 200
//!                  ↓
//!            EventDispatcher → AskCommandHandler → PredictionClient (Flowise)
//!                                     ↓
//!                     Block Kit reply → ReplyPoster → chat.postMessage
//! ```

pub mod blocks;
pub mod commands;
pub mod events;
pub mod signature;
pub mod web;
