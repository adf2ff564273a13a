//! Core types for flowbot: configuration and the question/answer domain model.

pub mod config;
pub mod domain;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::question::{ApiResult, CommandRequest, QueryPayload, ResultShape};
