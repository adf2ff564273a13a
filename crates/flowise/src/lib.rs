//! Flowise prediction API client.
//!
//! Sends a single `POST {"question": ...}` per command and classifies the
//! HTTP status of the answer:
//!
//! - `200`, `204` - success, body returned as [`ApiResult`](flowbot_core::ApiResult)
//! - `502`, `503` - the Flowise service is stopped
//! - `404` - the configured prediction endpoint does not exist
//! - anything else - generic fetch error

pub mod client;

pub use client::{FlowiseClient, PredictionClient, QueryError};
