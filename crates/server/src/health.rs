use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    slash_command: String,
    started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn new(slash_command: impl Into<String>) -> Self {
        Self { slash_command: slash_command.into(), started_at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub slash_command: String,
    pub started_at: String,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "flowbot-server accepting slash commands".to_string(),
        },
        slash_command: state.slash_command.clone(),
        started_at: state.started_at.to_rfc3339(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
