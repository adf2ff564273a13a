use std::time::Duration;

use async_trait::async_trait;
use flowbot_core::config::FlowiseConfig;
use flowbot_core::{ApiResult, QueryPayload};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;

const SUCCESS_STATUSES: [u16; 2] = [200, 204];
const SERVICE_STOPPED_STATUSES: [u16; 2] = [502, 503];
const NOT_FOUND_STATUSES: [u16; 1] = [404];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("flowise service is stopped({status}){}", detail_suffix(.detail))]
    ServiceStopped { status: u16, detail: Option<String> },
    #[error("not found({status}) api endpoint \"{endpoint}\"{}", detail_suffix(.detail))]
    NotFound { status: u16, endpoint: String, detail: Option<String> },
    #[error("fetch error({status}){}", detail_suffix(.detail))]
    Fetch { status: u16, detail: Option<String> },
    #[error("request failed: {0}")]
    Transport(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|detail| format!(": {detail}")).unwrap_or_default()
}

#[async_trait]
pub trait PredictionClient: Send + Sync {
    async fn query(&self, payload: &QueryPayload) -> Result<ApiResult, QueryError>;
}

pub struct FlowiseClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl FlowiseClient {
    pub fn new(config: &FlowiseConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout_secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: config.api_endpoint.trim().to_owned(),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.expose_secret().trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PredictionClient for FlowiseClient {
    async fn query(&self, payload: &QueryPayload) -> Result<ApiResult, QueryError> {
        let mut request = self.http.post(&self.endpoint).json(payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        debug!(endpoint = %self.endpoint, "sending flowise prediction request");
        let response =
            request.send().await.map_err(|error| QueryError::Transport(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| QueryError::Transport(error.to_string()))?;
        debug!(endpoint = %self.endpoint, status, body_len = body.len(), "flowise responded");

        classify_response(status, &self.endpoint, ApiResult::from_body(&body))
    }
}

pub fn classify_response(
    status: u16,
    endpoint: &str,
    result: ApiResult,
) -> Result<ApiResult, QueryError> {
    if SUCCESS_STATUSES.contains(&status) {
        return Ok(result);
    }

    let detail = result.is_present().then(|| result.error_detail());
    if SERVICE_STOPPED_STATUSES.contains(&status) {
        Err(QueryError::ServiceStopped { status, detail })
    } else if NOT_FOUND_STATUSES.contains(&status) {
        Err(QueryError::NotFound { status, endpoint: endpoint.to_owned(), detail })
    } else {
        Err(QueryError::Fetch { status, detail })
    }
}

#[cfg(test)]
mod tests {
    use flowbot_core::config::FlowiseConfig;
    use flowbot_core::{ApiResult, QueryPayload};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{classify_response, FlowiseClient, PredictionClient, QueryError};

    const PREDICTION_PATH: &str = "/api/v1/prediction/flow-1";

    fn client_for(server: &MockServer, api_key: Option<&str>) -> FlowiseClient {
        FlowiseClient::new(&FlowiseConfig {
            api_endpoint: format!("{}{PREDICTION_PATH}", server.uri()),
            api_key: api_key.map(|key| key.to_owned().into()),
            timeout_secs: Some(5),
        })
        .expect("client should build")
    }

    async fn respond_with(status: u16, body: &str) -> (MockServer, FlowiseClient) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICTION_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        let client = client_for(&server, None);
        (server, client)
    }

    fn question(text: &str) -> QueryPayload {
        QueryPayload { question: text.to_owned() }
    }

    #[tokio::test]
    async fn posts_question_as_json_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PREDICTION_PATH))
            .and(header("content-type", "application/json"))
            .and(header("authorization", "Bearer fw-key"))
            .and(body_json(json!({"question": "what is it"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"text":"42"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server, Some("fw-key"))
            .query(&question("what is it"))
            .await
            .expect("query should succeed");

        assert_eq!(result, ApiResult::ParsedJson(json!({"text": "42"})));
    }

    #[tokio::test]
    async fn omits_authorization_without_api_key() {
        let (server, client) = respond_with(200, "{}").await;

        client.query(&question("hi")).await.expect("query should succeed");

        let requests = server.received_requests().await.expect("request recording enabled");
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn blank_api_key_is_treated_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        client_for(&server, Some("  ")).query(&question("hi")).await.expect("query");

        let requests = server.received_requests().await.expect("request recording enabled");
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn success_statuses_resolve_with_body() {
        for status in [200, 204] {
            let (_server, client) = respond_with(status, "").await;
            let result = client.query(&question("q")).await;
            assert_eq!(result, Ok(ApiResult::RawText(String::new())), "status {status}");
        }
    }

    #[tokio::test]
    async fn non_json_body_round_trips_as_raw_text() {
        let (_server, client) = respond_with(200, "plain text result").await;

        let result = client.query(&question("q")).await.expect("query should succeed");

        assert_eq!(result, ApiResult::RawText("plain text result".to_owned()));
    }

    #[tokio::test]
    async fn json_body_is_parsed_deeply() {
        let body = r#"{"text":"answer","sourceDocuments":[{"pageContent":"p1"}],"chatId":"c1"}"#;
        let (_server, client) = respond_with(200, body).await;

        let result = client.query(&question("q")).await.expect("query should succeed");

        assert_eq!(
            result,
            ApiResult::ParsedJson(json!({
                "text": "answer",
                "sourceDocuments": [{"pageContent": "p1"}],
                "chatId": "c1"
            }))
        );
    }

    #[tokio::test]
    async fn service_stopped_statuses_are_classified() {
        for status in [502, 503] {
            let (_server, client) = respond_with(status, r#"{"message":"down"}"#).await;
            let error = client.query(&question("q")).await.expect_err("should fail");
            assert_eq!(error.to_string(), format!("flowise service is stopped({status}): down"));
        }
    }

    #[tokio::test]
    async fn not_found_names_the_endpoint() {
        let (server, client) = respond_with(404, "").await;

        let error = client.query(&question("q")).await.expect_err("should fail");

        let message = error.to_string();
        assert!(message.starts_with("not found(404) api endpoint"), "{message}");
        assert!(message.contains(&format!("{}{PREDICTION_PATH}", server.uri())), "{message}");
        assert!(matches!(error, QueryError::NotFound { detail: None, .. }));
    }

    #[tokio::test]
    async fn other_statuses_are_generic_fetch_errors() {
        for status in [500, 401] {
            let (_server, client) = respond_with(status, r#"{"error":"nope"}"#).await;
            let error = client.query(&question("q")).await.expect_err("should fail");
            assert_eq!(error.to_string(), format!(r#"fetch error({status}): {{"error":"nope"}}"#));
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let client = FlowiseClient::new(&FlowiseConfig {
            api_endpoint: format!("http://127.0.0.1:1{PREDICTION_PATH}"),
            api_key: None,
            timeout_secs: Some(5),
        })
        .expect("client should build");

        let error = client.query(&question("q")).await.expect_err("should fail");

        assert!(matches!(error, QueryError::Transport(_)));
        assert!(error.to_string().starts_with("request failed: "));
    }

    #[test]
    fn raw_text_detail_is_serialised_as_json_string() {
        let error = classify_response(
            503,
            "http://flowise/api",
            ApiResult::RawText("Service Unavailable".to_owned()),
        )
        .expect_err("503 should fail");

        assert_eq!(error.to_string(), r#"flowise service is stopped(503): "Service Unavailable""#);
    }

    #[test]
    fn absent_result_has_no_detail_suffix() {
        let error = classify_response(500, "http://flowise/api", ApiResult::ParsedJson(json!(null)))
            .expect_err("500 should fail");

        assert_eq!(error.to_string(), "fetch error(500)");
    }

    #[test]
    fn not_found_message_quotes_endpoint() {
        let error = classify_response(
            404,
            "http://flowise/api/v1/prediction/x",
            ApiResult::ParsedJson(json!({"message": "Chatflow x not found"})),
        )
        .expect_err("404 should fail");

        assert_eq!(
            error.to_string(),
            r#"not found(404) api endpoint "http://flowise/api/v1/prediction/x": Chatflow x not found"#
        );
    }
}
