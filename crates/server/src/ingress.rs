use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use flowbot_slack::{
    blocks::MessageTemplate,
    commands::error_reply,
    events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent},
    signature::{RequestVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    web::{PostError, ReplyPoster},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const EVENTS_PATH: &str = "/slack/events";

#[derive(Clone)]
pub struct IngressState {
    verifier: Arc<RequestVerifier>,
    dispatcher: Arc<EventDispatcher>,
    poster: Arc<dyn ReplyPoster>,
}

impl IngressState {
    pub fn new(
        verifier: RequestVerifier,
        dispatcher: EventDispatcher,
        poster: Arc<dyn ReplyPoster>,
    ) -> Self {
        Self { verifier: Arc::new(verifier), dispatcher: Arc::new(dispatcher), poster }
    }
}

pub fn router(state: IngressState) -> Router {
    Router::new().route(EVENTS_PATH, post(slack_events)).with_state(state)
}

/// Acknowledges a slash command with an empty `200` and answers it on a separate task.
pub async fn slack_events(
    State(state): State<IngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let timestamp = header_value(&headers, TIMESTAMP_HEADER);
    let signature = header_value(&headers, SIGNATURE_HEADER);
    if let Err(error) = state.verifier.verify_now(timestamp, signature, &body) {
        warn!(
            event_name = "ingress.slack.rejected",
            error = %error,
            "slack request failed signature verification"
        );
        return StatusCode::UNAUTHORIZED;
    }

    let correlation_id = Uuid::new_v4().to_string();
    let envelope = match SlackEnvelope::from_form(correlation_id, &body) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(event_name = "ingress.slack.malformed", error = %error, "undecodable slack request");
            return StatusCode::BAD_REQUEST;
        }
    };

    if !state.dispatcher.handles(&envelope) {
        debug!(
            event_name = "ingress.slack.ignored",
            correlation_id = %envelope.envelope_id,
            event_type = envelope.event.event_type(),
            "acknowledging slack request without handler"
        );
        return StatusCode::OK;
    }

    info!(
        event_name = "ingress.slack.ack_sent",
        correlation_id = %envelope.envelope_id,
        event_type = envelope.event.event_type(),
        "acknowledged slash command"
    );
    tokio::spawn(respond(state, envelope));

    StatusCode::OK
}

async fn respond(state: IngressState, envelope: SlackEnvelope) {
    let SlackEvent::SlashCommand(request) = &envelope.event else {
        return;
    };
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };

    let HandlerResult::Responded(message) = state.dispatcher.dispatch(&envelope, &context).await
    else {
        return;
    };

    let Err(error) = post_reply(&state, &request.channel_id, &message, &context).await else {
        return;
    };
    if message.is_plain() {
        return;
    }

    // A rejected card still owes the user an error notice.
    let notice = error_reply(&error.to_string());
    let _ = post_reply(&state, &request.channel_id, &notice, &context).await;
}

async fn post_reply(
    state: &IngressState,
    channel_id: &str,
    message: &MessageTemplate,
    context: &EventContext,
) -> Result<(), PostError> {
    let result = state.poster.post(channel_id, message).await;
    match &result {
        Ok(()) => info!(
            event_name = "egress.slack.reply_posted",
            correlation_id = %context.correlation_id,
            channel_id = %channel_id,
            blocks = message.blocks.len(),
            "reply posted"
        ),
        Err(error) => warn!(
            event_name = "egress.slack.reply_failed",
            correlation_id = %context.correlation_id,
            channel_id = %channel_id,
            blocks = message.blocks.len(),
            error = %error,
            "failed to post reply"
        ),
    }
    result
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use flowbot_core::config::ReplyConfig;
    use flowbot_core::{ApiResult, QueryPayload};
    use flowbot_flowise::client::classify_response;
    use flowbot_flowise::{PredictionClient, QueryError};
    use flowbot_slack::{
        blocks::MessageTemplate,
        commands::AskCommandHandler,
        events::EventDispatcher,
        signature::RequestVerifier,
        web::{PostError, ReplyPoster},
    };
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use super::{router, IngressState, EVENTS_PATH};

    const SECRET: &str = "test-signing-secret";

    struct CannedClient {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl PredictionClient for CannedClient {
        async fn query(&self, _payload: &QueryPayload) -> Result<ApiResult, QueryError> {
            classify_response(self.status, "http://flowise/api", ApiResult::from_body(self.body))
        }
    }

    struct ChannelPoster {
        sender: mpsc::UnboundedSender<(String, MessageTemplate)>,
    }

    #[async_trait]
    impl ReplyPoster for ChannelPoster {
        async fn post(&self, channel_id: &str, message: &MessageTemplate) -> Result<(), PostError> {
            self.sender
                .send((channel_id.to_owned(), message.clone()))
                .map_err(|error| PostError::Transport(error.to_string()))
        }
    }

    /// Accepts plain replies and rejects every Block Kit message.
    struct BlockRejectingPoster {
        sender: mpsc::UnboundedSender<(String, MessageTemplate)>,
    }

    #[async_trait]
    impl ReplyPoster for BlockRejectingPoster {
        async fn post(&self, channel_id: &str, message: &MessageTemplate) -> Result<(), PostError> {
            if !message.is_plain() {
                return Err(PostError::Api("invalid_blocks".to_owned()));
            }
            self.sender
                .send((channel_id.to_owned(), message.clone()))
                .map_err(|error| PostError::Transport(error.to_string()))
        }
    }

    fn app(
        status: u16,
        body: &'static str,
    ) -> (Router, mpsc::UnboundedReceiver<(String, MessageTemplate)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (app_with_poster(status, body, Arc::new(ChannelPoster { sender })), receiver)
    }

    fn app_with_poster(status: u16, body: &'static str, poster: Arc<dyn ReplyPoster>) -> Router {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(AskCommandHandler::new(
            "/ask",
            CannedClient { status, body },
            ReplyConfig::default(),
        ));
        let state =
            IngressState::new(RequestVerifier::new(SECRET.to_owned().into()), dispatcher, poster);
        router(state)
    }

    fn signed_request(body: &str) -> Request<Body> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = RequestVerifier::new(SECRET.to_owned().into())
            .sign(&timestamp, body.as_bytes())
            .expect("sign");

        Request::builder()
            .method("POST")
            .uri(EVENTS_PATH)
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-slack-request-timestamp", timestamp)
            .header("x-slack-signature", signature)
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    async fn next_reply(
        receiver: &mut mpsc::UnboundedReceiver<(String, MessageTemplate)>,
    ) -> (String, MessageTemplate) {
        tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("reply should arrive")
            .expect("poster channel open")
    }

    #[tokio::test]
    async fn acknowledges_and_posts_answer_card() {
        let (app, mut replies) = app(200, r#"{"text":"42"}"#);

        let response = app
            .oneshot(signed_request(
                "command=%2Fask&text=what+is+it&user_name=jane&user_id=U1&channel_id=C1",
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.expect("body");
        assert!(body.is_empty(), "ack must carry no content");

        let (channel, message) = next_reply(&mut replies).await;
        assert_eq!(channel, "C1");
        assert_eq!(message.fallback_text, "42");
        let rendered = serde_json::to_string(&message.blocks).expect("blocks serialise");
        assert!(rendered.contains("what is it"));
        assert!(rendered.contains("42"));
    }

    #[tokio::test]
    async fn posts_error_notice_for_stopped_service() {
        let (app, mut replies) = app(503, r#"{"message":"down"}"#);

        let response = app
            .oneshot(signed_request("command=%2Fask&text=q&user_name=jane&channel_id=C9"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let (channel, message) = next_reply(&mut replies).await;
        assert_eq!(channel, "C9");
        assert_eq!(message, MessageTemplate::plain("오류: flowise service is stopped(503): down"));
    }

    #[tokio::test]
    async fn rejected_answer_card_falls_back_to_error_notice() {
        let (sender, mut replies) = mpsc::unbounded_channel();
        let app = app_with_poster(
            200,
            r#"{"text":"42"}"#,
            Arc::new(BlockRejectingPoster { sender }),
        );

        let response = app
            .oneshot(signed_request("command=%2Fask&text=q&user_name=jane&channel_id=C7"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let (channel, message) = next_reply(&mut replies).await;
        assert_eq!(channel, "C7");
        assert_eq!(
            message,
            MessageTemplate::plain("오류: slack web api rejected message: invalid_blocks")
        );
    }

    #[tokio::test]
    async fn rejects_unsigned_requests() {
        let (app, mut replies) = app(200, "{}");

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(EVENTS_PATH)
                    .body(Body::from("command=%2Fask&text=q&channel_id=C1"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(replies.try_recv().is_err());
    }

    #[tokio::test]
    async fn acknowledges_other_commands_without_reply() {
        let (app, mut replies) = app(200, r#"{"text":"42"}"#);

        let response = app
            .oneshot(signed_request("command=%2Fquote&text=help&user_name=jane&channel_id=C1"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        tokio::task::yield_now().await;
        assert!(replies.try_recv().is_err());
    }

    #[tokio::test]
    async fn acknowledges_ssl_check() {
        let (app, _replies) = app(200, "{}");

        let response = app.oneshot(signed_request("ssl_check=1&token=abc")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
