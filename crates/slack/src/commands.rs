use async_trait::async_trait;
use flowbot_core::config::ReplyConfig;
use flowbot_core::{ApiResult, CommandRequest, ResultShape};
use flowbot_flowise::PredictionClient;
use tracing::{error, info};

use crate::blocks::{self, MessageTemplate};
use crate::events::{EventContext, EventHandler, HandlerResult};

pub const NO_RESULT_MESSAGE: &str = "API 응답 결과가 없습니다.";
pub const MISSING_ANSWER: &str = "답변을 가져올 수 없습니다.";

/// Answers the configured slash command by forwarding its text to the prediction API.
pub struct AskCommandHandler<C> {
    command: String,
    client: C,
    reply: ReplyConfig,
}

impl<C> AskCommandHandler<C>
where
    C: PredictionClient,
{
    pub fn new(command: impl Into<String>, client: C, reply: ReplyConfig) -> Self {
        Self { command: command.into(), client, reply }
    }

    pub async fn answer(&self, request: &CommandRequest, ctx: &EventContext) -> MessageTemplate {
        match self.client.query(&request.payload()).await {
            Ok(result) => {
                info!(
                    event_name = "flowise.query.completed",
                    correlation_id = %ctx.correlation_id,
                    user = %request.user_name,
                    "prediction api answered"
                );
                render_result(&result, request, &self.reply)
            }
            Err(query_error) => {
                error!(
                    event_name = "flowise.query.failed",
                    correlation_id = %ctx.correlation_id,
                    user = %request.user_name,
                    error = %query_error,
                    "error fetching data from prediction api"
                );
                error_reply(&query_error.to_string())
            }
        }
    }
}

#[async_trait]
impl<C> EventHandler for AskCommandHandler<C>
where
    C: PredictionClient + 'static,
{
    fn command(&self) -> &str {
        &self.command
    }

    async fn handle(&self, request: &CommandRequest, ctx: &EventContext) -> HandlerResult {
        HandlerResult::Responded(self.answer(request, ctx).await)
    }
}

// Any string result is reported as an error: successful answers are always objects upstream.
pub fn render_result(
    result: &ApiResult,
    request: &CommandRequest,
    reply: &ReplyConfig,
) -> MessageTemplate {
    match result.shape() {
        ResultShape::Absent => error_reply(NO_RESULT_MESSAGE),
        ResultShape::Text(text) => error_reply(text),
        ResultShape::Object(_) => {
            let answer = result.answer_text();
            blocks::answer_message(
                reply,
                &request.user_name,
                &request.text,
                answer.as_deref().unwrap_or(MISSING_ANSWER),
            )
        }
        ResultShape::Other(kind) => error_reply(&format!("알 수 없는 API 응답 결과({kind})")),
    }
}

pub fn error_reply(detail: &str) -> MessageTemplate {
    MessageTemplate::plain(format!("오류: {detail}"))
}
