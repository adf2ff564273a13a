use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A slash command invocation as delivered by Slack.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub user_name: String,
    pub text: String,
    #[serde(default)]
    pub channel_id: String,
}

impl CommandRequest {
    pub fn payload(&self) -> QueryPayload {
        QueryPayload { question: self.text.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub question: String,
}

/// Body returned by the prediction API. Bodies that are not valid JSON are kept verbatim.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiResult {
    ParsedJson(Value),
    RawText(String),
}

/// How the command handler interprets an [`ApiResult`].
#[derive(Clone, Debug, PartialEq)]
pub enum ResultShape<'a> {
    Absent,
    Text(&'a str),
    Object(&'a Value),
    Other(&'static str),
}

impl ApiResult {
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::ParsedJson(value),
            Err(_) => Self::RawText(body.to_owned()),
        }
    }

    /// Empty text, `null`, `false`, `0` and `""` carry no result.
    pub fn is_present(&self) -> bool {
        !matches!(self.shape(), ResultShape::Absent)
    }

    pub fn shape(&self) -> ResultShape<'_> {
        match self {
            Self::RawText(text) if text.is_empty() => ResultShape::Absent,
            Self::RawText(text) => ResultShape::Text(text),
            Self::ParsedJson(value) => match value {
                Value::Null | Value::Bool(false) => ResultShape::Absent,
                Value::String(text) if text.is_empty() => ResultShape::Absent,
                Value::String(text) => ResultShape::Text(text),
                Value::Number(number) if number.as_f64() == Some(0.0) => ResultShape::Absent,
                Value::Object(_) | Value::Array(_) => ResultShape::Object(value),
                Value::Bool(true) => ResultShape::Other("boolean"),
                Value::Number(_) => ResultShape::Other("number"),
            },
        }
    }

    /// The upstream `message` field, falling back to the whole result serialised as JSON.
    pub fn error_detail(&self) -> String {
        match self {
            Self::RawText(text) => Value::String(text.clone()).to_string(),
            Self::ParsedJson(value) => match value.get("message") {
                Some(Value::String(message)) => message.clone(),
                Some(message) if !message.is_null() => message.to_string(),
                _ => value.to_string(),
            },
        }
    }

    /// The answer carried in the `text` field of an object result.
    pub fn answer_text(&self) -> Option<String> {
        let Self::ParsedJson(value) = self else {
            return None;
        };

        match value.get("text") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}
