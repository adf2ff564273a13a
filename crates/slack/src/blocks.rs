use flowbot_core::config::ReplyConfig;
use serde::Serialize;

pub const MAX_HEADER_CHARS: usize = 150;
pub const MAX_SECTION_CHARS: usize = 3000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        emoji: Option<bool>,
    },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into(), emoji: None }
    }

    pub fn plain_emoji(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into(), emoji: Some(true) }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text, .. } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain_emoji(label),
            value: None,
            url: None,
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Divider,
    Header {
        block_id: String,
        text: TextObject,
    },
    Section {
        block_id: String,
        text: TextObject,
        #[serde(skip_serializing_if = "Option::is_none")]
        accessory: Option<ButtonElement>,
    },
    Context {
        block_id: String,
        elements: Vec<TextObject>,
    },
}

/// A reply ready to post. Plain replies have no blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { fallback_text: text.into(), blocks: Vec::new() }
    }

    pub fn is_plain(&self) -> bool {
        self.blocks.is_empty()
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    /// Slack rejects empty header text, so an empty title renders as a single space.
    pub fn header(mut self, block_id: impl Into<String>, title: &str) -> Self {
        let title = if title.trim().is_empty() { " " } else { title };
        let text = TextObject::plain(truncate(title, MAX_HEADER_CHARS));
        self.blocks.push(Block::Header { block_id: block_id.into(), text });
        self
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        let (text, accessory) = builder.build();
        self.blocks.push(Block::Section { block_id: block_id.into(), text, accessory });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
    accessory: Option<ButtonElement>,
}

impl SectionBuilder {
    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(truncate(&text.into(), MAX_SECTION_CHARS)));
        self
    }

    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.accessory = Some(button);
        self
    }

    fn build(self) -> (TextObject, Option<ButtonElement>) {
        (self.text.unwrap_or_else(|| TextObject::plain("")), self.accessory)
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// Cuts `text` to at most `max_chars` characters, ending with `…` when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }

    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// The answer card: title, asker, question, answer and the reference-material button.
pub fn answer_message(
    reply: &ReplyConfig,
    user_name: &str,
    question: &str,
    answer: &str,
) -> MessageTemplate {
    MessageBuilder::new(answer.to_owned())
        .divider()
        .header("answer.title.v1", &reply.bot_title)
        .context("answer.user.v1", |context| {
            context.plain(format!("@{user_name}"));
        })
        .divider()
        .section("answer.question.v1", |section| {
            section.mrkdwn(format!("🔷 *질문*\n{question}"));
        })
        .divider()
        .section("answer.body.v1", |section| {
            section.mrkdwn(format!("🔶 *답변*\n{answer}"));
        })
        .divider()
        .section("answer.info.v1", |section| {
            section.mrkdwn(reply.info_text.clone()).button(
                ButtonElement::new(reply.button_action_id.clone(), reply.button_label.clone())
                    .value(reply.button_value.clone())
                    .url(reply.button_url.clone()),
            );
        })
        .build()
}
