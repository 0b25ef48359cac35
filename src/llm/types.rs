//! Conversation and response types shared by the flow engine and providers

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Human,
    Ai,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Ai => "ai",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model (or synthesized by a replayed flow)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Content part of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolCall(ToolCallRequest),
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text { text: s.into() }
    }

    fn is_blank(&self) -> bool {
        matches!(self, ContentPart::Text { text } if text.trim().is_empty())
    }
}

/// One turn of conversation. Immutable once appended to a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Self {
        Self { role, parts }
    }

    /// Single text part message. Blank text yields an empty message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        let part = ContentPart::text(text);
        let parts = if part.is_blank() { vec![] } else { vec![part] };
        Self { role, parts }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::text(Role::Human, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::text(Role::Ai, text)
    }

    /// AI message recording a raw tool call
    pub fn tool_call(call: ToolCallRequest) -> Self {
        Self::new(Role::Ai, vec![ContentPart::ToolCall(call)])
    }

    pub fn tool_result(
        call: &ToolCallRequest,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::new(
            Role::Tool,
            vec![ContentPart::ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content: content.into(),
                is_error,
            }],
        )
    }

    /// Concatenated text parts
    pub fn content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.parts.iter().filter_map(|part| match part {
            ContentPart::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(ContentPart::is_blank)
    }
}

/// One alternative produced by the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Choice {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Model output: one or more choices plus usage accounting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ModelResponse {
    /// Single-choice text response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                content: content.into(),
                tool_calls: vec![],
            }],
            usage: Usage::default(),
        }
    }

    pub fn with_tool_call(mut self, call: ToolCallRequest) -> Self {
        if self.choices.is_empty() {
            self.choices.push(Choice::default());
        }
        self.choices[0].tool_calls.push(call);
        self
    }

    /// Text of the first choice
    pub fn content(&self) -> &str {
        self.choices.first().map_or("", |c| c.content.as_str())
    }

    /// Tool calls across all choices, in the order returned
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.choices.iter().flat_map(|c| c.tool_calls.iter())
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }
}

/// Usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
