//! `OpenAI` and `OpenAI`-compatible chat completions provider

use super::types::{Choice, ContentPart, Message, ModelResponse, Role, ToolCallRequest, Usage};
use super::{LlmError, Model, ToolSchema};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// `OpenAI`-compatible model service
pub struct OpenAiModel {
    client: Client,
    api_key: String,
    api_model: String,
    endpoint: String,
    max_tokens: Option<u32>,
}

impl OpenAiModel {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<Self, LlmError> {
        let endpoint = format!(
            "{}/chat/completions",
            base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            api_model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint,
            max_tokens,
        })
    }

    fn translate_request(&self, history: &[Message], tools: &[ToolSchema]) -> OpenAiRequest {
        let mut messages: Vec<OpenAiMessage> = Vec::new();

        let system_text = history
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::content)
            .collect::<Vec<_>>()
            .join("\n\n");
        if !system_text.is_empty() {
            messages.push(OpenAiMessage::plain("system", system_text));
        }

        for msg in history.iter().filter(|m| m.role != Role::System) {
            for translated in Self::translate_message(msg) {
                match messages.last_mut() {
                    Some(last) if last.role == "assistant" && translated.role == "assistant" => {
                        last.absorb(translated);
                    }
                    _ => messages.push(translated),
                }
            }
        }

        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| OpenAiTool {
                        r#type: "function".to_string(),
                        function: OpenAiFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAiRequest {
            model: self.api_model.clone(),
            messages,
            tools,
            max_tokens: self.max_tokens,
        }
    }

    /// Translate a message. Tool results become separate "tool" role messages.
    fn translate_message(msg: &Message) -> Vec<OpenAiMessage> {
        let role = match msg.role {
            Role::Ai => "assistant",
            Role::Tool => "tool",
            Role::Human | Role::System => "user",
        };

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut messages = Vec::new();

        for part in &msg.parts {
            match part {
                ContentPart::Text { text } if !text.is_empty() => text_parts.push(text.clone()),
                ContentPart::Text { .. } => {}
                ContentPart::ToolCall(call) => tool_calls.push(OpenAiToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: serde_json::to_string(&call.arguments)
                            .unwrap_or_else(|_| "{}".to_string()),
                    },
                }),
                ContentPart::ToolResult {
                    call_id,
                    content,
                    is_error,
                    ..
                } => messages.push(OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(if *is_error {
                        format!("Error: {content}")
                    } else {
                        content.clone()
                    }),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                }),
            }
        }

        if !text_parts.is_empty() || !tool_calls.is_empty() {
            let role = if role == "tool" { "user" } else { role };
            messages.insert(
                0,
                OpenAiMessage {
                    role: role.to_string(),
                    content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                },
            );
        }

        messages
    }

    fn normalize_response(resp: OpenAiResponse) -> Result<ModelResponse, LlmError> {
        if resp.choices.is_empty() {
            return Err(LlmError::unknown("No choices in response"));
        }

        let choices = resp
            .choices
            .into_iter()
            .map(|choice| {
                let tool_calls = choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|tc| !tc.function.name.is_empty())
                    .map(|tc| {
                        // Unparseable arguments are kept verbatim so the tool reports them
                        let arguments = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or(serde_json::Value::String(tc.function.arguments));
                        ToolCallRequest::new(tc.id, tc.function.name, arguments)
                    })
                    .collect();
                Choice {
                    content: choice.message.content.unwrap_or_default(),
                    tool_calls,
                }
            })
            .collect();

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(ModelResponse { choices, usage })
    }
}

#[async_trait]
impl Model for OpenAiModel {
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, LlmError> {
        let request = self.translate_request(history, tools);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
                .map_or(body, |err| err.error.message);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let parsed: OpenAiResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.api_model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn plain(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn absorb(&mut self, other: OpenAiMessage) {
        self.content = match (self.content.take(), other.content) {
            (Some(a), Some(b)) => Some(format!("{a}\n{b}")),
            (a, b) => a.or(b),
        };
        if let Some(mut calls) = other.tool_calls {
            self.tool_calls.get_or_insert_with(Vec::new).append(&mut calls);
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}
