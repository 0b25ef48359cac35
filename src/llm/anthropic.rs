//! Anthropic Messages API provider

use super::types::{Choice, ContentPart, Message, ModelResponse, Role, ToolCallRequest, Usage};
use super::{merge_adjacent, LlmError, Model, ToolSchema};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicModel {
    client: Client,
    api_key: String,
    api_model: String,
    url: String,
    max_tokens: u32,
}

impl AnthropicModel {
    pub fn new(
        api_key: String,
        model: Option<String>,
        gateway: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<Self, LlmError> {
        let url = match gateway {
            Some(gw) => format!("{}/v1/messages", gw.trim_end_matches('/')),
            None => DEFAULT_URL.to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            api_model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            url,
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    fn translate_request(&self, history: &[Message], tools: &[ToolSchema]) -> AnthropicRequest {
        let system: Vec<AnthropicSystemBlock> = history
            .iter()
            .filter(|m| m.role == Role::System && !m.is_empty())
            .map(|m| AnthropicSystemBlock {
                r#type: "text".to_string(),
                text: m.content(),
            })
            .collect();

        let translated = history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| (Self::role_for(m.role).to_string(), Self::translate_parts(m)))
            .collect();

        let messages = merge_adjacent(translated)
            .into_iter()
            .map(|(role, content)| AnthropicMessage { role, content })
            .collect();

        let tools: Vec<AnthropicTool> = tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema(),
            })
            .collect();

        AnthropicRequest {
            model: self.api_model.clone(),
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }

    fn role_for(role: Role) -> &'static str {
        match role {
            Role::Ai => "assistant",
            Role::Human | Role::Tool | Role::System => "user",
        }
    }

    fn translate_parts(msg: &Message) -> Vec<AnthropicContentBlock> {
        msg.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } if text.trim().is_empty() => None,
                ContentPart::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
                ContentPart::ToolCall(call) => Some(AnthropicContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }),
                ContentPart::ToolResult {
                    call_id,
                    content,
                    is_error,
                    ..
                } => Some(AnthropicContentBlock::ToolResult {
                    tool_use_id: call_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                }),
            })
            .collect()
    }

    fn normalize_response(resp: AnthropicResponse) -> ModelResponse {
        let mut choice = Choice::default();
        for block in resp.content {
            match block {
                AnthropicContentBlock::Text { text } => choice.content.push_str(&text),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    choice.tool_calls.push(ToolCallRequest::new(id, name, input));
                }
                // not expected in responses
                AnthropicContentBlock::ToolResult { .. } => {}
            }
        }

        ModelResponse {
            choices: vec![choice],
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
            },
        }
    }

    fn classify_error(status: u16, body: &str) -> LlmError {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(body);

        let err = LlmError::from_status(status, message);
        match parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/retry_after"))
            .and_then(serde_json::Value::as_f64)
        {
            Some(secs) if status == 429 => err.with_retry_after(Duration::from_secs_f64(secs)),
            _ => err,
        }
    }
}

#[async_trait]
impl Model for AnthropicModel {
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, LlmError> {
        let request = self.translate_request(history, tools);

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
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
            return Err(Self::classify_error(status.as_u16(), &body));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(Self::normalize_response(parsed))
    }

    fn model_id(&self) -> &str {
        &self.api_model
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<AnthropicSystemBlock>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    r#type: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolParameter;
    use serde_json::json;

    fn model() -> AnthropicModel {
        AnthropicModel::new("key".into(), None, None, None).unwrap()
    }

    #[test]
    fn system_messages_become_system_blocks() {
        let history = vec![Message::system("prompt"), Message::human("hi")];
        let request = model().translate_request(&history, &[]);
        assert_eq!(request.system.len(), 1);
        assert_eq!(request.system[0].text, "prompt");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn alternation_is_enforced() {
        let call = ToolCallRequest::new("t1", "K8sRead", json!({"operation": "LIST"}));
        let history = vec![
            Message::human("list pods"),
            Message::ai("sure"),
            Message::tool_call(call.clone()),
            Message::tool_result(&call, "[ID: 1] ok", false),
            Message::human("thanks"),
        ];
        let tools = vec![ToolSchema::new(
            "K8sRead",
            "read",
            vec![ToolParameter::string("operation", "op").required()],
        )];

        let request = model().translate_request(&history, &tools);
        let roles: Vec<_> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(request.messages[1].content.len(), 2);
        assert_eq!(request.messages[2].content.len(), 2);
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn normalizes_mixed_content() {
        let resp: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Looking"},
                {"type": "tool_use", "id": "tu_1", "name": "K8sRead", "input": {"operation": "GET"}}
            ],
            "usage": {"input_tokens": 5, "output_tokens": 7}
        }))
        .unwrap();

        let normalized = AnthropicModel::normalize_response(resp);
        assert_eq!(normalized.content(), "Looking");
        assert_eq!(normalized.tool_calls().count(), 1);
        assert_eq!(normalized.usage.output_tokens, 7);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let body = r#"{"error": {"message": "slow down", "retry_after": 2.0}}"#;
        let err = AnthropicModel::classify_error(429, body);
        assert_eq!(err.retry_after, Some(Duration::from_secs(2)));
        assert!(err.message.contains("slow down"));
    }
}
