//! Model abstraction
//!
//! The flow engine only depends on the `Model` trait; concrete providers
//! translate conversation history into their own wire formats.

mod anthropic;
mod error;
mod openai;
mod registry;
mod schema;
mod types;

pub use anthropic::AnthropicModel;
pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiModel;
pub use registry::{build_model, LlmConfig, Provider};
pub use schema::{ParameterKind, ToolParameter, ToolSchema};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Generation capability: given the history and the declared tools,
/// produce the next message (possibly requesting tool calls).
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, LlmError>;

    fn model_id(&self) -> &str;
}

/// Logging wrapper for models
pub struct LoggingModel {
    inner: Arc<dyn Model>,
    model_id: String,
}

impl LoggingModel {
    pub fn new(inner: Arc<dyn Model>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl Model for LoggingModel {
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate(history, tools).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    messages = history.len(),
                    tool_calls = response.tool_calls().count(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Model generation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Model generation failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Merge adjacent entries sharing a role key; providers that require strict
/// user/assistant alternation run their translated messages through this.
pub(crate) fn merge_adjacent<T>(items: Vec<(String, Vec<T>)>) -> Vec<(String, Vec<T>)> {
    let mut merged: Vec<(String, Vec<T>)> = Vec::with_capacity(items.len());
    for (role, mut blocks) in items {
        if blocks.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.append(&mut blocks),
            _ => merged.push((role, blocks)),
        }
    }
    merged
}
