//! Steps: the atomic units a chain is made of

use super::FlowError;
use crate::llm::{Message, Model, ModelResponse, Role, ToolCallRequest, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Input provider failures
#[derive(Debug, Error)]
pub enum InputError {
    /// No more input will arrive (e.g. EOF on stdin)
    #[error("input closed")]
    Closed,
    #[error("input failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of human replies for a `HumanStep`
#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn read(&self, cancel: &CancellationToken) -> Result<String, InputError>;
}

/// Provider returning the same literal every time
#[derive(Debug, Clone)]
pub struct FixedInput(pub String);

impl FixedInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

#[async_trait]
impl InputProvider for FixedInput {
    async fn read(&self, _cancel: &CancellationToken) -> Result<String, InputError> {
        Ok(self.0.clone())
    }
}

/// One unit of conversation progression
#[derive(Clone)]
pub enum Step {
    Human(HumanStep),
    Llm(LlmStep),
    Tool(ToolStep),
}

impl Step {
    /// Attach history: replace it, or prepend it to what the step already carries.
    /// Human and tool steps carry no model context and ignore this.
    #[must_use]
    pub fn with_history(self, history: Vec<Message>, replace: bool) -> Self {
        match self {
            Step::Llm(step) => Step::Llm(step.with_history(history, replace)),
            other => other,
        }
    }

    /// Append declared tool schemas. No-op for human and tool steps.
    #[must_use]
    pub fn with_call_options(self, tools: Vec<ToolSchema>) -> Self {
        match self {
            Step::Llm(step) => Step::Llm(step.with_call_options(tools)),
            other => other,
        }
    }

    pub async fn execute(&self, cancel: &CancellationToken) -> Result<StepResult, FlowError> {
        match self {
            Step::Human(step) => step.execute(cancel).await,
            Step::Llm(step) => step.execute(cancel).await,
            Step::Tool(step) => Ok(step.execute()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::Human(_) => "human",
            Step::Llm(_) => "llm",
            Step::Tool(_) => "tool",
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Human(step) => f
                .debug_struct("Human")
                .field("approves", &step.approves)
                .finish_non_exhaustive(),
            Step::Llm(step) => f
                .debug_struct("Llm")
                .field("history", &step.history.len())
                .field("prompt", &step.prompt)
                .finish_non_exhaustive(),
            Step::Tool(step) => fmt::Debug::fmt(step, f),
        }
    }
}

impl From<HumanStep> for Step {
    fn from(step: HumanStep) -> Self {
        Step::Human(step)
    }
}

impl From<LlmStep> for Step {
    fn from(step: LlmStep) -> Self {
        Step::Llm(step)
    }
}

impl From<ToolStep> for Step {
    fn from(step: ToolStep) -> Self {
        Step::Tool(step)
    }
}

/// What executing a step produced
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// A human reply
    Input(String),
    /// A model generation
    Generation(ModelResponse),
    /// A pre-bound tool invocation, needing no model round-trip
    ToolCall(ToolCallRequest),
}

impl StepResult {
    /// Render as a history message. Tool-call-only results render empty; the
    /// raw calls are recorded by the governance layer instead.
    pub fn render(&self) -> Message {
        match self {
            StepResult::Input(text) => Message::human(text.clone()),
            StepResult::Generation(response) => Message::ai(response.content()),
            StepResult::ToolCall(_) => Message::new(Role::Ai, vec![]),
        }
    }

    pub fn tool_calls(&self) -> Vec<ToolCallRequest> {
        match self {
            StepResult::Input(_) => vec![],
            StepResult::Generation(response) => response.tool_calls().cloned().collect(),
            StepResult::ToolCall(call) => vec![call.clone()],
        }
    }
}

/// Waits for a human reply
#[derive(Clone)]
pub struct HumanStep {
    input: Arc<dyn InputProvider>,
    approves: Vec<String>,
}

impl HumanStep {
    pub fn new(input: Arc<dyn InputProvider>) -> Self {
        Self {
            input,
            approves: vec![],
        }
    }

    /// Fixed-text human turn
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new(Arc::new(FixedInput::new(text)))
    }

    /// Turn the step into an approval prompt: an affirmative reply approves
    /// the named tools.
    #[must_use]
    pub fn approving(mut self, tools: Vec<String>) -> Self {
        self.approves = tools;
        self
    }

    pub fn approval_request(&self) -> &[String] {
        &self.approves
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<StepResult, FlowError> {
        tokio::select! {
            () = cancel.cancelled() => Err(FlowError::Cancelled),
            reply = self.input.read(cancel) => Ok(StepResult::Input(reply?)),
        }
    }
}

/// Whether a human reply grants an approval request
pub fn is_affirmative(reply: &str) -> bool {
    matches!(reply.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Calls the model with its history and declared tools
#[derive(Clone)]
pub struct LlmStep {
    model: Arc<dyn Model>,
    history: Vec<Message>,
    prompt: Vec<Message>,
    tools: Vec<ToolSchema>,
}

impl LlmStep {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            history: vec![],
            prompt: vec![],
            tools: vec![],
        }
    }

    /// Step-local instruction sent after whatever history is attached
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        let message = Message::human(prompt);
        if !message.is_empty() {
            self.prompt.push(message);
        }
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>, replace: bool) -> Self {
        if replace {
            self.history = history;
        } else {
            let mut merged = history;
            merged.append(&mut self.history);
            self.history = merged;
        }
        self
    }

    #[must_use]
    pub fn with_call_options(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Messages the model will see
    pub fn request(&self) -> Vec<Message> {
        self.history.iter().chain(&self.prompt).cloned().collect()
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<StepResult, FlowError> {
        let request = self.request();
        tokio::select! {
            () = cancel.cancelled() => Err(FlowError::Cancelled),
            response = self.model.generate(&request, &self.tools) => {
                Ok(StepResult::Generation(response?))
            }
        }
    }
}

/// Pre-bound tool invocation (replayed from a persisted flow)
#[derive(Debug, Clone, PartialEq)]
pub struct ToolStep {
    pub name: String,
    pub arguments: Value,
    /// Granted a single-use approval right before routing
    pub preapproved: bool,
}

impl ToolStep {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            preapproved: false,
        }
    }

    #[must_use]
    pub fn preapproved(mut self) -> Self {
        self.preapproved = true;
        self
    }

    fn execute(&self) -> StepResult {
        StepResult::ToolCall(ToolCallRequest::new(
            format!("flow-{}", uuid::Uuid::new_v4()),
            self.name.clone(),
            self.arguments.clone(),
        ))
    }
}
