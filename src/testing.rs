//! Mock implementations for testing
//!
//! These mocks let the engine, tools and governance layer run without
//! network access, a terminal, or a cluster.

use crate::flows::{InputError, InputProvider, Step};
use crate::llm::{LlmError, Message, Model, ModelResponse, ToolCallRequest, ToolParameter, ToolSchema};
use crate::tools::{CallLog, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Model
// ============================================================================

/// One recorded `generate` call
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub history: Vec<Message>,
    /// Names of the declared tools
    pub tools: Vec<String>,
}

/// Model returning queued responses. An empty queue is a network error.
#[derive(Default)]
pub struct MockModel {
    responses: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, response: ModelResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            history: history.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Mock Input
// ============================================================================

/// Replies in order, then reports the input closed
pub struct ScriptedInput {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedInput {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl InputProvider for ScriptedInput {
    async fn read(&self, _cancel: &CancellationToken) -> Result<String, InputError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(InputError::Closed)
    }
}

/// Never replies
pub struct PendingInput;

#[async_trait]
impl InputProvider for PendingInput {
    async fn read(&self, _cancel: &CancellationToken) -> Result<String, InputError> {
        std::future::pending().await
    }
}

// ============================================================================
// Mock Tool
// ============================================================================

/// Configurable tool counting its invocations
pub struct MockTool {
    name: String,
    approval: bool,
    explaining: bool,
    failing: bool,
    effects: Vec<Step>,
    invocations: AtomicUsize,
}

impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            approval: false,
            explaining: false,
            failing: false,
            effects: vec![],
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn approval(mut self, required: bool) -> Self {
        self.approval = required;
        self
    }

    pub fn explaining(mut self, required: bool) -> Self {
        self.explaining = required;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Emit a temporary push of `step` on every call
    pub fn with_effect(mut self, step: impl Into<Step>) -> Self {
        self.effects.push(step.into());
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Mock tool {}", self.name)
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![]
    }

    fn requires_explaining(&self) -> bool {
        self.explaining
    }

    fn requires_approval(&self) -> bool {
        self.approval
    }

    async fn call(&self, _input: Value, _ctx: ToolContext) -> ToolOutput {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let mut output = if self.failing {
            ToolOutput::error(format!("{} failed (call {n})", self.name))
        } else {
            ToolOutput::success(format!("{} ok (call {n})", self.name))
        };
        for step in &self.effects {
            output = output.push_next(step.clone(), true);
        }
        output
    }
}

// ============================================================================
// Tool contexts
// ============================================================================

pub fn test_context() -> ToolContext {
    ToolContext::new(CancellationToken::new(), Arc::new(CallLog::default()))
}

/// Context whose call log holds `calls` as records 1..=n
pub fn context_with_calls(calls: &[ToolCallRequest]) -> ToolContext {
    let mut log = CallLog::default();
    for call in calls {
        log.record(call);
    }
    ToolContext::new(CancellationToken::new(), Arc::new(log))
}
