//! Conversational flow engine
//!
//! Drains the chain one step at a time: each step sees the full history,
//! its rendered result is appended, and any tool calls it produced go
//! through the `ToolManager`. `run_loop` repeats the drain until the input
//! closes or the cancellation token fires; the history carries over, only
//! the step script is reset.

use super::{is_affirmative, Chain, FlowError, HistoryPolicy, InputProvider, LlmStep, Step};
use super::{HumanStep, StepResult};
use crate::llm::{Message, Model, Role};
use crate::tools::{FlowEffect, ToolManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Running,
    /// Blocked on a human step
    AwaitingHuman,
    Terminated,
}

/// Notified synchronously for every message appended to the history
pub trait Observer: Send + Sync {
    fn on_message_appended(&self, message: &Message);
}

/// Default observer: one tracing event per message
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_message_appended(&self, message: &Message) {
        let role = message.role.as_str();
        if message.role == Role::Tool {
            tracing::debug!(role, content = ?message.parts, "Message appended");
        } else {
            tracing::info!(
                role,
                content = %message.content(),
                tool_calls = message.tool_calls().count(),
                "Message appended"
            );
        }
    }
}

pub struct ConversationalFlow {
    system_prompt: Option<String>,
    model: Arc<dyn Model>,
    tools: ToolManager,
    chain: Chain,
    observer: Arc<dyn Observer>,
    history_policy: HistoryPolicy,
    state: FlowState,
}

impl ConversationalFlow {
    /// An empty system prompt seeds nothing
    pub fn new(system_prompt: impl Into<String>, model: Arc<dyn Model>, tools: ToolManager) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            system_prompt: (!system_prompt.trim().is_empty()).then_some(system_prompt),
            model,
            tools,
            chain: Chain::default(),
            observer: Arc::new(TracingObserver),
            history_policy: HistoryPolicy::default(),
            state: FlowState::Idle,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.history_policy = policy;
        self
    }

    /// Append a human turn followed by a model turn to the script
    pub fn human_step(&mut self, input: Arc<dyn InputProvider>) -> &mut Self {
        self.chain.push([
            Step::Human(HumanStep::new(input)),
            Step::Llm(LlmStep::new(Arc::clone(&self.model))),
        ]);
        self
    }

    /// Append arbitrary permanent steps to the script
    pub fn push_steps(&mut self, steps: impl IntoIterator<Item = Step>) -> &mut Self {
        self.chain.push(steps);
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    fn seed(&self) -> Vec<Message> {
        self.system_prompt
            .iter()
            .map(|prompt| Message::system(prompt.clone()))
            .collect()
    }

    /// Drain the script once from the start
    pub async fn once(&mut self, cancel: &CancellationToken) -> Result<Vec<Message>, FlowError> {
        let mut history = self.seed();
        self.chain.reset();
        self.execute(&mut history, cancel).await?;
        Ok(history)
    }

    /// Drain the script repeatedly until cancelled or the input closes.
    ///
    /// Model errors abort only the current drain; the partial history is
    /// kept and the next iteration starts from it.
    pub async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<Vec<Message>, FlowError> {
        let mut history = self.seed();
        let mut iteration = 0u64;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(iteration, "Flow loop cancelled");
                break;
            }

            self.chain.reset();
            if self.chain.is_empty() {
                tracing::warn!("Flow has no steps, stopping loop");
                break;
            }

            history = self.history_policy.apply(history);
            iteration += 1;
            tracing::debug!(iteration, messages = history.len(), "Starting drain");

            match self.execute(&mut history, cancel).await {
                Ok(()) => {}
                Err(e) if e.is_terminal() => {
                    tracing::info!(iteration, reason = %e, "Flow loop finished");
                    break;
                }
                Err(FlowError::Model(e)) => {
                    tracing::error!(iteration, error = %e, retryable = e.kind.is_retryable(), "Drain aborted by model error");
                }
                Err(e) => {
                    self.state = FlowState::Terminated;
                    return Err(e);
                }
            }
        }

        self.state = FlowState::Terminated;
        Ok(history)
    }

    /// Pull steps until the chain is exhausted, appending to `history`
    pub async fn execute(
        &mut self,
        history: &mut Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        let result = self.drain(history, cancel).await;
        self.state = match &result {
            Err(e) if e.is_terminal() => FlowState::Terminated,
            _ => FlowState::Idle,
        };
        result
    }

    async fn drain(
        &mut self,
        history: &mut Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        while let Some(step) = self.chain.next() {
            if cancel.is_cancelled() {
                return Err(FlowError::Cancelled);
            }

            self.state = if let Step::Human(_) = step {
                self.tools.reset_retries();
                FlowState::AwaitingHuman
            } else {
                FlowState::Running
            };

            let step = step
                .with_history(history.clone(), true)
                .with_call_options(self.tools.declarations());
            tracing::debug!(kind = step.kind(), cursor = self.chain.cursor(), "Executing step");
            let result = step.execute(cancel).await?;
            self.state = FlowState::Running;

            let message = result.render();
            if !message.is_empty() {
                self.append(history, message);
            }

            if let (Step::Human(human), StepResult::Input(reply)) = (&step, &result) {
                let requested = human.approval_request();
                if !requested.is_empty() {
                    if is_affirmative(reply) {
                        self.tools.approve_tools(requested);
                    } else {
                        tracing::info!(tools = ?requested, "Approval declined");
                    }
                }
            }

            let calls = result.tool_calls();
            if calls.is_empty() {
                continue;
            }

            let batch = match &step {
                Step::Tool(tool) if tool.preapproved => {
                    self.tools.execute_preapproved_calls(&calls, cancel).await
                }
                _ => self.tools.execute_tool_calls(&calls, cancel).await,
            };
            for message in batch.messages {
                self.append(history, message);
            }
            for effect in batch.effects {
                match effect {
                    FlowEffect::PushNext { step, temporary } => {
                        self.chain.push_next(step, temporary);
                    }
                }
            }
            if batch.requires_explaining {
                self.chain
                    .push_next(Step::Llm(LlmStep::new(Arc::clone(&self.model))), true);
            }
        }
        Ok(())
    }

    fn append(&self, history: &mut Vec<Message>, message: Message) {
        self.observer.on_message_appended(&message);
        history.push(message);
    }
}
