//! Conversational flows
//!
//! A flow is a `Chain` of `Step`s drained by `ConversationalFlow`. Human
//! steps wait for input, LLM steps call the model with the full history,
//! tool steps replay pre-bound calls. Tool calls are routed through the
//! governance layer in `crate::tools`.

mod chain;
mod conversational;
mod history;
mod step;

pub use chain::Chain;
pub use conversational::{ConversationalFlow, FlowState, Observer, TracingObserver};
pub use history::HistoryPolicy;
pub use step::{
    is_affirmative, FixedInput, HumanStep, InputError, InputProvider, LlmStep, Step, StepResult,
    ToolStep,
};

use crate::llm::LlmError;
use thiserror::Error;

/// Errors that abort a drain
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("model error: {0}")]
    Model(#[from] LlmError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("flow cancelled")]
    Cancelled,
}

impl FlowError {
    /// Whether the flow can never make progress again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowError::Cancelled | FlowError::Input(InputError::Closed)
        )
    }
}
