//! Tools the model can call, and the governance layer in front of them
//!
//! Tools are stateless with respect to the flow: everything a call needs
//! arrives through `ToolContext`, and anything a call wants to change in the
//! step chain is returned as a `FlowEffect` for the engine to apply.

mod add_step;
mod approval;
mod command;
mod flow_export;
mod flow_import;
mod helm;
mod kubernetes;
mod manager;

pub use add_step::AddStepTool;
pub use approval::RequestApprovalTool;
pub use command::CommandRunner;
pub use flow_export::ExportFlowTool;
pub use flow_import::ImportFlowTool;
pub use helm::HelmTool;
pub use kubernetes::{K8sDiscoveryTool, K8sReadTool, K8sWriteTool};
pub use manager::{
    CallLog, ToolCallBatch, ToolCallRecord, ToolManager, APPROVAL_REQUIRED_MESSAGE,
    RETRY_CEILING_MESSAGE,
};

use crate::flows::Step;
use crate::llm::{ToolParameter, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Appended to the description of every tool that needs approval
pub const APPROVAL_NOTICE: &str =
    "IMPORTANT: THIS TOOL REQUIRES EXPLICIT USER CONSENT, USE 'RequestApprovalForTools' TOOL FIRST.";

/// Change a tool asks the engine to make to the step chain
#[derive(Debug, Clone)]
pub enum FlowEffect {
    /// Insert at the cursor so the step runs next
    PushNext { step: Step, temporary: bool },
}

/// Result from tool execution
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    pub effects: Vec<FlowEffect>,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            effects: vec![],
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            effects: vec![],
        }
    }

    #[must_use]
    pub fn push_next(mut self, step: impl Into<Step>, temporary: bool) -> Self {
        self.effects.push(FlowEffect::PushNext {
            step: step.into(),
            temporary,
        });
        self
    }
}

/// Context for one tool invocation
#[derive(Clone)]
pub struct ToolContext {
    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,
    /// Calls accepted so far, by record id
    pub calls: Arc<CallLog>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, calls: Arc<CallLog>) -> Self {
        Self { cancel, calls }
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    fn parameters(&self) -> Vec<ToolParameter>;

    /// Whether a successful call should be followed by a model turn
    fn requires_explaining(&self) -> bool;

    fn requires_approval(&self) -> bool;

    /// Execute the tool. Tools that run subprocesses should watch `ctx.cancel`.
    async fn call(&self, input: Value, ctx: ToolContext) -> ToolOutput;

    /// Schema offered to the model, with the approval notice when applicable
    fn declaration(&self) -> ToolSchema {
        let mut description = self.description();
        if self.requires_approval() {
            description = format!("{description}\n{APPROVAL_NOTICE}");
        }
        ToolSchema::new(self.name(), description, self.parameters())
    }
}

/// Parse tool input, mapping failures to a tool error message
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, ToolOutput> {
    serde_json::from_value(input).map_err(|e| ToolOutput::error(format!("Invalid input: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTool;

    #[test]
    fn declaration_carries_approval_notice() {
        let gated = MockTool::new("Gated").approval(true);
        let open = MockTool::new("Open");

        assert!(gated.declaration().description.ends_with(APPROVAL_NOTICE));
        assert!(!open.declaration().description.contains(APPROVAL_NOTICE));
        assert_eq!(gated.declaration().name, "Gated");
    }

    #[test]
    fn output_collects_effects_in_order() {
        let out = ToolOutput::success("ok")
            .push_next(crate::flows::HumanStep::fixed("a"), true)
            .push_next(crate::flows::HumanStep::fixed("b"), false);
        assert_eq!(out.effects.len(), 2);
        assert!(matches!(
            out.effects[1],
            FlowEffect::PushNext { temporary: false, .. }
        ));
    }
}
