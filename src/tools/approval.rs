//! RequestApprovalForTools tool - asks the human to approve gated tools

use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::flows::{HumanStep, InputProvider, LlmStep};
use crate::llm::{Model, ToolParameter};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const APPROVAL_TEXT: &str = "The human will be prompted for approval after your next turn. \
Explain to the user that they should explicitly write 'yes' to approve the tools to be run. \
Be transparent and let them know exactly what they're approving.";

pub struct RequestApprovalTool {
    model: Arc<dyn Model>,
    input: Arc<dyn InputProvider>,
}

impl RequestApprovalTool {
    pub fn new(model: Arc<dyn Model>, input: Arc<dyn InputProvider>) -> Self {
        Self { model, input }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalInput {
    tool_names: Vec<String>,
}

#[async_trait]
impl Tool for RequestApprovalTool {
    fn name(&self) -> &'static str {
        "RequestApprovalForTools"
    }

    fn description(&self) -> String {
        "Request explicit approval before executing tools that require approval. \
         An approval is valid until the tool's next successful execution."
            .to_string()
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::string_array(
            "toolNames",
            "The names of the tools to request approval for.",
        )
        .required()]
    }

    fn requires_explaining(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn call(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let input: ApprovalInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        if input.tool_names.is_empty() {
            return ToolOutput::error("toolNames must not be empty");
        }

        let human = HumanStep::new(Arc::clone(&self.input)).approving(input.tool_names);
        // Reverse order: each push lands at the cursor
        ToolOutput::success(APPROVAL_TEXT)
            .push_next(LlmStep::new(Arc::clone(&self.model)), true)
            .push_next(human, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{Chain, Step};
    use crate::testing::{test_context, MockModel, ScriptedInput};
    use crate::tools::FlowEffect;
    use serde_json::json;

    #[tokio::test]
    async fn splices_human_then_llm() {
        let tool = RequestApprovalTool::new(
            Arc::new(MockModel::new()),
            Arc::new(ScriptedInput::new(["yes"])),
        );
        let out = tool
            .call(json!({"toolNames": ["K8sWrite"]}), test_context())
            .await;
        assert!(out.success);

        let mut chain: Chain = Chain::default();
        for effect in out.effects {
            let FlowEffect::PushNext { step, temporary } = effect;
            chain.push_next(step, temporary);
        }

        let Some(Step::Human(human)) = chain.next() else {
            panic!("expected human step first");
        };
        assert_eq!(human.approval_request(), ["K8sWrite".to_string()]);
        assert!(matches!(chain.next(), Some(Step::Llm(_))));
        chain.reset();
        assert!(chain.is_empty());
    }

    #[tokio::test]
    async fn requires_tool_names() {
        let tool = RequestApprovalTool::new(
            Arc::new(MockModel::new()),
            Arc::new(ScriptedInput::new(["yes"])),
        );
        assert!(!tool.call(json!({"toolNames": []}), test_context()).await.success);
        assert!(!tool.call(json!({}), test_context()).await.success);
    }
}
