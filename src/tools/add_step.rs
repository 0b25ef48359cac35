//! AddStep tool - lets the model grant itself another turn

use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::flows::LlmStep;
use crate::llm::{Model, ToolParameter};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub struct AddStepTool {
    model: Arc<dyn Model>,
}

impl AddStepTool {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

#[derive(Debug, Deserialize)]
struct AddStepInput {
    prompt: String,
}

#[async_trait]
impl Tool for AddStepTool {
    fn name(&self) -> &'static str {
        "AddStep"
    }

    fn description(&self) -> String {
        "Extend the execution flow with a step. Use this when a request needs a multi-step plan: \
         plan one step at a time and add each step with this tool. Also useful when you need to \
         run again before giving the turn back to the user."
            .to_string()
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::string(
            "prompt",
            "The instructional prompt for the added step, to be read by you in the next iteration.",
        )
        .required()]
    }

    fn requires_explaining(&self) -> bool {
        false
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn call(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let input: AddStepInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        if input.prompt.trim().is_empty() {
            return ToolOutput::error("prompt must not be empty");
        }

        // Temporary: the prompt only makes sense for the current cycle
        let step = LlmStep::new(Arc::clone(&self.model)).with_prompt(input.prompt.clone());
        ToolOutput::success(format!("Added AI step with prompt: {}", input.prompt))
            .push_next(step, true)
    }
}
