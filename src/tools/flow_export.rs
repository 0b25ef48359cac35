//! ExportKueryFlow tool - persists a slice of the conversation as a flow

use super::{parse_input, CallLog, Tool, ToolContext, ToolOutput};
use crate::llm::{ParameterKind, ToolParameter};
use crate::store::{Flow, FlowStep, FlowStore, FunctionCall, StoreError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub struct ExportFlowTool {
    store: Arc<dyn FlowStore>,
    default_namespace: String,
}

impl ExportFlowTool {
    pub fn new(store: Arc<dyn FlowStore>, default_namespace: impl Into<String>) -> Self {
        Self {
            store,
            default_namespace: default_namespace.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExportInput {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    steps: Vec<StepRef>,
}

/// One requested step: a recorded call, a literal instruction, or a human marker
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepRef {
    #[serde(rename = "toolCallID", default)]
    tool_call_id: Option<String>,
    #[serde(default)]
    args_to_recalculate: Vec<String>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    human_intervention: bool,
}

impl StepRef {
    fn resolve(&self, index: usize, calls: &CallLog) -> Result<FlowStep, String> {
        let kinds = usize::from(self.tool_call_id.is_some())
            + usize::from(self.instruction.is_some())
            + usize::from(self.human_intervention);
        if kinds != 1 {
            return Err(format!(
                "step {index}: exactly one of toolCallID, instruction or humanIntervention must be set"
            ));
        }

        if let Some(reference) = &self.tool_call_id {
            let record = calls
                .resolve(reference)
                .ok_or_else(|| format!("tool call not found: {reference}"))?;
            return Ok(FlowStep::ToolCall {
                function: FunctionCall {
                    name: record.name.clone(),
                    arguments: record.arguments.clone(),
                },
                args_to_recalculate: self.args_to_recalculate.clone(),
            });
        }
        if !self.args_to_recalculate.is_empty() {
            return Err(format!(
                "step {index}: argsToRecalculate only applies to tool calls"
            ));
        }
        match &self.instruction {
            Some(text) => Ok(FlowStep::Instruction { text: text.clone() }),
            None => Ok(FlowStep::HumanIntervention),
        }
    }
}

#[async_trait]
impl Tool for ExportFlowTool {
    fn name(&self) -> &'static str {
        "ExportKueryFlow"
    }

    fn description(&self) -> String {
        "Export a KueryFlow from the active conversation. A KueryFlow is a persisted sequence of \
         tool calls that can later be executed with the ImportKueryFlow tool.\n\
         A flow is deterministic if its tool calls carry concrete argument values, or \
         indeterministic if some arguments must be recalculated upon execution. \
         ALWAYS prefer deterministic tool calls when possible. \
         Reference tool calls by the ID shown in their result, e.g. \"[ID: 3]\" is toolCallID \"3\". \
         The user should be fully aware of what you're exporting before it is done."
            .to_string()
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        let step = ParameterKind::Object(vec![
            ToolParameter::string("toolCallID", "The ID of a tool call in the history."),
            ToolParameter::string_array(
                "argsToRecalculate",
                "Names of arguments of the tool call that should be recalculated upon execution.",
            ),
            ToolParameter::string(
                "instruction",
                "A literal instruction for you to follow at this point of the flow.",
            ),
            ToolParameter::boolean(
                "humanIntervention",
                "Set to true to hand control to the user at this point of the flow.",
            ),
        ]);

        vec![
            ToolParameter::string(
                "name",
                "The name of the KueryFlow. Prefer short, lowercase and precise names following \
                 kubernetes naming conventions.",
            )
            .required(),
            ToolParameter::string("namespace", "The namespace of the KueryFlow."),
            ToolParameter::new(
                "steps",
                ParameterKind::Array(Box::new(step)),
                "The steps of the flow, in execution order. Each step sets exactly one of \
                 toolCallID, instruction or humanIntervention.",
            )
            .required(),
        ]
    }

    fn requires_explaining(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn call(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: ExportInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        if input.steps.is_empty() {
            return ToolOutput::error("a flow needs at least one step");
        }

        let steps = match input
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.resolve(index, &ctx.calls))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(steps) => steps,
            Err(e) => return ToolOutput::error(format!("failed to export KueryFlow: {e}")),
        };

        let namespace = input
            .namespace
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| self.default_namespace.clone());
        let flow = Flow::new(input.name, namespace, steps);

        let result = match self.store.create(&flow).await {
            Err(StoreError::AlreadyExists { .. }) => {
                tracing::debug!(name = %flow.name, "Flow exists, updating");
                self.store.update(&flow).await
            }
            other => other,
        };

        match result {
            Ok(()) => ToolOutput::success(format!(
                "Exported KueryFlow {}/{} with {} steps",
                flow.namespace,
                flow.name,
                flow.steps.len()
            )),
            Err(e) => ToolOutput::error(format!("failed to export KueryFlow: {e}")),
        }
    }
}
