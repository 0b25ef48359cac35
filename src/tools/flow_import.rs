//! ImportKueryFlow tool - lists, shows, or replays persisted flows

use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::flows::{HumanStep, InputProvider, LlmStep, Step, ToolStep};
use crate::llm::{Model, ToolParameter};
use crate::store::{Flow, FlowStep, FlowStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const RECALCULATE_TEXT: &str = "You are required to run the following tool call (part of a KueryFlow), \
but some of its arguments need to be figured out first: those listed in argsToRecalculate. \
Use the 'AddStep' tool to instruct yourself further to figure out the correct values. \
If required, you may ask the user to help you figure them out.";

pub struct ImportFlowTool {
    store: Arc<dyn FlowStore>,
    model: Arc<dyn Model>,
    input: Arc<dyn InputProvider>,
    default_namespace: String,
}

impl ImportFlowTool {
    pub fn new(
        store: Arc<dyn FlowStore>,
        model: Arc<dyn Model>,
        input: Arc<dyn InputProvider>,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            model,
            input,
            default_namespace: default_namespace.into(),
        }
    }

    fn llm_step(&self) -> LlmStep {
        LlmStep::new(Arc::clone(&self.model))
    }

    /// Steps a persisted step expands into, in forward order
    fn expand(&self, step: &FlowStep) -> Vec<Step> {
        match step {
            FlowStep::ToolCall {
                function,
                args_to_recalculate,
            } if args_to_recalculate.is_empty() => {
                vec![ToolStep::new(function.name.clone(), function.arguments.clone())
                    .preapproved()
                    .into()]
            }
            FlowStep::ToolCall {
                function,
                args_to_recalculate,
            } => {
                let text = format!(
                    "{RECALCULATE_TEXT}\nTool call: {function}\nargsToRecalculate: {}",
                    args_to_recalculate.join(", ")
                );
                vec![HumanStep::fixed(text).into(), self.llm_step().into()]
            }
            FlowStep::Instruction { text } => vec![self.llm_step().with_prompt(text.clone()).into()],
            FlowStep::HumanIntervention => vec![
                HumanStep::new(Arc::clone(&self.input)).into(),
                self.llm_step().into(),
            ],
        }
    }

    /// Splice the flow after the cursor. Pushing in reverse leaves the
    /// steps in forward order.
    fn schedule(&self, flow: &Flow, mut output: ToolOutput) -> ToolOutput {
        for step in flow.steps.iter().rev() {
            for expanded in self.expand(step).into_iter().rev() {
                output = output.push_next(expanded, true);
            }
        }
        output
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum Operation {
    List,
    Get,
    Execute,
}

#[derive(Debug, Deserialize)]
struct ImportInput {
    operation: Operation,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

fn describe(flow: &Flow) -> String {
    serde_json::to_string_pretty(flow).unwrap_or_else(|_| format!("{flow:?}"))
}

#[async_trait]
impl Tool for ImportFlowTool {
    fn name(&self) -> &'static str {
        "ImportKueryFlow"
    }

    fn description(&self) -> String {
        "Get or execute KueryFlows. LIST returns the flows in a namespace, GET returns one flow, \
         EXECUTE loads a flow's steps to run next. Do not execute a KueryFlow without the user's consent."
            .to_string()
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::string("operation", "The operation to perform.")
                .one_of(["LIST", "GET", "EXECUTE"])
                .required(),
            ToolParameter::string(
                "name",
                "The name of the KueryFlow to get or execute. Required for GET and EXECUTE.",
            ),
            ToolParameter::string("namespace", "The namespace of the KueryFlow objects."),
        ]
    }

    fn requires_explaining(&self) -> bool {
        false
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn call(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
        let input: ImportInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        let namespace = input
            .namespace
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| self.default_namespace.clone());

        if let Operation::List = input.operation {
            return match self.store.list(&namespace).await {
                Ok(flows) => {
                    let names: Vec<&str> = flows.iter().map(|f| f.name.as_str()).collect();
                    ToolOutput::success(format!(
                        "KueryFlows in namespace {namespace}: {}",
                        serde_json::json!(names)
                    ))
                    .push_next(self.llm_step(), true)
                }
                Err(e) => ToolOutput::error(format!("failed to list KueryFlows: {e}")),
            };
        }

        let Some(name) = input.name.filter(|n| !n.trim().is_empty()) else {
            return ToolOutput::error("name is required for GET and EXECUTE");
        };
        let flow = match self.store.get(&namespace, &name).await {
            Ok(flow) => flow,
            Err(e) => return ToolOutput::error(format!("failed to get KueryFlow: {e}")),
        };

        match input.operation {
            Operation::Execute => {
                tracing::info!(namespace = %namespace, name = %name, steps = flow.steps.len(), "Executing flow");
                let output = ToolOutput::success(format!(
                    "Loaded KueryFlow steps: {namespace}/{name} ({} steps)",
                    flow.steps.len()
                ));
                self.schedule(&flow, output)
            }
            _ => ToolOutput::success(format!("KueryFlow: {}", describe(&flow)))
                .push_next(self.llm_step(), true),
        }
    }
}
