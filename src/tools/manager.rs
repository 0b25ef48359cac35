//! Governance layer: approval gates, retry ceilings, and the call log
//!
//! Every tool call the model requests passes through `ToolManager`, which
//! decides whether the tool body runs at all, keeps per-tool retry counters,
//! and assigns a record id to each accepted call so flows can be exported
//! from them later.

use super::{FlowEffect, Tool, ToolContext, ToolOutput};
use crate::llm::{Message, ToolCallRequest, ToolSchema};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const RETRY_CEILING_MESSAGE: &str =
    "tool has reached the maximum number of consecutive runs. Context should return to the user.";
pub const APPROVAL_REQUIRED_MESSAGE: &str = "tool requires explicit user approval before execution";

/// An accepted tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: u64,
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub accepted_at: DateTime<Utc>,
}

/// Accepted calls keyed by record id. Ids start at 1 and are never reused.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    records: Vec<ToolCallRecord>,
}

impl CallLog {
    pub fn get(&self, id: u64) -> Option<&ToolCallRecord> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.records.get(index)
    }

    /// Look up a record by its textual id, as the model quotes it
    pub fn resolve(&self, reference: &str) -> Option<&ToolCallRecord> {
        let trimmed = reference
            .trim()
            .trim_start_matches("[ID:")
            .trim_end_matches(']')
            .trim();
        self.get(trimmed.parse().ok()?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.records.iter()
    }

    pub(crate) fn record(&mut self, call: &ToolCallRequest) -> u64 {
        let id = self.records.len() as u64 + 1;
        self.records.push(ToolCallRecord {
            id,
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            accepted_at: Utc::now(),
        });
        id
    }
}

struct Registration {
    tool: Arc<dyn Tool>,
    max_retries: u32,
    retries: u32,
    approved: bool,
}

/// Messages and follow-ups produced by one batch of tool calls
#[derive(Debug, Default)]
pub struct ToolCallBatch {
    pub messages: Vec<Message>,
    /// Whether any call asked for a model turn to narrate the outcome
    pub requires_explaining: bool,
    /// Chain changes requested by accepted calls, ordered for `push_next`:
    /// a later call's effects come first so an earlier call's steps run first
    pub effects: Vec<FlowEffect>,
}

enum Outcome {
    NotFound,
    Blocked(&'static str),
    Ran(ToolOutput),
}

/// Holds the registered tools and their approval/retry state.
///
/// One instance per conversation; not meant to be shared between sessions.
#[derive(Default)]
pub struct ToolManager {
    tools: BTreeMap<String, Registration>,
    calls: Arc<CallLog>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. `max_retries` is the number of consecutive
    /// failed or blocked calls tolerated before the tool is blocked.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>, max_retries: u32) -> Self {
        self.register(tool, max_retries);
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>, max_retries: u32) {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "Replacing registered tool");
        }
        self.tools.insert(
            name,
            Registration {
                tool,
                max_retries,
                retries: 0,
                approved: false,
            },
        );
    }

    /// Schemas for every registered tool, ordered by name
    pub fn declarations(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|r| r.tool.declaration()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Grant a single-use approval to each named tool
    pub fn approve_tools<S: AsRef<str>>(&mut self, names: &[S]) {
        for name in names {
            let name = name.as_ref();
            match self.tools.get_mut(name) {
                Some(registration) => {
                    registration.approved = true;
                    tracing::info!(tool = %name, "Tool approved");
                }
                None => tracing::warn!(tool = %name, "Approval for unknown tool ignored"),
            }
        }
    }

    pub fn is_approved(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|r| r.approved)
    }

    pub fn retries(&self, name: &str) -> Option<u32> {
        self.tools.get(name).map(|r| r.retries)
    }

    /// Clear every retry counter (done at each human turn)
    pub fn reset_retries(&mut self) {
        for registration in self.tools.values_mut() {
            registration.retries = 0;
        }
    }

    pub fn get_call(&self, id: u64) -> Option<&ToolCallRecord> {
        self.calls.get(id)
    }

    pub fn calls(&self) -> Arc<CallLog> {
        Arc::clone(&self.calls)
    }

    /// Run a batch of requested calls sequentially, in the order given
    pub async fn execute_tool_calls(
        &mut self,
        calls: &[ToolCallRequest],
        cancel: &CancellationToken,
    ) -> ToolCallBatch {
        self.execute_batch(calls, false, cancel).await
    }

    /// Run calls replayed from a flow the user approved as a whole.
    ///
    /// The approval covers exactly these calls: the approval gate is skipped
    /// and the tools' own approval state is left untouched whatever the
    /// outcome. Retry ceilings still apply.
    pub async fn execute_preapproved_calls(
        &mut self,
        calls: &[ToolCallRequest],
        cancel: &CancellationToken,
    ) -> ToolCallBatch {
        self.execute_batch(calls, true, cancel).await
    }

    async fn execute_batch(
        &mut self,
        calls: &[ToolCallRequest],
        preapproved: bool,
        cancel: &CancellationToken,
    ) -> ToolCallBatch {
        let mut batch = ToolCallBatch::default();

        for call in calls {
            batch.messages.push(Message::tool_call(call.clone()));

            match self.call_tool(call, preapproved, cancel).await {
                Outcome::NotFound => {
                    tracing::warn!(tool = %call.name, call_id = %call.id, "Tool not found");
                    batch.messages.push(Message::tool_result(
                        call,
                        format!("tool not found: {}", call.name),
                        true,
                    ));
                    batch.requires_explaining = true;
                }
                Outcome::Blocked(reason) => {
                    let retries = self.bump_retries(&call.name);
                    tracing::info!(tool = %call.name, call_id = %call.id, retries, reason, "Tool call blocked");
                    batch.messages.push(Message::tool_result(call, reason, true));
                    batch.requires_explaining = true;
                }
                Outcome::Ran(output) if output.success => {
                    let id = Arc::make_mut(&mut self.calls).record(call);
                    let explaining = match self.tools.get_mut(&call.name) {
                        Some(registration) => {
                            registration.retries = 0;
                            if !preapproved {
                                registration.approved = false;
                            }
                            registration.tool.requires_explaining()
                        }
                        None => false,
                    };
                    tracing::info!(tool = %call.name, call_id = %call.id, record_id = id, "Tool call accepted");
                    batch.messages.push(Message::tool_result(
                        call,
                        format!("[ID: {id}] {}", output.output),
                        false,
                    ));
                    let mut effects = output.effects;
                    effects.append(&mut batch.effects);
                    batch.effects = effects;
                    batch.requires_explaining |= explaining;
                }
                Outcome::Ran(output) => {
                    let retries = self.bump_retries(&call.name);
                    tracing::warn!(tool = %call.name, call_id = %call.id, retries, error = %output.output, "Tool call failed");
                    batch.messages.push(Message::tool_result(call, output.output, true));
                    batch.requires_explaining = true;
                }
            }
        }

        batch
    }

    async fn call_tool(
        &self,
        call: &ToolCallRequest,
        preapproved: bool,
        cancel: &CancellationToken,
    ) -> Outcome {
        let Some(registration) = self.tools.get(&call.name) else {
            return Outcome::NotFound;
        };

        // Ceiling first, so retries inside an explaining turn stay blocked
        if registration.retries > registration.max_retries {
            return Outcome::Blocked(RETRY_CEILING_MESSAGE);
        }
        if registration.tool.requires_approval() && !registration.approved && !preapproved {
            return Outcome::Blocked(APPROVAL_REQUIRED_MESSAGE);
        }

        let ctx = ToolContext::new(cancel.clone(), Arc::clone(&self.calls));
        Outcome::Ran(registration.tool.call(call.arguments.clone(), ctx).await)
    }

    fn bump_retries(&mut self, name: &str) -> u32 {
        self.tools.get_mut(name).map_or(0, |r| {
            r.retries += 1;
            r.retries
        })
    }
}

#[cfg(test)]
mod proptests;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentPart, Role};
    use crate::testing::MockTool;
    use serde_json::json;

    fn call(name: &str) -> ToolCallRequest {
        ToolCallRequest::new(format!("call-{name}"), name, json!({}))
    }

    fn result_text(message: &Message) -> (&str, bool) {
        match &message.parts[0] {
            ContentPart::ToolResult {
                content, is_error, ..
            } => (content.as_str(), *is_error),
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_does_not_count() {
        let mut manager = ToolManager::new().with_tool(Arc::new(MockTool::new("Known")), 0);
        let batch = manager
            .execute_tool_calls(&[call("Missing")], &CancellationToken::new())
            .await;

        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[0].role, Role::Ai);
        assert_eq!(result_text(&batch.messages[1]), ("tool not found: Missing", true));
        assert!(batch.requires_explaining);
        assert_eq!(manager.retries("Known"), Some(0));
        assert!(manager.calls().is_empty());
    }

    #[tokio::test]
    async fn approval_is_single_use() {
        let tool = Arc::new(MockTool::new("Write").approval(true));
        let mut manager = ToolManager::new().with_tool(tool.clone(), 5);
        let cancel = CancellationToken::new();

        let blocked = manager.execute_tool_calls(&[call("Write")], &cancel).await;
        assert_eq!(result_text(&blocked.messages[1]), (APPROVAL_REQUIRED_MESSAGE, true));
        assert_eq!(tool.invocations(), 0);

        manager.approve_tools(&["Write"]);
        let accepted = manager.execute_tool_calls(&[call("Write")], &cancel).await;
        assert!(!result_text(&accepted.messages[1]).1);
        assert_eq!(tool.invocations(), 1);
        assert!(!manager.is_approved("Write"));

        let again = manager.execute_tool_calls(&[call("Write")], &cancel).await;
        assert_eq!(result_text(&again.messages[1]), (APPROVAL_REQUIRED_MESSAGE, true));
        assert_eq!(tool.invocations(), 1);
    }

    #[tokio::test]
    async fn preapproved_calls_leave_approval_state_alone() {
        let tool = Arc::new(MockTool::new("Write").approval(true).failing());
        let mut manager = ToolManager::new().with_tool(tool.clone(), 5);
        let cancel = CancellationToken::new();

        let replay = manager.execute_preapproved_calls(&[call("Write")], &cancel).await;
        assert!(result_text(&replay.messages[1]).1);
        assert_eq!(tool.invocations(), 1);
        assert!(!manager.is_approved("Write"));

        let later = manager.execute_tool_calls(&[call("Write")], &cancel).await;
        assert_eq!(result_text(&later.messages[1]), (APPROVAL_REQUIRED_MESSAGE, true));
        assert_eq!(tool.invocations(), 1);
    }

    #[tokio::test]
    async fn preapproved_success_keeps_granted_approval() {
        let tool = Arc::new(MockTool::new("Write").approval(true));
        let mut manager = ToolManager::new().with_tool(tool.clone(), 5);
        let cancel = CancellationToken::new();

        manager.approve_tools(&["Write"]);
        manager.execute_preapproved_calls(&[call("Write")], &cancel).await;
        assert!(manager.is_approved("Write"));
        assert_eq!(tool.invocations(), 1);
    }

    #[tokio::test]
    async fn preapproved_calls_still_hit_the_ceiling() {
        let tool = Arc::new(MockTool::new("Write").approval(true).failing());
        let mut manager = ToolManager::new().with_tool(tool.clone(), 0);
        let cancel = CancellationToken::new();

        manager.execute_preapproved_calls(&[call("Write")], &cancel).await;
        let blocked = manager.execute_preapproved_calls(&[call("Write")], &cancel).await;
        assert_eq!(result_text(&blocked.messages[1]), (RETRY_CEILING_MESSAGE, true));
        assert_eq!(tool.invocations(), 1);
    }

    #[tokio::test]
    async fn retry_ceiling_blocks_until_reset() {
        let k = 2;
        let tool = Arc::new(MockTool::new("Flaky").failing());
        let mut manager = ToolManager::new().with_tool(tool.clone(), k);
        let cancel = CancellationToken::new();

        // K consecutive failures leave the tool callable; the (K+1)-th is the last to run
        for _ in 0..=k {
            let batch = manager.execute_tool_calls(&[call("Flaky")], &cancel).await;
            assert_ne!(result_text(&batch.messages[1]).0, RETRY_CEILING_MESSAGE);
        }
        assert_eq!(tool.invocations(), 3);

        let blocked = manager.execute_tool_calls(&[call("Flaky")], &cancel).await;
        assert_eq!(result_text(&blocked.messages[1]), (RETRY_CEILING_MESSAGE, true));
        assert_eq!(tool.invocations(), 3);

        manager.reset_retries();
        manager.execute_tool_calls(&[call("Flaky")], &cancel).await;
        assert_eq!(tool.invocations(), 4);
    }

    #[tokio::test]
    async fn ceiling_precedes_approval_check() {
        let mut manager =
            ToolManager::new().with_tool(Arc::new(MockTool::new("Gated").approval(true)), 0);
        let cancel = CancellationToken::new();

        let first = manager.execute_tool_calls(&[call("Gated")], &cancel).await;
        assert_eq!(result_text(&first.messages[1]).0, APPROVAL_REQUIRED_MESSAGE);

        manager.approve_tools(&["Gated"]);
        let second = manager.execute_tool_calls(&[call("Gated")], &cancel).await;
        assert_eq!(result_text(&second.messages[1]).0, RETRY_CEILING_MESSAGE);
    }

    #[tokio::test]
    async fn accepted_calls_are_recorded_with_ids() {
        let mut manager = ToolManager::new()
            .with_tool(Arc::new(MockTool::new("A")), 1)
            .with_tool(Arc::new(MockTool::new("B").failing()), 1);
        let cancel = CancellationToken::new();

        let batch = manager
            .execute_tool_calls(&[call("A"), call("B"), call("A")], &cancel)
            .await;

        assert_eq!(batch.messages.len(), 6);
        assert!(result_text(&batch.messages[1]).0.starts_with("[ID: 1] "));
        assert!(result_text(&batch.messages[3]).1);
        assert!(result_text(&batch.messages[5]).0.starts_with("[ID: 2] "));

        assert_eq!(manager.get_call(1).map(|r| r.name.as_str()), Some("A"));
        assert_eq!(manager.get_call(2).map(|r| r.call_id.as_str()), Some("call-A"));
        assert!(manager.get_call(3).is_none());
        assert!(manager.get_call(0).is_none());
    }

    #[tokio::test]
    async fn explaining_follows_tool_on_success() {
        let mut manager = ToolManager::new()
            .with_tool(Arc::new(MockTool::new("Quiet")), 1)
            .with_tool(Arc::new(MockTool::new("Chatty").explaining(true)), 1);
        let cancel = CancellationToken::new();

        let quiet = manager.execute_tool_calls(&[call("Quiet")], &cancel).await;
        assert!(!quiet.requires_explaining);

        let chatty = manager
            .execute_tool_calls(&[call("Quiet"), call("Chatty")], &cancel)
            .await;
        assert!(chatty.requires_explaining);
    }

    #[tokio::test]
    async fn effects_only_from_accepted_calls() {
        let ok = MockTool::new("Ok").with_effect(crate::flows::HumanStep::fixed("next"));
        let bad = MockTool::new("Bad")
            .failing()
            .with_effect(crate::flows::HumanStep::fixed("never"));
        let mut manager = ToolManager::new()
            .with_tool(Arc::new(ok), 1)
            .with_tool(Arc::new(bad), 1);

        let batch = manager
            .execute_tool_calls(&[call("Bad"), call("Ok")], &CancellationToken::new())
            .await;
        assert_eq!(batch.effects.len(), 1);
    }

    #[test]
    fn resolve_accepts_quoted_ids() {
        let mut log = CallLog::default();
        log.record(&call("A"));
        log.record(&call("B"));

        assert_eq!(log.resolve("2").map(|r| r.name.as_str()), Some("B"));
        assert_eq!(log.resolve("[ID: 1]").map(|r| r.name.as_str()), Some("A"));
        assert!(log.resolve("x").is_none());
        assert!(log.resolve("3").is_none());
    }

    #[test]
    fn declarations_sorted_and_unknown_approvals_ignored() {
        let mut manager = ToolManager::new()
            .with_tool(Arc::new(MockTool::new("b")), 1)
            .with_tool(Arc::new(MockTool::new("a")), 1);
        manager.approve_tools(&["nope"]);

        let names: Vec<_> = manager.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(!manager.is_approved("nope"));
    }
}
