//! Property-based tests for record id assignment

use super::ToolManager;
use crate::llm::{ContentPart, ToolCallRequest};
use crate::testing::MockTool;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
enum Call {
    Ok,
    Fail,
    Missing,
}

fn arb_call() -> impl Strategy<Value = Call> {
    prop_oneof![Just(Call::Ok), Just(Call::Fail), Just(Call::Missing)]
}

fn request(kind: Call, n: usize) -> ToolCallRequest {
    let name = match kind {
        Call::Ok => "Ok",
        Call::Fail => "Fail",
        Call::Missing => "Missing",
    };
    ToolCallRequest::new(format!("c{n}"), name, json!({ "n": n }))
}

proptest! {
    #[test]
    fn ids_strictly_increase_from_one(
        batches in prop::collection::vec(prop::collection::vec(arb_call(), 0..5), 0..10),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut manager = ToolManager::new()
            .with_tool(Arc::new(MockTool::new("Ok")), u32::MAX)
            .with_tool(Arc::new(MockTool::new("Fail").failing()), u32::MAX);
        let cancel = CancellationToken::new();

        let mut expected_accepted = Vec::new();
        let mut n = 0;
        for batch in &batches {
            let calls: Vec<_> = batch
                .iter()
                .map(|kind| {
                    n += 1;
                    if matches!(kind, Call::Ok) {
                        expected_accepted.push(format!("c{n}"));
                    }
                    request(*kind, n)
                })
                .collect();
            let result = runtime.block_on(manager.execute_tool_calls(&calls, &cancel));
            prop_assert_eq!(result.messages.len(), calls.len() * 2);
        }

        let log = manager.calls();
        prop_assert_eq!(log.len(), expected_accepted.len());
        for (index, record) in log.iter().enumerate() {
            prop_assert_eq!(record.id, index as u64 + 1);
            prop_assert_eq!(&record.call_id, &expected_accepted[index]);
            prop_assert_eq!(&record.arguments["n"], &json!(record.call_id[1..].parse::<usize>().unwrap()));
        }
    }

    #[test]
    fn tool_message_quotes_record_id(count in 1usize..6) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut manager = ToolManager::new().with_tool(Arc::new(MockTool::new("Ok")), 0);
        let calls: Vec<_> = (0..count).map(|n| request(Call::Ok, n)).collect();

        let batch = runtime.block_on(manager.execute_tool_calls(&calls, &CancellationToken::new()));
        for (index, message) in batch.messages.iter().skip(1).step_by(2).enumerate() {
            let ContentPart::ToolResult { content, .. } = &message.parts[0] else {
                return Err(TestCaseError::fail("expected tool result"));
            };
            let prefix = format!("[ID: {}] ", index + 1);
            prop_assert!(content.starts_with(&prefix));
        }
    }
}
