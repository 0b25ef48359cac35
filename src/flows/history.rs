//! History truncation between loop iterations

use crate::llm::{Message, Role};

/// Bounds the history carried from one drain to the next.
///
/// Leading system messages are always kept. The retained tail starts at a
/// human message so no tool result is separated from the call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    /// 0 disables truncation
    pub max_messages: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self { max_messages: 200 }
    }
}

impl HistoryPolicy {
    pub fn unbounded() -> Self {
        Self { max_messages: 0 }
    }

    pub fn new(max_messages: usize) -> Self {
        Self { max_messages }
    }

    pub fn apply(&self, mut history: Vec<Message>) -> Vec<Message> {
        if self.max_messages == 0 || history.len() <= self.max_messages {
            return history;
        }

        let pinned = history
            .iter()
            .take_while(|m| m.role == Role::System)
            .count();
        let budget = self.max_messages.saturating_sub(pinned);
        let window_start = history.len().saturating_sub(budget).max(pinned);

        let is_human = |m: &Message| m.role == Role::Human;
        let start = history[window_start..]
            .iter()
            .position(is_human)
            .map(|offset| window_start + offset)
            // No human turn inside the window: widen to the latest one
            .or_else(|| history[pinned..window_start].iter().rposition(is_human).map(|i| pinned + i))
            .unwrap_or(pinned);

        if start == pinned {
            return history;
        }

        let dropped = start - pinned;
        history.drain(pinned..start);
        tracing::debug!(dropped, kept = history.len(), "History truncated");
        history
    }
}
