//! Terminal collaborators: stdin input and a colored transcript

use crate::flows::{InputError, InputProvider, Observer};
use crate::llm::{ContentPart, Message, Role};
use async_trait::async_trait;
use crossterm::style::{Color, Stylize};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const PROMPT: &str = "User Input: ";
const MAX_TOOL_OUTPUT_CHARS: usize = 200;

/// Reads one line from stdin per human turn. EOF closes the input.
pub struct StdinInput {
    reader: Mutex<BufReader<Stdin>>,
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

#[async_trait]
impl InputProvider for StdinInput {
    async fn read(&self, cancel: &CancellationToken) -> Result<String, InputError> {
        {
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{}", PROMPT.with(Color::Green).bold())?;
            stdout.flush()?;
        }

        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        tokio::select! {
            () = cancel.cancelled() => Err(InputError::Closed),
            read = reader.read_line(&mut line) => match read? {
                0 => Err(InputError::Closed),
                _ => Ok(line.trim_end_matches(['\r', '\n']).to_string()),
            },
        }
    }
}

/// Prints each appended message to stdout, colored by role
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_message_appended(&self, message: &Message) {
        if let Some((color, line)) = format_message(message) {
            println!("{}", line.with(color));
        }
    }
}

/// Transcript line for a message. Human turns are echoed by the terminal
/// already and system prompts are not shown.
fn format_message(message: &Message) -> Option<(Color, String)> {
    match message.role {
        Role::System | Role::Human => None,
        Role::Ai => {
            let mut lines: Vec<String> = Vec::new();
            let text = message.content();
            if !text.trim().is_empty() {
                lines.push(format!("Kuery: {}", text.trim()));
            }
            lines.extend(
                message
                    .tool_calls()
                    .map(|call| format!("-> {}({})", call.name, call.arguments)),
            );
            (!lines.is_empty()).then(|| (Color::Cyan, lines.join("\n")))
        }
        Role::Tool => message.parts.iter().find_map(|part| match part {
            ContentPart::ToolResult {
                name,
                content,
                is_error,
                ..
            } => {
                let color = if *is_error { Color::Red } else { Color::DarkGrey };
                Some((color, format!("<- {name}: {}", truncate_chars(content, MAX_TOOL_OUTPUT_CHARS))))
            }
            _ => None,
        }),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", text.get(..end).unwrap_or(text)),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCallRequest;
    use serde_json::json;

    #[test]
    fn human_and_system_are_not_echoed() {
        assert!(format_message(&Message::human("hi")).is_none());
        assert!(format_message(&Message::system("prompt")).is_none());
    }

    #[test]
    fn ai_text_and_calls() {
        let (color, line) = format_message(&Message::ai("Listing pods.")).unwrap();
        assert_eq!(color, Color::Cyan);
        assert_eq!(line, "Kuery: Listing pods.");

        let call = ToolCallRequest::new("c1", "K8sRead", json!({"operation": "LIST"}));
        let (_, line) = format_message(&Message::tool_call(call)).unwrap();
        assert_eq!(line, r#"-> K8sRead({"operation":"LIST"})"#);
    }

    #[test]
    fn tool_results_are_truncated_and_colored() {
        let call = ToolCallRequest::new("c1", "K8sRead", json!({}));
        let long = "x".repeat(500);

        let (color, line) = format_message(&Message::tool_result(&call, long, false)).unwrap();
        assert_eq!(color, Color::DarkGrey);
        assert_eq!(line.len(), "<- K8sRead: ".len() + MAX_TOOL_OUTPUT_CHARS + 3);

        let (color, _) = format_message(&Message::tool_result(&call, "boom", true)).unwrap();
        assert_eq!(color, Color::Red);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("ok", 5), "ok");
    }
}
