//! External CLI runner shared by the cluster tools (kubectl, helm)

use super::ToolOutput;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const MAX_OUTPUT_LENGTH: usize = 64 * 1024;
const SNIP_SIZE: usize = 4 * 1024;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A binary plus the timeout applied to each invocation
#[derive(Debug, Clone)]
pub struct CommandRunner {
    binary: String,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run the binary, feeding `stdin` if given. Writing stdin and waiting
    /// for exit both race the timeout and the cancel token.
    pub(super) async fn run(
        &self,
        args: &[String],
        stdin: Option<&str>,
        cancel: &CancellationToken,
    ) -> ToolOutput {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(binary = %self.binary, ?args, "Running command");
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutput::error(format!("Failed to spawn {}: {e}", self.binary)),
        };

        let pipe = child.stdin.take();
        let completion = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|e| format!("Failed to write stdin: {e}"))?;
                // Close stdin so the command sees EOF
                drop(pipe);
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| format!("Command execution failed: {e}"))
        };

        let timeout = self.timeout;
        tokio::select! {
            biased;

            () = cancel.cancelled() => ToolOutput::error("[command cancelled]"),

            () = tokio::time::sleep(timeout) => {
                ToolOutput::error(format!("[command timed out after {timeout:?}]"))
            }

            result = completion => match result {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let combined = format!("{stdout}{stderr}");
                    let formatted = truncate_output(combined.trim_end());

                    if output.status.success() {
                        ToolOutput::success(formatted)
                    } else {
                        let exit_code = output.status.code().unwrap_or(-1);
                        ToolOutput::error(format!(
                            "[command failed: exit code {exit_code}]\n{formatted}"
                        ))
                    }
                }
                Err(e) => ToolOutput::error(e),
            },
        }
    }
}

fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_LENGTH {
        return output.to_string();
    }

    let start = floor_char_boundary(output, SNIP_SIZE);
    let end = ceil_char_boundary(output, output.len() - SNIP_SIZE);
    format!(
        "[output truncated in middle: got {} bytes, max is {} bytes]\n{}\n\n[snip]\n\n{}",
        output.len(),
        MAX_OUTPUT_LENGTH,
        output.get(..start).unwrap_or_default(),
        output.get(end..).unwrap_or_default()
    )
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Reject values the CLI would parse as flags or split on whitespace
pub(super) fn check_token(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if value.starts_with('-') || value.chars().any(char::is_whitespace) {
        return Err(format!("invalid {field}: {value:?}"));
    }
    Ok(())
}

/// Required string field, checked with `check_token`
pub(super) fn required_token<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, String> {
    let value = value.unwrap_or_default();
    check_token(field, value)?;
    Ok(value)
}

pub(super) fn namespace_args(namespace: Option<&str>, default: &str) -> Result<Vec<String>, String> {
    let namespace = namespace.filter(|ns| !ns.is_empty()).unwrap_or(default);
    check_token("namespace", namespace)?;
    Ok(vec!["--namespace".to_string(), namespace.to_string()])
}
