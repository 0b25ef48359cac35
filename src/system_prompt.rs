//! System prompt construction with runbook discovery
//!
//! The built-in prompt describes Kuery's role and its special tools. Runbook
//! files (KUERY.md, AGENTS.md) found from the working directory up to the
//! filesystem root are appended so operators can add cluster-specific rules.

use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Names of runbook files to look for, in order of preference
const RUNBOOK_FILE_NAMES: &[&str] = &["KUERY.md", "AGENTS.md"];

const BASE_PROMPT: &str = r#"# ROLE
You are Kuery, a Kubernetes and cloud expert providing general-purpose assistance to users.
You can read and modify cluster resources through the tools you are given.
You operate within a turn-based chat with the user.

# SPECIAL TOOLS
- "AddStep" grants you an additional turn before the user speaks again. Use it when a request needs multi-step planning or more execution.
- "RequestApprovalForTools" asks the user to approve tools that require consent. Approvals are single use.
- "ExportKueryFlow" saves tool calls from this conversation as a KueryFlow that can be replayed later.
- "ImportKueryFlow" lists, shows and executes saved KueryFlows.

# GUIDELINES
- Do not only suggest what the user could do. Propose doing it for them with your tools, after asking permission.
- Prefer calling a tool over describing how to do the job by hand.
- Use "K8sDiscover" to learn a custom resource's API before reading or writing it. Builtin kinds such as pods and deployments do not need it.
- Make sure the user agrees with what you are doing, especially before calls that change the cluster.
- The user does not see tool calls. Be transparent about what you ran and what it returned.
- When running a multi-step plan, ask the user for permission before every step."#;

/// A discovered runbook file
#[derive(Debug, Clone)]
pub struct RunbookFile {
    pub path: PathBuf,
    pub content: String,
}

/// Discover runbook files from the working directory up to the root.
/// Returns files in order from root to cwd (more specific files last).
pub fn discover_runbooks(working_dir: &Path) -> Vec<RunbookFile> {
    let mut files = Vec::new();
    let mut current = Some(working_dir.to_path_buf());

    while let Some(dir) = current {
        for name in RUNBOOK_FILE_NAMES {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(&path) {
                files.push(RunbookFile { path, content });
                // One runbook per directory
                break;
            }
        }
        current = dir.parent().map(Path::to_path_buf);
    }

    files.reverse();
    files
}

/// Build the system prompt for a session in `namespace`
pub fn build_system_prompt(namespace: &str, working_dir: &Path) -> String {
    let mut prompt = String::from(BASE_PROMPT);
    let _ = write!(
        prompt,
        "\n\n# CONTEXT\nThe default namespace is \"{namespace}\". Use it unless the user names another one."
    );

    let runbooks = discover_runbooks(working_dir);
    if !runbooks.is_empty() {
        prompt.push_str("\n\n<runbooks>\n");
        for (i, file) in runbooks.iter().enumerate() {
            if i > 0 {
                prompt.push_str("\n---\n\n");
            }
            let _ = writeln!(prompt, "<!-- From: {} -->", file.path.display());
            prompt.push_str(&file.content);
            if !file.content.ends_with('\n') {
                prompt.push('\n');
            }
        }
        prompt.push_str("</runbooks>");
    }

    prompt
}

/// The prompt from `override_file` when given, otherwise the built-in one
pub fn load_system_prompt(
    override_file: Option<&Path>,
    namespace: &str,
    working_dir: &Path,
) -> std::io::Result<String> {
    match override_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading system prompt override");
            std::fs::read_to_string(path)
        }
        None => Ok(build_system_prompt(namespace, working_dir)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_no_files() {
        let temp = TempDir::new().unwrap();
        assert!(discover_runbooks(temp.path()).is_empty());
    }

    #[test]
    fn test_kuery_md_preferred_over_agents_md() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("KUERY.md"), "kuery rules").unwrap();
        fs::write(temp.path().join("AGENTS.md"), "agent rules").unwrap();

        let files = discover_runbooks(temp.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "kuery rules");
    }

    #[test]
    fn test_discover_nested_files() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("prod");
        fs::create_dir(&subdir).unwrap();
        fs::write(temp.path().join("KUERY.md"), "fleet rules").unwrap();
        fs::write(subdir.join("KUERY.md"), "prod rules").unwrap();

        let files = discover_runbooks(&subdir);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].content, "fleet rules");
        assert_eq!(files[1].content, "prod rules");
    }

    #[test]
    fn test_build_prompt_mentions_namespace_and_tools() {
        let temp = TempDir::new().unwrap();
        let prompt = build_system_prompt("payments", temp.path());

        assert!(prompt.starts_with("# ROLE\nYou are Kuery"));
        assert!(prompt.contains("\"payments\""));
        for tool in ["AddStep", "RequestApprovalForTools", "ExportKueryFlow", "ImportKueryFlow"] {
            assert!(prompt.contains(tool), "missing {tool}");
        }
        assert!(!prompt.contains("<runbooks>"));
    }

    #[test]
    fn test_build_prompt_with_runbook() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("KUERY.md"), "Never delete namespaces.").unwrap();

        let prompt = build_system_prompt("default", temp.path());
        assert!(prompt.contains("<runbooks>"));
        assert!(prompt.contains("Never delete namespaces.\n</runbooks>"));
    }

    #[test]
    fn test_override_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prompt.md");
        fs::write(&path, "custom prompt").unwrap();

        let prompt = load_system_prompt(Some(&path), "default", temp.path()).unwrap();
        assert_eq!(prompt, "custom prompt");
        assert!(load_system_prompt(Some(&temp.path().join("missing")), "default", temp.path()).is_err());
        assert!(load_system_prompt(None, "default", temp.path())
            .unwrap()
            .contains("Kuery"));
    }
}
