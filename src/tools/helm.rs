//! Helm releases and chart repositories through the helm CLI

use super::command::{check_token, namespace_args, required_token, CommandRunner};
use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::llm::ToolParameter;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// How long helm waits for installed resources to become ready
const WAIT_TIMEOUT: &str = "32s";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum HelmOperation {
    AddRepo,
    Install,
    Upgrade,
    Uninstall,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelmInput {
    operation: HelmOperation,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    release_name: Option<String>,
    #[serde(default)]
    chart_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

fn helm_args(input: &HelmInput, default_namespace: &str) -> Result<Vec<String>, String> {
    let mut args: Vec<String> = match input.operation {
        HelmOperation::AddRepo => {
            let name = required_token("name", input.name.as_deref())?;
            let url = required_token("url", input.url.as_deref())?;
            return Ok(vec![
                "repo".to_string(),
                "add".to_string(),
                "--force-update".to_string(),
                name.to_string(),
                url.to_string(),
            ]);
        }
        HelmOperation::Install | HelmOperation::Upgrade => {
            let release = required_token("releaseName", input.release_name.as_deref())?;
            let chart = required_token("chartName", input.chart_name.as_deref())?;
            let verb = if input.operation == HelmOperation::Install {
                "install"
            } else {
                "upgrade"
            };
            let mut args = vec![verb.to_string(), release.to_string(), chart.to_string()];
            if let Some(version) = input.version.as_deref().filter(|v| !v.is_empty()) {
                check_token("version", version)?;
                args.extend(["--version".to_string(), version.to_string()]);
            }
            if input.operation == HelmOperation::Install {
                args.push("--create-namespace".to_string());
            }
            args.extend([
                "--wait".to_string(),
                "--timeout".to_string(),
                WAIT_TIMEOUT.to_string(),
            ]);
            args
        }
        HelmOperation::Uninstall => {
            let release = required_token("releaseName", input.release_name.as_deref())?;
            vec!["uninstall".to_string(), release.to_string()]
        }
    };
    args.extend(namespace_args(input.namespace.as_deref(), default_namespace)?);
    Ok(args)
}

/// Chart repositories and releases; every operation changes the cluster
/// or the local helm config, so the tool is approval-gated
pub struct HelmTool {
    helm: Arc<CommandRunner>,
    default_namespace: String,
}

impl HelmTool {
    pub fn new(helm: Arc<CommandRunner>, default_namespace: impl Into<String>) -> Self {
        Self {
            helm,
            default_namespace: default_namespace.into(),
        }
    }
}

#[async_trait]
impl Tool for HelmTool {
    fn name(&self) -> &'static str {
        "Helm"
    }

    fn description(&self) -> String {
        "Interact with Helm. ADD_REPO adds a chart repository (name, url). \
         INSTALL installs a chart as a release (releaseName, chartName, optional version and namespace). \
         UPGRADE upgrades a release to a chart (same fields as INSTALL). \
         UNINSTALL removes a release (releaseName, namespace). \
         Use it only with clear user intent."
            .to_string()
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::string("operation", "The operation to perform.")
                .one_of(["ADD_REPO", "INSTALL", "UPGRADE", "UNINSTALL"])
                .required(),
            ToolParameter::string("name", "Chart repository name, e.g. bitnami."),
            ToolParameter::string("url", "Chart repository URL, e.g. https://charts.bitnami.com/bitnami."),
            ToolParameter::string("releaseName", "Release name, e.g. etcd-operator."),
            ToolParameter::string("chartName", "Chart reference, e.g. bitnami/etcd."),
            ToolParameter::string("version", "Chart version constraint."),
            ToolParameter::string("namespace", "The release namespace."),
        ]
    }

    fn requires_explaining(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn call(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: HelmInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        match helm_args(&input, &self.default_namespace) {
            Ok(args) => self.helm.run(&args, None, &ctx.cancel).await,
            Err(e) => ToolOutput::error(e),
        }
    }
}
