//! Cluster tools - discover, read and write Kubernetes objects through kubectl
//!
//! Authentication is whatever the kubectl binary is configured with.

use super::command::{check_token, namespace_args, required_token, CommandRunner};
use super::{parse_input, Tool, ToolContext, ToolOutput};
use crate::llm::ToolParameter;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
enum ReadOperation {
    List,
    Get,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadInput {
    operation: ReadOperation,
    resource: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    all_namespaces: bool,
    #[serde(default)]
    label_selector: Option<String>,
}

fn read_args(input: &ReadInput, default_namespace: &str) -> Result<Vec<String>, String> {
    check_token("resource", &input.resource)?;
    let mut args = vec!["get".to_string(), input.resource.clone()];

    match input.operation {
        ReadOperation::Get => {
            let name = required_token("name", input.name.as_deref())?;
            args.push(name.to_string());
            args.extend(namespace_args(input.namespace.as_deref(), default_namespace)?);
            args.extend(["--output".to_string(), "yaml".to_string()]);
        }
        ReadOperation::List => {
            if input.all_namespaces {
                args.push("--all-namespaces".to_string());
            } else {
                args.extend(namespace_args(input.namespace.as_deref(), default_namespace)?);
            }
            if let Some(selector) = input.label_selector.as_deref().filter(|s| !s.is_empty()) {
                check_token("labelSelector", selector)?;
                args.push(format!("--selector={selector}"));
            }
            args.extend(["--output".to_string(), "wide".to_string()]);
        }
    }
    Ok(args)
}

/// Read-only cluster access (LIST / GET)
pub struct K8sReadTool {
    kubectl: Arc<CommandRunner>,
    default_namespace: String,
}

impl K8sReadTool {
    pub fn new(kubectl: Arc<CommandRunner>, default_namespace: impl Into<String>) -> Self {
        Self {
            kubectl,
            default_namespace: default_namespace.into(),
        }
    }
}

#[async_trait]
impl Tool for K8sReadTool {
    fn name(&self) -> &'static str {
        "K8sRead"
    }

    fn description(&self) -> String {
        format!(
            "Read Kubernetes resources. LIST lists resources of a kind, GET returns one object as YAML. \
             Resources are given as kubectl resource names, e.g. pods, deployments.apps, kueryflows. \
             The default namespace is {}.",
            self.default_namespace
        )
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::string("operation", "The operation to perform.")
                .one_of(["LIST", "GET"])
                .required(),
            ToolParameter::string("resource", "The resource type, e.g. pods or deployments.apps.")
                .required(),
            ToolParameter::string("name", "The object name. Required for GET."),
            ToolParameter::string("namespace", "The namespace to read from."),
            ToolParameter::boolean("allNamespaces", "LIST across all namespaces."),
            ToolParameter::string("labelSelector", "LIST only objects matching this label selector."),
        ]
    }

    fn requires_explaining(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn call(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: ReadInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        match read_args(&input, &self.default_namespace) {
            Ok(args) => self.kubectl.run(&args, None, &ctx.cancel).await,
            Err(e) => ToolOutput::error(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
enum WriteOperation {
    Post,
    Put,
    Delete,
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    operation: WriteOperation,
    #[serde(default)]
    manifest: Option<String>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// kubectl arguments plus the manifest to feed on stdin
fn write_args(
    input: &WriteInput,
    default_namespace: &str,
) -> Result<(Vec<String>, Option<String>), String> {
    let namespace = namespace_args(input.namespace.as_deref(), default_namespace)?;

    match input.operation {
        WriteOperation::Post | WriteOperation::Put => {
            let manifest = input
                .manifest
                .clone()
                .filter(|m| !m.trim().is_empty())
                .ok_or("manifest is required for POST and PUT")?;
            let verb = if input.operation == WriteOperation::Post {
                "create"
            } else {
                "replace"
            };
            let mut args = vec![verb.to_string(), "--filename".to_string(), "-".to_string()];
            args.extend(namespace);
            Ok((args, Some(manifest)))
        }
        WriteOperation::Delete => {
            let resource = required_token("resource", input.resource.as_deref())?;
            let name = required_token("name", input.name.as_deref())?;
            let mut args = vec!["delete".to_string(), resource.to_string(), name.to_string()];
            args.extend(namespace);
            Ok((args, None))
        }
    }
}

/// Cluster mutations (POST = create, PUT = replace, DELETE)
pub struct K8sWriteTool {
    kubectl: Arc<CommandRunner>,
    default_namespace: String,
}

impl K8sWriteTool {
    pub fn new(kubectl: Arc<CommandRunner>, default_namespace: impl Into<String>) -> Self {
        Self {
            kubectl,
            default_namespace: default_namespace.into(),
        }
    }
}

#[async_trait]
impl Tool for K8sWriteTool {
    fn name(&self) -> &'static str {
        "K8sWrite"
    }

    fn description(&self) -> String {
        "Modify Kubernetes resources. POST creates the objects in a YAML or JSON manifest, \
         PUT replaces existing objects with the manifest, DELETE removes one object by resource and name."
            .to_string()
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::string("operation", "The operation to perform.")
                .one_of(["POST", "PUT", "DELETE"])
                .required(),
            ToolParameter::string("manifest", "YAML or JSON manifest. Required for POST and PUT."),
            ToolParameter::string("resource", "The resource type. Required for DELETE."),
            ToolParameter::string("name", "The object name. Required for DELETE."),
            ToolParameter::string("namespace", "The target namespace."),
        ]
    }

    fn requires_explaining(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn call(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: WriteInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        match write_args(&input, &self.default_namespace) {
            Ok((args, manifest)) => {
                self.kubectl
                    .run(&args, manifest.as_deref(), &ctx.cancel)
                    .await
            }
            Err(e) => ToolOutput::error(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
enum DiscoveryOperation {
    Resources,
    Explain,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryInput {
    operation: DiscoveryOperation,
    #[serde(default)]
    api_group: Option<String>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    recursive: bool,
}

fn discovery_args(input: &DiscoveryInput) -> Result<Vec<String>, String> {
    match input.operation {
        DiscoveryOperation::Resources => {
            let mut args = vec!["api-resources".to_string()];
            if let Some(group) = input.api_group.as_deref().filter(|g| !g.is_empty()) {
                check_token("apiGroup", group)?;
                args.push(format!("--api-group={group}"));
            }
            args.extend(["--output".to_string(), "wide".to_string()]);
            Ok(args)
        }
        DiscoveryOperation::Explain => {
            let resource = required_token("resource", input.resource.as_deref())?;
            let mut args = vec!["explain".to_string(), resource.to_string()];
            if input.recursive {
                args.push("--recursive".to_string());
            }
            Ok(args)
        }
    }
}

/// Custom-resource discovery: which APIs the cluster serves and their schemas
pub struct K8sDiscoveryTool {
    kubectl: Arc<CommandRunner>,
}

impl K8sDiscoveryTool {
    pub fn new(kubectl: Arc<CommandRunner>) -> Self {
        Self { kubectl }
    }
}

#[async_trait]
impl Tool for K8sDiscoveryTool {
    fn name(&self) -> &'static str {
        "K8sDiscover"
    }

    fn description(&self) -> String {
        "Learn about custom resources (non-builtin kinds, typically installed by an operator) \
         before reading or writing them. RESOURCES lists the resource types the cluster serves, \
         optionally for one API group. EXPLAIN documents the schema of a resource or one of its \
         fields, e.g. certificates.spec or kueryflows.spec.steps."
            .to_string()
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::string("operation", "The operation to perform.")
                .one_of(["RESOURCES", "EXPLAIN"])
                .required(),
            ToolParameter::string("apiGroup", "RESOURCES only lists this API group, e.g. cert-manager.io."),
            ToolParameter::string("resource", "The resource or field path. Required for EXPLAIN."),
            ToolParameter::boolean("recursive", "EXPLAIN every nested field."),
        ]
    }

    fn requires_explaining(&self) -> bool {
        true
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn call(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: DiscoveryInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return e,
        };
        match discovery_args(&input) {
            Ok(args) => self.kubectl.run(&args, None, &ctx.cancel).await,
            Err(e) => ToolOutput::error(e),
        }
    }
}
