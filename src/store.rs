//! Flow persistence
//!
//! A flow is a named, replayable sequence of steps recorded from a
//! conversation. Stores only need a minimal keyed CRUD contract.

mod sqlite;

pub use sqlite::SqliteFlowStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("flow not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },
    #[error("flow already exists: {namespace}/{name}")]
    AlreadyExists { namespace: String, name: String },
    #[error("invalid name {value:?}: {reason}")]
    InvalidName { value: String, reason: &'static str },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Function name plus its argument object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arguments)
    }
}

/// One persisted step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowStep {
    /// Replayable tool invocation; the listed arguments must be re-derived
    /// at execution time
    ToolCall {
        function: FunctionCall,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args_to_recalculate: Vec<String>,
    },
    /// Literal instruction for the model
    Instruction { text: String },
    /// Hand control to the human
    HumanIntervention,
}

impl FlowStep {
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        FlowStep::ToolCall {
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
            args_to_recalculate: vec![],
        }
    }

    /// A tool call with no argument marked volatile can be replayed as is
    pub fn is_replayable(&self) -> bool {
        matches!(self, FlowStep::ToolCall { args_to_recalculate, .. } if args_to_recalculate.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    pub namespace: String,
    pub steps: Vec<FlowStep>,
}

impl Flow {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, steps: Vec<FlowStep>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            steps,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        validate_object_name(&self.name)?;
        validate_object_name(&self.namespace)
    }
}

/// Keyed flow storage
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<Flow>;

    /// Flows in a namespace, ordered by name
    async fn list(&self, namespace: &str) -> StoreResult<Vec<Flow>>;

    /// Fails with `AlreadyExists` if the key is taken
    async fn create(&self, flow: &Flow) -> StoreResult<()>;

    /// Fails with `NotFound` if the key is absent
    async fn update(&self, flow: &Flow) -> StoreResult<()>;
}

const MAX_NAME_LEN: usize = 63;

/// Kubernetes object-name rules: lowercase alphanumerics and '-', at most
/// 63 characters, starting and ending with an alphanumeric.
pub fn validate_object_name(value: &str) -> StoreResult<()> {
    let invalid = |reason| {
        Err(StoreError::InvalidName {
            value: value.to_string(),
            reason,
        })
    };

    if value.is_empty() {
        return invalid("must not be empty");
    }
    if value.len() > MAX_NAME_LEN {
        return invalid("must be at most 63 characters");
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("must consist of lowercase alphanumerics or '-'");
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(value.chars().next()) || !alnum(value.chars().last()) {
        return invalid("must start and end with an alphanumeric character");
    }
    Ok(())
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: Mutex<BTreeMap<(String, String), Flow>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, name: &str) -> (String, String) {
        (namespace.to_string(), name.to_string())
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<Flow> {
        let flows = self.flows.lock().map_err(|_| StoreError::Poisoned)?;
        flows
            .get(&Self::key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list(&self, namespace: &str) -> StoreResult<Vec<Flow>> {
        let flows = self.flows.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(flows
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, flow)| flow.clone())
            .collect())
    }

    async fn create(&self, flow: &Flow) -> StoreResult<()> {
        flow.validate()?;
        let mut flows = self.flows.lock().map_err(|_| StoreError::Poisoned)?;
        let key = Self::key(&flow.namespace, &flow.name);
        if flows.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                namespace: flow.namespace.clone(),
                name: flow.name.clone(),
            });
        }
        flows.insert(key, flow.clone());
        Ok(())
    }

    async fn update(&self, flow: &Flow) -> StoreResult<()> {
        flow.validate()?;
        let mut flows = self.flows.lock().map_err(|_| StoreError::Poisoned)?;
        match flows.get_mut(&Self::key(&flow.namespace, &flow.name)) {
            Some(existing) => {
                *existing = flow.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                namespace: flow.namespace.clone(),
                name: flow.name.clone(),
            }),
        }
    }
}
