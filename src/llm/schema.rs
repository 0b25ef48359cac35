//! Typed tool declarations
//!
//! Tools describe their parameters with these types instead of hand-built
//! JSON maps; providers render them to a JSON-Schema subset.

use serde_json::{json, Map, Value};

/// Declared shape of one tool, as offered to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// JSON schema for the tool input object
    pub fn input_schema(&self) -> Value {
        object_schema(&self.parameters)
    }
}

/// Parameter value kind
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<ParameterKind>),
    Object(Vec<ToolParameter>),
}

impl ParameterKind {
    fn schema(&self) -> Value {
        match self {
            ParameterKind::String => json!({ "type": "string" }),
            ParameterKind::Integer => json!({ "type": "integer" }),
            ParameterKind::Number => json!({ "type": "number" }),
            ParameterKind::Boolean => json!({ "type": "boolean" }),
            ParameterKind::Array(items) => json!({ "type": "array", "items": items.schema() }),
            ParameterKind::Object(fields) => object_schema(fields),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub required: bool,
    pub description: String,
    pub enum_values: Vec<String>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: description.into(),
            enum_values: vec![],
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::String, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Boolean, description)
    }

    pub fn string_array(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            name,
            ParameterKind::Array(Box::new(ParameterKind::String)),
            description,
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    fn schema(&self) -> Value {
        let mut schema = self.kind.schema();
        if let Value::Object(map) = &mut schema {
            if !self.description.is_empty() {
                map.insert("description".into(), Value::String(self.description.clone()));
            }
            if !self.enum_values.is_empty() {
                map.insert("enum".into(), json!(self.enum_values));
            }
        }
        schema
    }
}

fn object_schema(fields: &[ToolParameter]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|p| (p.name.clone(), p.schema()))
        .collect();
    let required: Vec<&str> = fields
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
