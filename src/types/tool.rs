//! Tool calling definitions.

use serde::{Deserialize, Serialize};

use crate::schema::{self, SchemaNode};
use crate::Result;

/// A callable tool offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters: SchemaNode,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, parameters: SchemaNode) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters,
        }
    }

    /// Parameters given as a JSON Schema document or structural schema value.
    pub fn from_schema_value(name: impl Into<String>, parameters: &serde_json::Value) -> Result<Self> {
        Ok(Self::new(name, schema::to_node(parameters)?))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Tool call (invocation from model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Which tool, if any, the model must call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Required,
    None,
    Named(String),
}
