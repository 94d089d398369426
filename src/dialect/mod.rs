//! Dialect compilers: one pure function per backend from [`SchemaNode`] to wire schema.
//!
//! | Backend | Type names | `required` | Extras |
//! |---------|-----------|------------|--------|
//! | [`openai`] | lower-case | every property | `additionalProperties: false`, optional paths reported out of band |
//! | [`anthropic`] | lower-case | non-optional only | schema installed as a forced tool's `input_schema` |
//! | [`gemini`] | upper-case | non-optional only | `propertyOrdering`, `nullable: true`, native `responseSchema` mode |
//!
//! When structured output has to go through forced tool calling, the schema is wrapped
//! in a synthetic tool named [`STRUCTURED_OUTPUT_TOOL`]. Tool parameters must be objects,
//! so a non-object root is wrapped as `{ "value": <root> }` and unwrapped again when the
//! response is normalized.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::schema::{ObjectSchema, ResponseSchema, SchemaNode};
use crate::types::tool::ToolDefinition;
use crate::{Error, ErrorContext, Result};

pub const STRUCTURED_OUTPUT_TOOL: &str = "respond_with_structured_output";
pub const WRAPPED_VALUE_FIELD: &str = "value";

const STRUCTURED_OUTPUT_DESCRIPTION: &str =
    "Respond with the final answer. The arguments are the structured response.";

/// How the backend was asked for structured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredMode {
    /// Forced call of the synthetic tool; `wrapped` when the root was boxed under `value`.
    Tool { wrapped: bool },
    /// Backend-native response schema; the payload arrives as text.
    Native,
}

/// What the normalizer needs to know to extract and validate structured output.
#[derive(Debug, Clone)]
pub struct StructuredPlan {
    pub schema: ResponseSchema,
    pub mode: StructuredMode,
    /// Paths of fields that are optional but were declared required on the wire.
    /// Nulls found at these paths are removed before validation.
    pub optional_paths: BTreeSet<String>,
}

impl StructuredPlan {
    pub fn is_tool_based(&self) -> bool {
        matches!(self.mode, StructuredMode::Tool { .. })
    }
}

/// Request-body fields produced by a dialect, plus the structured-output plan if any.
#[derive(Debug, Clone, Default)]
pub struct CompiledTooling {
    pub fields: Map<String, Value>,
    pub plan: Option<StructuredPlan>,
}

/// Object root for tool parameters; the flag reports whether wrapping happened.
pub fn parameter_root(node: &SchemaNode) -> (SchemaNode, bool) {
    if node.is_object() {
        (node.clone(), false)
    } else {
        let wrapped = SchemaNode::object(ObjectSchema::new().property(WRAPPED_VALUE_FIELD, node.clone()));
        (wrapped, true)
    }
}

/// Synthetic tool carrying the response schema.
pub fn structured_output_definition(schema: &ResponseSchema) -> (ToolDefinition, bool) {
    let (root, wrapped) = parameter_root(schema.node());
    let description = schema
        .description()
        .map(|d| format!("{} {}", STRUCTURED_OUTPUT_DESCRIPTION, d))
        .unwrap_or_else(|| STRUCTURED_OUTPUT_DESCRIPTION.to_string());
    (
        ToolDefinition::new(STRUCTURED_OUTPUT_TOOL, root).with_description(description),
        wrapped,
    )
}

pub(crate) fn precondition_error(msg: impl Into<String>, source: &str) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path("request.tool_choice")
            .with_source(source),
    )
}

pub(crate) fn ensure_tool_exists(name: &str, tools: &[ToolDefinition], source: &str) -> Result<()> {
    if tools.iter().any(|t| t.name == name) {
        Ok(())
    } else {
        Err(precondition_error(
            format!("tool_choice names unknown tool '{}'", name),
            source,
        ))
    }
}

/// JSON type name of a literal, lower-case.
pub(crate) fn literal_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_object_root_is_wrapped() {
        let (root, wrapped) = parameter_root(&SchemaNode::array(SchemaNode::string()));
        assert!(wrapped);
        assert!(root.is_object());

        let object = SchemaNode::object(ObjectSchema::new().property("a", SchemaNode::boolean()));
        let (root, wrapped) = parameter_root(&object);
        assert!(!wrapped);
        assert_eq!(root, object);
    }

    #[test]
    fn test_structured_tool_named_consistently() {
        let schema = ResponseSchema::from_node(SchemaNode::string()).with_description("A haiku.");
        let (tool, wrapped) = structured_output_definition(&schema);
        assert_eq!(tool.name, STRUCTURED_OUTPUT_TOOL);
        assert!(wrapped);
        assert!(tool.description.unwrap().ends_with("A haiku."));
    }
}
