//! OpenAI-style dialect (chat completions, strict function calling).
//!
//! Strict mode wants every property in `required` and `additionalProperties: false` on
//! every object. Real optionality is therefore reported next to the schema as a set of
//! field paths; the normalizer drops `null`s found at those paths.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use super::{
    child_path, ensure_tool_exists, literal_type, precondition_error, structured_output_definition,
    CompiledTooling, StructuredMode, StructuredPlan, STRUCTURED_OUTPUT_TOOL,
};
use crate::schema::{NodeKind, ResponseSchema, SchemaNode};
use crate::types::tool::{ToolChoice, ToolDefinition};
use crate::Result;

const SOURCE: &str = "openai_dialect";

/// Compiled schema plus the out-of-band optional field paths.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSchema {
    pub schema: Value,
    pub optional_paths: BTreeSet<String>,
}

pub fn compile(node: &SchemaNode) -> OpenAiSchema {
    let mut optional_paths = BTreeSet::new();
    let schema = compile_node(node, "", &mut optional_paths);
    OpenAiSchema {
        schema,
        optional_paths,
    }
}

fn compile_node(node: &SchemaNode, path: &str, optional_paths: &mut BTreeSet<String>) -> Value {
    let mut out = match &node.kind {
        // Neither wrapper has a wire form here.
        NodeKind::Optional(inner) | NodeKind::Nullable(inner) => compile_node(inner, path, optional_paths),
        NodeKind::String(c) => {
            let mut m = Map::new();
            m.insert("type".into(), json!("string"));
            if let Some(p) = &c.pattern {
                m.insert("pattern".into(), json!(p));
            }
            if let Some(n) = c.min_length {
                m.insert("minLength".into(), json!(n));
            }
            if let Some(n) = c.max_length {
                m.insert("maxLength".into(), json!(n));
            }
            if let Some(f) = &c.format {
                m.insert("format".into(), json!(f));
            }
            Value::Object(m)
        }
        NodeKind::Number(c) => {
            let mut m = Map::new();
            m.insert("type".into(), json!(if c.integer { "integer" } else { "number" }));
            if let Some(n) = c.minimum {
                let key = if c.exclusive_minimum { "exclusiveMinimum" } else { "minimum" };
                m.insert(key.into(), json!(n));
            }
            if let Some(n) = c.maximum {
                let key = if c.exclusive_maximum { "exclusiveMaximum" } else { "maximum" };
                m.insert(key.into(), json!(n));
            }
            if let Some(n) = c.multiple_of {
                m.insert("multipleOf".into(), json!(n));
            }
            Value::Object(m)
        }
        NodeKind::Boolean => json!({ "type": "boolean" }),
        NodeKind::Array {
            items,
            min_items,
            max_items,
        } => {
            let mut m = Map::new();
            m.insert("type".into(), json!("array"));
            m.insert(
                "items".into(),
                compile_node(items, &format!("{}[]", path), optional_paths),
            );
            if let Some(n) = min_items {
                m.insert("minItems".into(), json!(n));
            }
            if let Some(n) = max_items {
                m.insert("maxItems".into(), json!(n));
            }
            Value::Object(m)
        }
        NodeKind::Object(object) => {
            let mut properties = Map::new();
            let mut required = Vec::with_capacity(object.properties.len());
            for property in &object.properties {
                let property_path = child_path(path, &property.name);
                if !object.is_required(&property.name) {
                    optional_paths.insert(property_path.clone());
                }
                properties.insert(
                    property.name.clone(),
                    compile_node(&property.node, &property_path, optional_paths),
                );
                required.push(json!(property.name));
            }
            json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            })
        }
        NodeKind::Enum(values) => json!({ "type": "string", "enum": values }),
        NodeKind::Literal(Value::Null) => json!({ "type": "null" }),
        NodeKind::Literal(value) => json!({ "type": literal_type(value), "enum": [value] }),
    };
    if let (Some(description), Value::Object(m)) = (&node.description, &mut out) {
        m.insert("description".into(), json!(description));
    }
    out
}

/// Function tool declaration in strict mode.
pub fn compile_tool(tool: &ToolDefinition) -> (Value, BTreeSet<String>) {
    let compiled = compile(&tool.parameters);
    let mut function = Map::new();
    function.insert("name".into(), json!(tool.name));
    if let Some(d) = &tool.description {
        function.insert("description".into(), json!(d));
    }
    function.insert("parameters".into(), compiled.schema);
    function.insert("strict".into(), json!(true));
    (
        json!({ "type": "function", "function": function }),
        compiled.optional_paths,
    )
}

/// The synthetic structured-output tool and the plan the normalizer follows.
pub fn structured_output_tool(schema: &ResponseSchema) -> (Value, StructuredPlan) {
    let (definition, wrapped) = structured_output_definition(schema);
    let (tool, optional_paths) = compile_tool(&definition);
    (
        tool,
        StructuredPlan {
            schema: schema.clone(),
            mode: StructuredMode::Tool { wrapped },
            optional_paths,
        },
    )
}

fn named_choice(name: &str) -> Value {
    json!({ "type": "function", "function": { "name": name } })
}

/// `tools` / `tool_choice` request fields.
pub fn compile_tooling(
    schema: Option<&ResponseSchema>,
    tools: &[ToolDefinition],
    choice: Option<&ToolChoice>,
) -> Result<CompiledTooling> {
    let mut declarations: Vec<Value> = tools.iter().map(|t| compile_tool(t).0).collect();
    let mut fields = Map::new();

    let plan = match schema {
        Some(schema) => {
            let (tool, plan) = structured_output_tool(schema);
            declarations.push(tool);
            let forced = match choice {
                Some(ToolChoice::None) => {
                    return Err(precondition_error(
                        "tool_choice 'none' cannot be combined with a response schema",
                        SOURCE,
                    ))
                }
                Some(ToolChoice::Named(name)) if name != STRUCTURED_OUTPUT_TOOL => {
                    ensure_tool_exists(name, tools, SOURCE)?;
                    named_choice(name)
                }
                Some(ToolChoice::Named(_)) => named_choice(STRUCTURED_OUTPUT_TOOL),
                _ => json!("required"),
            };
            fields.insert("tool_choice".into(), forced);
            Some(plan)
        }
        None => {
            if let Some(choice) = choice {
                let value = match choice {
                    ToolChoice::Auto => json!("auto"),
                    ToolChoice::Required => json!("required"),
                    ToolChoice::None => json!("none"),
                    ToolChoice::Named(name) => {
                        ensure_tool_exists(name, tools, SOURCE)?;
                        named_choice(name)
                    }
                };
                if !tools.is_empty() {
                    fields.insert("tool_choice".into(), value);
                }
            }
            None
        }
    };

    if !declarations.is_empty() {
        fields.insert("tools".into(), Value::Array(declarations));
    }
    Ok(CompiledTooling { fields, plan })
}
