//! Anthropic-style dialect (messages API tool use).

use serde_json::{json, Map, Value};

use super::{
    ensure_tool_exists, literal_type, precondition_error, structured_output_definition, CompiledTooling,
    StructuredMode, StructuredPlan, STRUCTURED_OUTPUT_TOOL,
};
use crate::schema::{NodeKind, ResponseSchema, SchemaNode};
use crate::types::tool::{ToolChoice, ToolDefinition};
use crate::Result;

const SOURCE: &str = "anthropic_dialect";

pub fn compile(node: &SchemaNode) -> Value {
    let mut out = match &node.kind {
        NodeKind::Optional(inner) | NodeKind::Nullable(inner) => compile(inner),
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
            m.insert("items".into(), compile(items));
            if let Some(n) = min_items {
                m.insert("minItems".into(), json!(n));
            }
            if let Some(n) = max_items {
                m.insert("maxItems".into(), json!(n));
            }
            Value::Object(m)
        }
        NodeKind::Object(object) => {
            let properties: Map<String, Value> = object
                .properties
                .iter()
                .map(|p| (p.name.clone(), compile(&p.node)))
                .collect();
            let required: Vec<&str> = object
                .names()
                .filter(|name| object.is_required(name))
                .collect();
            let mut m = Map::new();
            m.insert("type".into(), json!("object"));
            m.insert("properties".into(), Value::Object(properties));
            if !required.is_empty() {
                m.insert("required".into(), json!(required));
            }
            Value::Object(m)
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

pub fn compile_tool(tool: &ToolDefinition) -> Value {
    let mut m = Map::new();
    m.insert("name".into(), json!(tool.name));
    if let Some(d) = &tool.description {
        m.insert("description".into(), json!(d));
    }
    m.insert("input_schema".into(), compile(&tool.parameters));
    Value::Object(m)
}

pub fn structured_output_tool(schema: &ResponseSchema) -> (Value, StructuredPlan) {
    let (definition, wrapped) = structured_output_definition(schema);
    (
        compile_tool(&definition),
        StructuredPlan {
            schema: schema.clone(),
            mode: StructuredMode::Tool { wrapped },
            optional_paths: Default::default(),
        },
    )
}

fn forced(name: &str) -> Value {
    json!({ "type": "tool", "name": name })
}

/// `tools` / `tool_choice` request fields.
///
/// With a schema the structured-output tool is forced unless a user tool is named.
/// Otherwise `Required` without a name resolves to the only declared tool; with more
/// than one tool it is rejected.
pub fn compile_tooling(
    schema: Option<&ResponseSchema>,
    tools: &[ToolDefinition],
    choice: Option<&ToolChoice>,
) -> Result<CompiledTooling> {
    let mut declarations: Vec<Value> = tools.iter().map(compile_tool).collect();
    let mut fields = Map::new();

    let plan = match schema {
        Some(schema) => {
            let (tool, plan) = structured_output_tool(schema);
            declarations.push(tool);
            let directive = match choice {
                Some(ToolChoice::None) => {
                    return Err(precondition_error(
                        "tool_choice 'none' cannot be combined with a response schema",
                        SOURCE,
                    ))
                }
                Some(ToolChoice::Required) if !tools.is_empty() => {
                    return Err(precondition_error(
                        "tool_choice 'required' without a tool name is ambiguous with more than one tool",
                        SOURCE,
                    ))
                }
                Some(ToolChoice::Named(name)) if name != STRUCTURED_OUTPUT_TOOL => {
                    ensure_tool_exists(name, tools, SOURCE)?;
                    forced(name)
                }
                _ => forced(STRUCTURED_OUTPUT_TOOL),
            };
            fields.insert("tool_choice".into(), directive);
            Some(plan)
        }
        None => {
            if let Some(choice) = choice {
                let directive = match choice {
                    ToolChoice::Auto => json!({ "type": "auto" }),
                    ToolChoice::None => json!({ "type": "none" }),
                    ToolChoice::Named(name) => {
                        ensure_tool_exists(name, tools, SOURCE)?;
                        forced(name)
                    }
                    ToolChoice::Required => match tools {
                        [only] => forced(&only.name),
                        [] => {
                            return Err(precondition_error(
                                "tool_choice 'required' given without any tools",
                                SOURCE,
                            ))
                        }
                        _ => {
                            return Err(precondition_error(
                                "tool_choice 'required' without a tool name is ambiguous with more than one tool",
                                SOURCE,
                            ))
                        }
                    },
                };
                if !tools.is_empty() {
                    fields.insert("tool_choice".into(), directive);
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
