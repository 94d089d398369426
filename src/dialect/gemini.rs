//! Gemini-style dialect (generateContent `responseSchema` / function declarations).
//!
//! Upper-case type names, `propertyOrdering` beside `required`, `nullable: true` instead
//! of a null union. There are no constant literals: string literals become a one-value
//! enum, numeric and boolean literals a bare typed field. `multipleOf` has no equivalent
//! and is dropped.

use serde_json::{json, Map, Value};

use super::{
    ensure_tool_exists, precondition_error, structured_output_definition, CompiledTooling, StructuredMode,
    StructuredPlan, STRUCTURED_OUTPUT_TOOL,
};
use crate::schema::{NodeKind, ResponseSchema, SchemaNode};
use crate::types::tool::{ToolChoice, ToolDefinition};
use crate::Result;

const SOURCE: &str = "gemini_dialect";

/// Formats the backend accepts on `STRING`.
const SUPPORTED_STRING_FORMATS: &[&str] = &["date-time", "enum"];

pub fn compile(node: &SchemaNode) -> Value {
    let mut out = match &node.kind {
        NodeKind::Optional(inner) => compile(inner),
        NodeKind::Nullable(inner) => {
            let mut inner = compile(inner);
            if let Value::Object(m) = &mut inner {
                m.insert("nullable".into(), json!(true));
            }
            inner
        }
        NodeKind::String(c) => {
            let mut m = Map::new();
            m.insert("type".into(), json!("STRING"));
            if let Some(f) = c.format.as_deref().filter(|f| SUPPORTED_STRING_FORMATS.contains(f)) {
                m.insert("format".into(), json!(f));
            }
            if let Some(p) = &c.pattern {
                m.insert("pattern".into(), json!(p));
            }
            if let Some(n) = c.min_length {
                m.insert("minLength".into(), json!(n.to_string()));
            }
            if let Some(n) = c.max_length {
                m.insert("maxLength".into(), json!(n.to_string()));
            }
            Value::Object(m)
        }
        NodeKind::Number(c) => {
            let mut m = Map::new();
            m.insert("type".into(), json!(if c.integer { "INTEGER" } else { "NUMBER" }));
            // No strict bounds here; a strict one is left out rather than loosened.
            if let Some(n) = c.minimum.filter(|_| !c.exclusive_minimum) {
                m.insert("minimum".into(), json!(n));
            }
            if let Some(n) = c.maximum.filter(|_| !c.exclusive_maximum) {
                m.insert("maximum".into(), json!(n));
            }
            Value::Object(m)
        }
        NodeKind::Boolean => json!({ "type": "BOOLEAN" }),
        NodeKind::Array {
            items,
            min_items,
            max_items,
        } => {
            let mut m = Map::new();
            m.insert("type".into(), json!("ARRAY"));
            m.insert("items".into(), compile(items));
            if let Some(n) = min_items {
                m.insert("minItems".into(), json!(n.to_string()));
            }
            if let Some(n) = max_items {
                m.insert("maxItems".into(), json!(n.to_string()));
            }
            Value::Object(m)
        }
        NodeKind::Object(object) => {
            let properties: Map<String, Value> = object
                .properties
                .iter()
                .map(|p| (p.name.clone(), compile(&p.node)))
                .collect();
            let ordering: Vec<&str> = object.names().collect();
            let required: Vec<&str> = object
                .names()
                .filter(|name| object.is_required(name))
                .collect();
            let mut m = Map::new();
            m.insert("type".into(), json!("OBJECT"));
            m.insert("properties".into(), Value::Object(properties));
            if !required.is_empty() {
                m.insert("required".into(), json!(required));
            }
            if !ordering.is_empty() {
                m.insert("propertyOrdering".into(), json!(ordering));
            }
            Value::Object(m)
        }
        NodeKind::Enum(values) => json!({ "type": "STRING", "format": "enum", "enum": values }),
        NodeKind::Literal(value) => literal(value),
    };
    if let (Some(description), Value::Object(m)) = (&node.description, &mut out) {
        m.insert("description".into(), json!(description));
    }
    out
}

fn literal(value: &Value) -> Value {
    match value {
        Value::String(s) => json!({ "type": "STRING", "format": "enum", "enum": [s] }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "type": "INTEGER" }),
        Value::Number(_) => json!({ "type": "NUMBER" }),
        Value::Bool(_) => json!({ "type": "BOOLEAN" }),
        // No null type; the closest is a nullable string.
        Value::Null => json!({ "type": "STRING", "nullable": true }),
        Value::Array(_) => json!({ "type": "ARRAY" }),
        Value::Object(_) => json!({ "type": "OBJECT" }),
    }
}

pub fn compile_function(tool: &ToolDefinition) -> Value {
    let mut m = Map::new();
    m.insert("name".into(), json!(tool.name));
    if let Some(d) = &tool.description {
        m.insert("description".into(), json!(d));
    }
    m.insert("parameters".into(), compile(&tool.parameters));
    Value::Object(m)
}

pub fn structured_output_tool(schema: &ResponseSchema) -> (Value, StructuredPlan) {
    let (definition, wrapped) = structured_output_definition(schema);
    (
        compile_function(&definition),
        StructuredPlan {
            schema: schema.clone(),
            mode: StructuredMode::Tool { wrapped },
            optional_paths: Default::default(),
        },
    )
}

/// `generationConfig` fragment for native structured output.
pub fn native_response_config(schema: &ResponseSchema) -> (Value, StructuredPlan) {
    (
        json!({
            "responseMimeType": "application/json",
            "responseSchema": compile(schema.node()),
        }),
        StructuredPlan {
            schema: schema.clone(),
            mode: StructuredMode::Native,
            optional_paths: Default::default(),
        },
    )
}

fn calling_config(mode: &str, allowed: Option<&str>) -> Value {
    let mut config = json!({ "mode": mode });
    if let Some(name) = allowed {
        config["allowedFunctionNames"] = json!([name]);
    }
    json!({ "functionCallingConfig": config })
}

/// `tools` / `toolConfig` / `generationConfig` request fields.
///
/// A schema without tools uses the native response schema; with tools it is folded into
/// the function declarations instead.
pub fn compile_tooling(
    schema: Option<&ResponseSchema>,
    tools: &[ToolDefinition],
    choice: Option<&ToolChoice>,
) -> Result<CompiledTooling> {
    let mut fields = Map::new();

    if let (Some(schema), true) = (schema, tools.is_empty()) {
        if let Some(ToolChoice::Named(name)) = choice {
            if name != STRUCTURED_OUTPUT_TOOL {
                ensure_tool_exists(name, tools, SOURCE)?;
            }
        }
        let (config, plan) = native_response_config(schema);
        fields.insert("generationConfig".into(), config);
        return Ok(CompiledTooling {
            fields,
            plan: Some(plan),
        });
    }

    let mut declarations: Vec<Value> = tools.iter().map(compile_function).collect();
    let plan = match schema {
        Some(schema) => {
            let (declaration, plan) = structured_output_tool(schema);
            declarations.push(declaration);
            let config = match choice {
                Some(ToolChoice::None) => {
                    return Err(precondition_error(
                        "tool_choice 'none' cannot be combined with a response schema",
                        SOURCE,
                    ))
                }
                Some(ToolChoice::Named(name)) => {
                    if name != STRUCTURED_OUTPUT_TOOL {
                        ensure_tool_exists(name, tools, SOURCE)?;
                    }
                    calling_config("ANY", Some(name))
                }
                _ => calling_config("ANY", None),
            };
            fields.insert("toolConfig".into(), config);
            Some(plan)
        }
        None => {
            if let Some(choice) = choice {
                let config = match choice {
                    ToolChoice::Auto => calling_config("AUTO", None),
                    ToolChoice::Required => calling_config("ANY", None),
                    ToolChoice::None => calling_config("NONE", None),
                    ToolChoice::Named(name) => {
                        ensure_tool_exists(name, tools, SOURCE)?;
                        calling_config("ANY", Some(name))
                    }
                };
                if !tools.is_empty() {
                    fields.insert("toolConfig".into(), config);
                }
            }
            None
        }
    };

    if !declarations.is_empty() {
        fields.insert(
            "tools".into(),
            json!([{ "functionDeclarations": declarations }]),
        );
    }
    Ok(CompiledTooling { fields, plan })
}
