//! Lowering of plain JSON Schema documents.

use serde_json::{Map, Value};

use super::node::{NodeKind, NumberConstraints, ObjectSchema, SchemaNode, StringConstraints};
use crate::{Error, ErrorContext, Result};

const DOCUMENT_MARKERS: &[&str] = &["type", "properties", "items", "anyOf", "oneOf", "$ref", "enum", "const"];

pub fn is_json_document(value: &Value) -> bool {
    value
        .as_object()
        .map(|m| DOCUMENT_MARKERS.iter().any(|k| m.contains_key(*k)))
        .unwrap_or(false)
}

/// Convert a JSON Schema document into a [`SchemaNode`].
///
/// Local `$ref`s (`#/definitions/...`, `#/$defs/...`) are inlined; recursive references
/// are rejected because the node tree has no cycles.
pub fn to_node(document: &Value) -> Result<SchemaNode> {
    let mut converter = Converter {
        root: document,
        ref_stack: Vec::new(),
    };
    converter.convert(document, "")
}

struct Converter<'a> {
    root: &'a Value,
    ref_stack: Vec<String>,
}

fn schema_error(msg: impl Into<String>, path: &str) -> Error {
    Error::schema_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(if path.is_empty() { "$" } else { path })
            .with_source("json_schema_document"),
    )
}

fn child_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn is_null_type(schema: &Value) -> bool {
    schema.get("type").and_then(|t| t.as_str()) == Some("null")
        || schema.get("const").map(Value::is_null).unwrap_or(false)
}

impl<'a> Converter<'a> {
    fn convert(&mut self, schema: &'a Value, path: &str) -> Result<SchemaNode> {
        let map = match schema {
            Value::Object(map) => map,
            // `true` is the match-anything schema; there is no node for it.
            _ => return Err(schema_error("schema must be an object", path)),
        };
        let node = self.convert_map(map, path)?;
        Ok(match map.get("description").and_then(|d| d.as_str()) {
            Some(d) => node.with_description(d),
            None => node,
        })
    }

    fn convert_map(&mut self, map: &'a Map<String, Value>, path: &str) -> Result<SchemaNode> {
        if let Some(reference) = map.get("$ref").and_then(|r| r.as_str()) {
            return self.convert_ref(reference, path);
        }

        if let Some(value) = map.get("const") {
            return Ok(SchemaNode::literal(value.clone()));
        }

        if let Some(values) = map.get("enum").and_then(|e| e.as_array()) {
            return enum_node(values, path);
        }

        for union_key in ["anyOf", "oneOf"] {
            if let Some(arms) = map.get(union_key).and_then(|a| a.as_array()) {
                return self.union_node(arms, path);
            }
        }

        if let Some(parts) = map.get("allOf").and_then(|a| a.as_array()) {
            if let [single] = parts.as_slice() {
                return self.convert(single, path);
            }
            return Err(schema_error("allOf with more than one member is not supported", path));
        }

        match map.get("type") {
            Some(Value::String(t)) => self.typed_node(t, map, path),
            Some(Value::Array(types)) => {
                let names: Vec<&str> = types.iter().filter_map(|t| t.as_str()).collect();
                let has_null = names.contains(&"null");
                let rest: Vec<&str> = names.iter().copied().filter(|t| *t != "null").collect();
                match (rest.as_slice(), has_null) {
                    ([single], true) => Ok(self.typed_node(single, map, path)?.nullable()),
                    ([single], false) => self.typed_node(single, map, path),
                    _ => Err(schema_error("multi-type schemas are not supported", path)),
                }
            }
            Some(_) => Err(schema_error("`type` must be a string or array", path)),
            None if map.contains_key("properties") => self.typed_node("object", map, path),
            None if map.contains_key("items") => self.typed_node("array", map, path),
            None => Err(schema_error("schema has no recognizable type", path)),
        }
    }

    fn typed_node(&mut self, type_name: &str, map: &'a Map<String, Value>, path: &str) -> Result<SchemaNode> {
        let u64_of = |key: &str| map.get(key).and_then(|v| v.as_u64());
        let f64_of = |key: &str| map.get(key).and_then(|v| v.as_f64());
        Ok(match type_name {
            "string" => SchemaNode::string_with(StringConstraints {
                pattern: map.get("pattern").and_then(|p| p.as_str()).map(String::from),
                min_length: u64_of("minLength"),
                max_length: u64_of("maxLength"),
                format: map.get("format").and_then(|f| f.as_str()).map(String::from),
            }),
            "number" | "integer" => {
                let (minimum, exclusive_minimum) = bound(map, "minimum", "exclusiveMinimum", f64::max);
                let (maximum, exclusive_maximum) = bound(map, "maximum", "exclusiveMaximum", f64::min);
                SchemaNode::number_with(NumberConstraints {
                    integer: type_name == "integer",
                    minimum,
                    maximum,
                    exclusive_minimum,
                    exclusive_maximum,
                    multiple_of: f64_of("multipleOf"),
                })
            }
            "boolean" => SchemaNode::boolean(),
            "null" => SchemaNode::literal(Value::Null),
            "array" => {
                let items = match map.get("items") {
                    Some(items @ Value::Object(_)) => items,
                    Some(_) => return Err(schema_error("tuple-style `items` is not supported", path)),
                    None => return Err(schema_error("array schema has no `items`", path)),
                };
                let items = self.convert(items, &format!("{}[]", path))?;
                SchemaNode::new(NodeKind::Array {
                    items: Box::new(items),
                    min_items: u64_of("minItems"),
                    max_items: u64_of("maxItems"),
                })
            }
            "object" => {
                let required: Vec<&str> = map
                    .get("required")
                    .and_then(|r| r.as_array())
                    .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
                    .unwrap_or_default();
                let mut object = ObjectSchema::new();
                if let Some(properties) = map.get("properties").and_then(|p| p.as_object()) {
                    for (name, child) in properties {
                        let node = self.convert(child, &child_path(path, name))?;
                        let is_required = required.contains(&name.as_str());
                        let node = if is_required { node } else { node.optional() };
                        object.insert(name.clone(), node, is_required);
                    }
                }
                SchemaNode::object(object)
            }
            other => return Err(schema_error(format!("unsupported type '{}'", other), path)),
        })
    }

    fn union_node(&mut self, arms: &'a [Value], path: &str) -> Result<SchemaNode> {
        let has_null = arms.iter().any(is_null_type);
        let rest: Vec<&'a Value> = arms.iter().filter(|a| !is_null_type(a)).collect();
        match (rest.as_slice(), has_null) {
            ([single], true) => Ok(self.convert(single, path)?.nullable()),
            ([single], false) => self.convert(single, path),
            _ => Err(schema_error("unions other than `T | null` are not supported", path)),
        }
    }

    fn convert_ref(&mut self, reference: &str, path: &str) -> Result<SchemaNode> {
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| schema_error(format!("only local $ref is supported: {}", reference), path))?;
        if self.ref_stack.iter().any(|r| r == reference) {
            return Err(schema_error(format!("recursive $ref '{}' is not supported", reference), path));
        }
        let root: &'a Value = self.root;
        let target = root
            .pointer(pointer)
            .ok_or_else(|| schema_error(format!("unresolved $ref '{}'", reference), path))?;
        self.ref_stack.push(reference.to_string());
        let result = self.convert(target, path);
        self.ref_stack.pop();
        result
    }
}

/// One numeric bound and whether it is strict.
///
/// Accepts both the numeric `exclusiveMinimum: 5` form and the older boolean
/// `minimum: 5, exclusiveMinimum: true` form. When both an inclusive and a strict bound
/// are given, the tighter one (picked by `tighter`) is kept.
fn bound(map: &Map<String, Value>, inclusive: &str, exclusive: &str, tighter: fn(f64, f64) -> f64) -> (Option<f64>, bool) {
    let inclusive = map.get(inclusive).and_then(|v| v.as_f64());
    match map.get(exclusive) {
        Some(Value::Bool(strict)) => (inclusive, *strict && inclusive.is_some()),
        Some(Value::Number(n)) => match (n.as_f64(), inclusive) {
            (Some(strict), Some(plain)) if tighter(strict, plain) != strict => (Some(plain), false),
            (Some(strict), _) => (Some(strict), true),
            (None, plain) => (plain, false),
        },
        _ => (inclusive, false),
    }
}

fn enum_node(values: &[Value], path: &str) -> Result<SchemaNode> {
    let has_null = values.iter().any(Value::is_null);
    let rest: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    let node = if rest.iter().all(|v| v.is_string()) && !rest.is_empty() {
        SchemaNode::enumeration(rest.iter().filter_map(|v| v.as_str()))
    } else if let [single] = rest.as_slice() {
        SchemaNode::literal((*single).clone())
    } else {
        return Err(schema_error("enum members must be strings", path));
    };
    Ok(if has_null { node.nullable() } else { node })
}
