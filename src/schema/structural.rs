//! Lowering of serialized structural schema definitions (zod-style `_def` trees).
//!
//! Definitions are read through ordered candidate accessors rather than one fixed field
//! name: the definition object may sit under `_def`, `_zod.def` or `def`, the kind is named
//! by `typeName` (`"ZodString"`) or `type` (`"string"`), and enum members may be listed
//! under `values`, `options` or `entries`. New encodings are supported by extending the
//! candidate lists.

use serde_json::{Map, Value};

use super::node::{NodeKind, NumberConstraints, ObjectSchema, SchemaNode, StringConstraints};
use crate::{Error, ErrorContext, Result};

const DEF_ACCESSORS: &[&[&str]] = &[&["_def"], &["_zod", "def"], &["def"]];
const ENUM_ACCESSORS: &[&str] = &["values", "options", "entries"];
const ELEMENT_ACCESSORS: &[&str] = &["element", "items", "type"];
const INNER_ACCESSORS: &[&str] = &["innerType", "schema", "in"];
const CHECK_KIND_ACCESSORS: &[&str] = &["kind", "check"];

const MAX_DEPTH: usize = 64;

/// Locate the definition object of a structural schema value.
pub(crate) fn definition_of(value: &Value) -> Option<&Map<String, Value>> {
    for path in DEF_ACCESSORS {
        let mut cursor = value;
        let mut found = true;
        for key in *path {
            match cursor.get(*key) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(map) = cursor.as_object() {
                return Some(map);
            }
        }
    }
    None
}

pub fn is_structural(value: &Value) -> bool {
    definition_of(value).is_some()
}

/// Convert a structural schema value into a [`SchemaNode`].
pub fn to_node(value: &Value) -> Result<SchemaNode> {
    convert(value, "", 0)
}

fn schema_error(msg: impl Into<String>, path: &str) -> Error {
    Error::schema_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(if path.is_empty() { "$" } else { path })
            .with_source("structural_schema"),
    )
}

fn child_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn convert(value: &Value, path: &str, depth: usize) -> Result<SchemaNode> {
    if depth > MAX_DEPTH {
        return Err(schema_error("schema nesting too deep", path));
    }
    // Nested schemas are usually full wrappers, but a bare definition is accepted too.
    let def = match definition_of(value) {
        Some(def) => def,
        None => value
            .as_object()
            .filter(|m| m.contains_key("typeName") || m.contains_key("type"))
            .ok_or_else(|| schema_error("value is not a structural schema definition", path))?,
    };

    let kind = kind_name(def).ok_or_else(|| schema_error("definition does not name its kind", path))?;
    let description = def
        .get("description")
        .and_then(|d| d.as_str())
        .map(String::from);

    let node = match kind.as_str() {
        "string" => SchemaNode::string_with(string_constraints(def)),
        "number" | "float" | "int" | "bigint" => {
            let mut constraints = number_constraints(def);
            if kind == "int" || kind == "bigint" {
                constraints.integer = true;
            }
            SchemaNode::number_with(constraints)
        }
        "boolean" => SchemaNode::boolean(),
        "array" => {
            let element = first_present(def, ELEMENT_ACCESSORS)
                .filter(|v| v.is_object())
                .ok_or_else(|| schema_error("array definition has no element schema", path))?;
            let items = convert(element, &format!("{}[]", path), depth + 1)?;
            let (min_items, max_items) = array_bounds(def);
            SchemaNode::new(NodeKind::Array {
                items: Box::new(items),
                min_items,
                max_items,
            })
        }
        "object" => {
            let shape = def
                .get("shape")
                .or_else(|| def.get("properties"))
                .and_then(|s| s.as_object())
                .ok_or_else(|| schema_error("object definition has no shape", path))?;
            let mut object = ObjectSchema::new();
            for (name, child) in shape {
                let child_node = convert(child, &child_path(path, name), depth + 1)?;
                let required = !child_node.is_optional();
                object.insert(name.clone(), child_node, required);
            }
            SchemaNode::object(object)
        }
        "enum" | "nativeenum" => SchemaNode::enumeration(enum_values(def, path)?),
        "literal" => {
            let value = def
                .get("value")
                .cloned()
                .or_else(|| {
                    def.get("values")
                        .and_then(|v| v.as_array())
                        .and_then(|a| a.first().cloned())
                })
                .ok_or_else(|| schema_error("literal definition has no value", path))?;
            SchemaNode::literal(value)
        }
        "optional" | "default" | "catch" => convert(inner_of(def, path)?, path, depth + 1)?.optional(),
        "nullable" => convert(inner_of(def, path)?, path, depth + 1)?.nullable(),
        "effects" | "pipe" | "readonly" | "branded" | "lazy" => {
            convert(inner_of(def, path)?, path, depth + 1)?
        }
        "union" => union_node(def, path, depth)?,
        other => {
            return Err(schema_error(
                format!("unsupported structural kind '{}'", other),
                path,
            ))
        }
    };

    Ok(match description {
        Some(d) => node.with_description(d),
        None => node,
    })
}

/// Kind name, normalized: `"ZodString"` and `"string"` both yield `"string"`.
fn kind_name(def: &Map<String, Value>) -> Option<String> {
    if let Some(name) = def.get("typeName").and_then(|t| t.as_str()) {
        let trimmed = name.strip_prefix("Zod").unwrap_or(name);
        return Some(trimmed.to_ascii_lowercase());
    }
    def.get("type")
        .and_then(|t| t.as_str())
        .map(|t| t.to_ascii_lowercase())
}

fn first_present<'a>(def: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| def.get(*k))
}

fn inner_of<'a>(def: &'a Map<String, Value>, path: &str) -> Result<&'a Value> {
    first_present(def, INNER_ACCESSORS).ok_or_else(|| schema_error("wrapper has no inner schema", path))
}

fn checks(def: &Map<String, Value>) -> impl Iterator<Item = (String, &Value)> {
    def.get("checks")
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
        .filter_map(|check| {
            let body = check_body(check)?;
            let kind = CHECK_KIND_ACCESSORS
                .iter()
                .find_map(|k| body.get(*k).and_then(|v| v.as_str()))?;
            Some((kind.to_string(), check))
        })
}

// Newer encodings nest the check body under `_zod.def`.
fn check_body(check: &Value) -> Option<&Map<String, Value>> {
    definition_of(check).or_else(|| check.as_object())
}

fn check_number(check: &Value, keys: &[&str]) -> Option<f64> {
    let body = check_body(check)?;
    keys.iter().find_map(|k| body.get(*k).and_then(|v| v.as_f64()))
}

fn is_strict(check: &Value) -> bool {
    check_body(check).and_then(|body| body.get("inclusive")).and_then(|v| v.as_bool()) == Some(false)
}

fn check_str<'a>(check: &'a Value, keys: &[&str]) -> Option<&'a str> {
    let body = check_body(check)?;
    keys.iter().find_map(|k| match body.get(*k) {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Object(o)) => o.get("source").and_then(|s| s.as_str()),
        _ => None,
    })
}

fn string_constraints(def: &Map<String, Value>) -> StringConstraints {
    let mut c = StringConstraints::default();
    // Last conflicting check wins.
    for (kind, check) in checks(def) {
        match kind.as_str() {
            "min" | "min_length" => {
                c.min_length = check_number(check, &["value", "minimum"]).map(|v| v as u64)
            }
            "max" | "max_length" => {
                c.max_length = check_number(check, &["value", "maximum"]).map(|v| v as u64)
            }
            "length" | "length_equals" => {
                let n = check_number(check, &["value", "length"]).map(|v| v as u64);
                c.min_length = n;
                c.max_length = n;
            }
            "regex" => c.pattern = check_str(check, &["regex", "pattern"]).map(String::from),
            "string_format" => {
                if let Some(format) = check_str(check, &["format"]) {
                    if format == "regex" {
                        c.pattern = check_str(check, &["pattern"]).map(String::from);
                    } else {
                        c.format = Some(normalize_format(format).to_string());
                    }
                }
            }
            "email" | "url" | "uuid" | "datetime" | "date" | "time" | "ip" | "cuid" | "ulid"
            | "emoji" | "duration" => c.format = Some(normalize_format(&kind).to_string()),
            _ => {}
        }
    }
    c
}

fn normalize_format(format: &str) -> &str {
    match format {
        "url" => "uri",
        "datetime" => "date-time",
        "ip" => "ipv4",
        other => other,
    }
}

fn number_constraints(def: &Map<String, Value>) -> NumberConstraints {
    let mut c = NumberConstraints::default();
    for (kind, check) in checks(def) {
        match kind.as_str() {
            "min" | "greater_than" => {
                c.minimum = check_number(check, &["value", "minimum"]);
                c.exclusive_minimum = is_strict(check);
            }
            "max" | "less_than" => {
                c.maximum = check_number(check, &["value", "maximum"]);
                c.exclusive_maximum = is_strict(check);
            }
            "int" => c.integer = true,
            "number_format" => {
                if let Some(format) = check_str(check, &["format"]) {
                    c.integer = matches!(format, "safeint" | "int32" | "uint32" | "int64");
                }
            }
            "multipleOf" | "multiple_of" => {
                c.multiple_of = check_number(check, &["value"])
            }
            _ => {}
        }
    }
    c
}

fn array_bounds(def: &Map<String, Value>) -> (Option<u64>, Option<u64>) {
    let bound = |key: &str| {
        def.get(key).and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::Object(o) => o.get("value").and_then(|v| v.as_u64()),
            _ => None,
        })
    };
    let mut min_items = bound("minLength");
    let mut max_items = bound("maxLength");
    if let Some(exact) = bound("exactLength") {
        min_items = Some(exact);
        max_items = Some(exact);
    }
    // Newer encodings express length limits as checks.
    for (kind, check) in checks(def) {
        match kind.as_str() {
            "min_length" => min_items = check_number(check, &["minimum", "value"]).map(|v| v as u64),
            "max_length" => max_items = check_number(check, &["maximum", "value"]).map(|v| v as u64),
            "length_equals" => {
                let n = check_number(check, &["length", "value"]).map(|v| v as u64);
                min_items = n;
                max_items = n;
            }
            _ => {}
        }
    }
    (min_items, max_items)
}

fn enum_values(def: &Map<String, Value>, path: &str) -> Result<Vec<String>> {
    let raw = first_present(def, ENUM_ACCESSORS)
        .ok_or_else(|| schema_error("enum definition lists no values", path))?;
    let mut values: Vec<String> = Vec::new();
    let mut push = |v: &Value| {
        if let Some(s) = v.as_str() {
            if !values.iter().any(|existing| existing == s) {
                values.push(s.to_string());
            }
        }
    };
    match raw {
        Value::Array(items) => items.iter().for_each(&mut push),
        Value::Object(map) => map.values().for_each(&mut push),
        _ => {}
    }
    if values.is_empty() {
        return Err(schema_error("enum has no string members", path));
    }
    Ok(values)
}

fn is_null_schema(value: &Value) -> bool {
    let def = definition_of(value).or_else(|| value.as_object());
    match def.and_then(kind_name) {
        Some(kind) if kind == "null" => true,
        Some(kind) if kind == "literal" => def
            .and_then(|d| d.get("value"))
            .map(Value::is_null)
            .unwrap_or(false),
        _ => false,
    }
}

/// Only `T | null` unions have a node representation.
fn union_node(def: &Map<String, Value>, path: &str, depth: usize) -> Result<SchemaNode> {
    let options = def
        .get("options")
        .and_then(|o| o.as_array())
        .ok_or_else(|| schema_error("union definition has no options", path))?;
    let has_null = options.iter().any(is_null_schema);
    let rest: Vec<&Value> = options.iter().filter(|o| !is_null_schema(o)).collect();
    match (rest.as_slice(), has_null) {
        ([single], true) => Ok(convert(single, path, depth + 1)?.nullable()),
        ([single], false) => convert(single, path, depth + 1),
        _ => Err(schema_error(
            "unions other than `T | null` are not supported",
            path,
        )),
    }
}
