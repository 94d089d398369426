//! Validation of model output against a schema.
//!
//! Structural schemas are checked by walking the node tree; JSON Schema documents are
//! checked with a compiled validator taken from the [`ValidatorCache`].

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use super::cache::ValidatorCache;
use super::error::{ValidationError, ValidationResult};
use super::node::{NodeKind, NumberConstraints, ObjectSchema, SchemaNode, StringConstraints};
use super::{ResponseSchema, SchemaInput};
use crate::{Error, Result};

/// Validator over a [`SchemaNode`] tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeValidator {
    /// Reject object keys that the schema does not declare.
    strict: bool,
}

impl NodeValidator {
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn lenient() -> Self {
        Self { strict: false }
    }

    pub fn validate(&self, node: &SchemaNode, data: &Value) -> ValidationResult {
        let mut result = ValidationResult::success();
        self.validate_node(node, data, "", &mut result);
        result
    }

    fn validate_node(&self, node: &SchemaNode, data: &Value, path: &str, out: &mut ValidationResult) {
        match &node.kind {
            NodeKind::Optional(inner) => self.validate_node(inner, data, path, out),
            NodeKind::Nullable(inner) => {
                if !data.is_null() {
                    self.validate_node(inner, data, path, out);
                }
            }
            NodeKind::String(c) => match data.as_str() {
                Some(s) => validate_string(s, c, path, out),
                None => out.push(type_error("string", data, path)),
            },
            NodeKind::Number(c) => {
                if data.is_number() {
                    validate_number(data, c, path, out);
                } else {
                    out.push(type_error(if c.integer { "integer" } else { "number" }, data, path));
                }
            }
            NodeKind::Boolean => {
                if !data.is_boolean() {
                    out.push(type_error("boolean", data, path));
                }
            }
            NodeKind::Array {
                items,
                min_items,
                max_items,
            } => match data.as_array() {
                Some(arr) => {
                    if let Some(min) = min_items {
                        if (arr.len() as u64) < *min {
                            out.push(ValidationError::with_path(
                                format!("Array too short (minimum {} items)", min),
                                path,
                            ));
                        }
                    }
                    if let Some(max) = max_items {
                        if (arr.len() as u64) > *max {
                            out.push(ValidationError::with_path(
                                format!("Array too long (maximum {} items)", max),
                                path,
                            ));
                        }
                    }
                    for (i, item) in arr.iter().enumerate() {
                        self.validate_node(items, item, &format!("{}[{}]", path, i), out);
                    }
                }
                None => out.push(type_error("array", data, path)),
            },
            NodeKind::Object(object) => match data.as_object() {
                Some(_) => self.validate_object(object, data, path, out),
                None => out.push(type_error("object", data, path)),
            },
            NodeKind::Enum(values) => {
                let ok = data
                    .as_str()
                    .map(|s| values.iter().any(|v| v == s))
                    .unwrap_or(false);
                if !ok {
                    let allowed: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
                    out.push(
                        ValidationError::with_path(
                            format!("Value not in allowed enum values: {}", allowed.join(", ")),
                            path,
                        )
                        .with_value(data.clone()),
                    );
                }
            }
            NodeKind::Literal(expected) => {
                if !literal_matches(expected, data) {
                    out.push(
                        ValidationError::with_path(format!("Expected literal {}", expected), path)
                            .with_value(data.clone()),
                    );
                }
            }
        }
    }

    fn validate_object(&self, object: &ObjectSchema, data: &Value, path: &str, out: &mut ValidationResult) {
        let Some(obj) = data.as_object() else {
            return;
        };
        for property in &object.properties {
            let prop_path = child_path(path, &property.name);
            match obj.get(&property.name) {
                Some(value) => self.validate_node(&property.node, value, &prop_path, out),
                None if object.is_required(&property.name) => out.push(ValidationError::with_path(
                    format!("Missing required property: {}", property.name),
                    prop_path,
                )),
                None => {}
            }
        }
        if self.strict {
            let allowed: HashSet<&str> = object.names().collect();
            for key in obj.keys() {
                if !allowed.contains(key.as_str()) {
                    out.push(ValidationError::with_path(
                        format!("Additional property not allowed: {}", key),
                        child_path(path, key),
                    ));
                }
            }
        }
    }
}

fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::String(_) => "string",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}

fn type_error(expected: &str, data: &Value, path: &str) -> ValidationError {
    ValidationError::with_path(
        format!("Expected type '{}', got '{}'", expected, type_name(data)),
        path,
    )
    .with_value(data.clone())
}

fn validate_string(s: &str, c: &StringConstraints, path: &str, out: &mut ValidationResult) {
    let len = s.chars().count() as u64;
    if let Some(min) = c.min_length {
        if len < min {
            out.push(ValidationError::with_path(
                format!("String too short (minimum {} characters)", min),
                path,
            ));
        }
    }
    if let Some(max) = c.max_length {
        if len > max {
            out.push(ValidationError::with_path(
                format!("String too long (maximum {} characters)", max),
                path,
            ));
        }
    }
    if let Some(pattern) = &c.pattern {
        // An uncompilable pattern is not enforced.
        if let Ok(re) = Regex::new(pattern) {
            if !re.is_match(s) {
                out.push(ValidationError::with_path(
                    format!("String does not match pattern {}", pattern),
                    path,
                ));
            }
        }
    }
    if let Some(format) = &c.format {
        if !format_matches(format, s) {
            out.push(ValidationError::with_path(
                format!("String is not a valid {}", format),
                path,
            ));
        }
    }
}

fn format_matches(format: &str, s: &str) -> bool {
    match format {
        "uri" | "url" => url::Url::parse(s).is_ok(),
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        "email" => {
            let mut parts = s.splitn(2, '@');
            matches!((parts.next(), parts.next()), (Some(local), Some(domain))
                if !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
        }
        // Formats without a cheap check are accepted as-is.
        _ => true,
    }
}

fn validate_number(data: &Value, c: &NumberConstraints, path: &str, out: &mut ValidationResult) {
    let Some(value) = data.as_f64() else {
        return;
    };
    if c.integer && value.fract() != 0.0 {
        out.push(type_error("integer", data, path));
    }
    if let Some(min) = c.minimum {
        if c.exclusive_minimum && value <= min {
            out.push(ValidationError::with_path(format!("Value must be greater than {}", min), path));
        } else if value < min {
            out.push(ValidationError::with_path(format!("Value below minimum ({})", min), path));
        }
    }
    if let Some(max) = c.maximum {
        if c.exclusive_maximum && value >= max {
            out.push(ValidationError::with_path(format!("Value must be less than {}", max), path));
        } else if value > max {
            out.push(ValidationError::with_path(format!("Value above maximum ({})", max), path));
        }
    }
    if let Some(step) = c.multiple_of {
        if step > 0.0 {
            let ratio = value / step;
            if (ratio - ratio.round()).abs() > 1e-9 {
                out.push(ValidationError::with_path(
                    format!("Value is not a multiple of {}", step),
                    path,
                ));
            }
        }
    }
}

fn literal_matches(expected: &Value, data: &Value) -> bool {
    match (expected, data) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => expected == data,
    }
}

/// Validate `value` against the response schema, returning it unchanged on success.
pub fn validate_structured(schema: &ResponseSchema, value: Value, cache: &ValidatorCache) -> Result<Value> {
    let errors = match schema.input() {
        SchemaInput::JsonDocument(document) => {
            let compiled = cache.get_or_compile(document)?;
            let collected: Vec<ValidationError> = match compiled.validate(&value) {
                Ok(()) => Vec::new(),
                Err(errors) => errors
                    .map(|e| ValidationError::with_path(e.to_string(), e.instance_path.to_string()))
                    .collect(),
            };
            collected
        }
        SchemaInput::Structural(_) => NodeValidator::lenient().validate(schema.node(), &value).errors,
    };
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(Error::validation_failure(errors, Some(value.to_string())))
    }
}
