//! Turns a backend-neutral outcome into a [`ChatResult`], extracting and validating
//! structured output when a schema was requested.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use crate::dialect::{StructuredMode, StructuredPlan, STRUCTURED_OUTPUT_TOOL, WRAPPED_VALUE_FIELD};
use crate::schema::{validate_structured, ValidationError, ValidatorCache};
use crate::types::response::{ChatContent, ChatResult, FinishReason, ProviderExtras, Usage};
use crate::types::tool::ToolCall;
use crate::{Error, Result};

/// What a driver decoded from one response, before structured-output handling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Already mapped onto the shared vocabulary; `None` when the backend sent nothing.
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
    pub model: String,
    pub extras: ProviderExtras,
}

/// Build the final result. Schema mismatches surface as `Error::ValidationFailure`.
pub fn normalize(raw: RawOutcome, plan: Option<&StructuredPlan>, validators: &ValidatorCache) -> Result<ChatResult> {
    let finish_reason = raw.finish_reason.unwrap_or_default();
    let plan = match plan {
        Some(plan) => plan,
        None => {
            return Ok(ChatResult {
                content: ChatContent::Text(raw.text),
                usage: raw.usage,
                finish_reason,
                tool_calls: raw.tool_calls,
                model: raw.model,
                extras: raw.extras,
            })
        }
    };

    match plan.mode {
        StructuredMode::Tool { wrapped } => normalize_tool_mode(raw, plan, wrapped, finish_reason, validators),
        StructuredMode::Native => {
            let value = extract_json(&raw.text).ok_or_else(|| {
                Error::validation_failure(
                    vec![ValidationError::without_path("response text does not contain valid JSON")],
                    Some(raw.text.clone()),
                )
            })?;
            let value = validate_structured(&plan.schema, value, validators)?;
            Ok(ChatResult {
                content: ChatContent::Structured(value),
                usage: raw.usage,
                finish_reason,
                tool_calls: raw.tool_calls,
                model: raw.model,
                extras: raw.extras,
            })
        }
    }
}

fn normalize_tool_mode(
    mut raw: RawOutcome,
    plan: &StructuredPlan,
    wrapped: bool,
    finish_reason: FinishReason,
    validators: &ValidatorCache,
) -> Result<ChatResult> {
    let position = raw.tool_calls.iter().position(|c| c.name == STRUCTURED_OUTPUT_TOOL);
    let call = match position {
        Some(i) => raw.tool_calls.remove(i),
        None if !raw.tool_calls.is_empty() => {
            // The model chose one of the caller's tools; hand the calls back as-is.
            debug!(calls = raw.tool_calls.len(), "structured output deferred by tool calls");
            return Ok(ChatResult {
                content: ChatContent::Text(raw.text),
                usage: raw.usage,
                finish_reason: FinishReason::ToolCalls,
                tool_calls: raw.tool_calls,
                model: raw.model,
                extras: raw.extras,
            });
        }
        None => {
            return Err(Error::validation_failure(
                vec![ValidationError::without_path(format!(
                    "model did not call {}",
                    STRUCTURED_OUTPUT_TOOL
                ))],
                (!raw.text.is_empty()).then(|| raw.text.clone()),
            ))
        }
    };

    let mut arguments: Value = match call.arguments {
        Value::String(s) => serde_json::from_str(&s).map_err(|e| {
            Error::validation_failure(
                vec![ValidationError::without_path(format!("tool arguments are not valid JSON: {}", e))],
                Some(s.clone()),
            )
        })?,
        other => other,
    };
    strip_optional_nulls(&mut arguments, &plan.optional_paths);

    let value = if wrapped {
        match arguments {
            Value::Object(mut map) if map.contains_key(WRAPPED_VALUE_FIELD) => map
                .remove(WRAPPED_VALUE_FIELD)
                .unwrap_or(Value::Null),
            other => {
                return Err(Error::validation_failure(
                    vec![ValidationError::with_path(
                        "required property is missing",
                        WRAPPED_VALUE_FIELD,
                    )],
                    Some(other.to_string()),
                ))
            }
        }
    } else {
        arguments
    };
    let value = validate_structured(&plan.schema, value, validators)?;

    let finish_reason = match finish_reason {
        FinishReason::ToolCalls if raw.tool_calls.is_empty() => FinishReason::Stop,
        other => other,
    };
    Ok(ChatResult {
        content: ChatContent::Structured(value),
        usage: raw.usage,
        finish_reason,
        tool_calls: raw.tool_calls,
        model: raw.model,
        extras: raw.extras,
    })
}

/// Remove `null` members at the given dotted paths (`a.b`, `items[].c`).
pub fn strip_optional_nulls(value: &mut Value, paths: &BTreeSet<String>) {
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        strip_at(value, &segments);
    }
}

fn strip_at(value: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let name = head.trim_end_matches("[]");
    let depth = (head.len() - name.len()) / 2;
    let Value::Object(map) = value else {
        return;
    };
    if rest.is_empty() && depth == 0 {
        if matches!(map.get(name), Some(Value::Null)) {
            map.remove(name);
        }
        return;
    }
    if let Some(child) = map.get_mut(name) {
        descend(child, depth, rest);
    }
}

fn descend(value: &mut Value, depth: usize, rest: &[&str]) {
    if depth == 0 {
        strip_at(value, rest);
    } else if let Value::Array(items) = value {
        for item in items {
            descend(item, depth - 1, rest);
        }
    }
}

static FENCED_JSON: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok());
static EMBEDDED_OBJECT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").ok());
static EMBEDDED_ARRAY: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[[\s\S]*\]").ok());

/// Pull a JSON value out of model text.
///
/// Tries, in order: the whole text, a fenced code block, the widest `{...}` span, then
/// the widest `[...]` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    if let Some(re) = Lazy::force(&FENCED_JSON).as_ref() {
        for captures in re.captures_iter(trimmed) {
            if let Some(inner) = captures.get(1) {
                if let Ok(value) = serde_json::from_str::<Value>(inner.as_str()) {
                    return Some(value);
                }
            }
        }
    }
    [&EMBEDDED_OBJECT, &EMBEDDED_ARRAY]
        .into_iter()
        .filter_map(|re| Lazy::force(re).as_ref())
        .filter_map(|re| re.find(trimmed))
        .find_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
}
