//! Error classification logic
//!
//! Maps HTTP failures and in-band error bodies onto the call-level taxonomy:
//!
//! | Input | Error |
//! |-------|-------|
//! | 429 | `RateLimited` (retry-after from `retry-after-ms`, `retry-after`, then body) |
//! | 408 | `Network` |
//! | 5xx, 529, `overloaded_error` | `ServerFault` |
//! | other 4xx | `ClientFault` (terminal) |

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::Error;

const MAX_MESSAGE_CHARS: usize = 512;
const OVERLOADED: u16 = 529;

/// The error object inside a body: `{"error": {...}}`, a bare object, or Gemini's
/// one-element array form.
fn error_object(body: &Value) -> &Value {
    let body = match body {
        Value::Array(items) => items.first().unwrap_or(body),
        other => other,
    };
    match body.get("error") {
        Some(inner) if inner.is_object() => inner,
        _ => body,
    }
}

fn message_of(error: &Value) -> Option<String> {
    error["message"].as_str().map(String::from)
}

/// A hint that does not fit a `Duration` (negative, NaN, overflowing) is dropped.
fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

/// Parse Google's `"13s"` / `"1.5s"` durations.
fn google_duration(raw: &str) -> Option<Duration> {
    raw.strip_suffix('s').and_then(|s| s.parse::<f64>().ok()).and_then(seconds)
}

fn retry_after_from_body(body: &Value) -> Option<Duration> {
    let error = error_object(body);
    if let Some(secs) = error["retry_after"].as_f64().or_else(|| body["retry_after"].as_f64()) {
        return seconds(secs);
    }
    error["details"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|d| d["retryDelay"].as_str())
        .find_map(google_duration)
}

/// Server wait hint: `retry-after-ms`, then `retry-after` (seconds), then the body.
pub(crate) fn retry_after(headers: &HashMap<String, String>, body: Option<&Value>) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.trim().parse::<f64>().ok());
    if let Some(ms) = header("retry-after-ms") {
        return seconds(ms / 1000.0);
    }
    if let Some(secs) = header("retry-after") {
        return seconds(secs);
    }
    body.and_then(retry_after_from_body)
}

fn from_status(status: u16, message: String, retry_after: Option<Duration>, overloaded: bool) -> Error {
    match status {
        429 => Error::RateLimited { retry_after, message },
        408 => Error::network(format!("request timed out (HTTP 408): {}", message)),
        _ if overloaded || status >= 500 => Error::ServerFault {
            status_code: status,
            message,
            retry_after,
        },
        _ => Error::ClientFault {
            status_code: status,
            message,
        },
    }
}

/// Classify a non-success HTTP response.
pub fn classify_http(status: u16, headers: &HashMap<String, String>, body: &[u8]) -> Error {
    let json = serde_json::from_slice::<Value>(body).ok();
    let error = json.as_ref().map(error_object);
    let message = error.and_then(message_of).unwrap_or_else(|| {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.is_empty() {
            format!("HTTP {}", status)
        } else {
            text.chars().take(MAX_MESSAGE_CHARS).collect()
        }
    });
    let overloaded = status == OVERLOADED || error.map_or(false, |e| e["type"] == "overloaded_error");
    from_status(status, message, retry_after(headers, json.as_ref()), overloaded)
}

/// Classify an error reported inside a body or stream (no HTTP status available).
pub fn classify_error_body(body: &Value) -> Error {
    let error = error_object(body);
    let message = message_of(error).unwrap_or_else(|| error.to_string());
    let retry_after = retry_after_from_body(body);

    if let Some(status) = error["code"].as_u64().filter(|c| (400..600).contains(c)) {
        return from_status(status as u16, message, retry_after, false);
    }

    let kind = error["type"]
        .as_str()
        .or_else(|| error["status"].as_str())
        .or_else(|| error["code"].as_str())
        .unwrap_or_default();
    match kind {
        "overloaded_error" => from_status(OVERLOADED, message, retry_after, true),
        "rate_limit_error" | "rate_limit_exceeded" | "RESOURCE_EXHAUSTED" => from_status(429, message, retry_after, false),
        "request_too_large" => from_status(413, message, None, false),
        "invalid_request_error" | "authentication_error" | "permission_error" | "not_found_error"
        | "insufficient_quota" | "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "PERMISSION_DENIED"
        | "UNAUTHENTICATED" | "NOT_FOUND" => from_status(400, message, None, false),
        _ => from_status(500, message, retry_after, false),
    }
}
