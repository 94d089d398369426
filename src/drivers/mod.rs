//! Provider driver abstraction layer.
//!
//! Each backend wire format (OpenAI chat completions, Anthropic messages, Gemini
//! generateContent) has a concrete [`ProviderDriver`]. Drivers are stateless: they build a
//! [`DriverRequest`] from a [`ChatRequest`] once per logical call and decode response
//! bodies or stream lines into backend-neutral shapes. Runtime selection goes through
//! `Arc<dyn ProviderDriver>` so the same client code serves every backend.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::dialect::StructuredPlan;
use crate::pipeline::RawOutcome;
use crate::types::events::StreamingEvent;
use crate::types::request::ChatRequest;
use crate::{Error, ErrorContext, Result};

pub use anthropic::AnthropicDriver;
pub use gemini::GeminiDriver;
pub use openai::OpenAiDriver;

/// Wire format spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// OpenAI chat completions and compatible services.
    #[serde(alias = "openai")]
    OpenAiCompatible,
    #[serde(alias = "anthropic")]
    AnthropicMessages,
    #[serde(alias = "gemini")]
    GeminiGenerate,
}

impl ApiStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiStyle::OpenAiCompatible => "openai",
            ApiStyle::AnthropicMessages => "anthropic",
            ApiStyle::GeminiGenerate => "gemini",
        }
    }
}

impl fmt::Display for ApiStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai_compatible" => Ok(ApiStyle::OpenAiCompatible),
            "anthropic" | "anthropic_messages" => Ok(ApiStyle::AnthropicMessages),
            "gemini" | "gemini_generate" => Ok(ApiStyle::GeminiGenerate),
            other => Err(Error::configuration_with_context(
                format!("unknown api style '{}'", other),
                ErrorContext::new()
                    .with_field_path("api_style")
                    .with_details("expected one of: openai, anthropic, gemini"),
            )),
        }
    }
}

/// A prepared backend request. Built once per logical call and reused by every attempt.
#[derive(Debug, Clone)]
pub struct DriverRequest {
    /// Path relative to the backend base URL, query string included.
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Value,
    pub stream: bool,
    /// How structured output must be extracted from the response, if requested.
    pub plan: Option<StructuredPlan>,
}

/// Core trait for provider-specific API adaptation.
pub trait ProviderDriver: Send + Sync + fmt::Debug {
    fn provider_id(&self) -> &str;

    fn api_style(&self) -> ApiStyle;

    /// Base URL used when the configuration does not name one.
    fn default_base_url(&self) -> &'static str;

    /// Build the backend-native request, dialect-compiled schema and tools included.
    fn build_request(&self, request: &ChatRequest) -> Result<DriverRequest>;

    /// Decode a complete (non-streamed) response body.
    fn parse_response(&self, body: &Value) -> Result<RawOutcome>;

    /// Decode one stream payload (the part after `data:`) into zero or more events.
    fn parse_stream_event(&self, data: &str) -> Result<Vec<StreamingEvent>>;

    /// Whether `data` is the backend's end-of-stream sentinel.
    fn is_stream_done(&self, data: &str) -> bool {
        data.trim() == "[DONE]"
    }
}

/// Factory function to create the appropriate driver from an API style.
pub fn create_driver(api_style: ApiStyle, provider_id: &str) -> Arc<dyn ProviderDriver> {
    match api_style {
        ApiStyle::OpenAiCompatible => Arc::new(OpenAiDriver::new(provider_id)),
        ApiStyle::AnthropicMessages => Arc::new(AnthropicDriver::new(provider_id)),
        ApiStyle::GeminiGenerate => Arc::new(GeminiDriver::new(provider_id)),
    }
}

/// Merge `fields` into `body`. Objects present on both sides are merged recursively.
pub(crate) fn merge_fields(body: &mut Map<String, Value>, fields: Map<String, Value>) {
    for (key, value) in fields {
        match value {
            Value::Object(incoming) => {
                if let Some(Value::Object(existing)) = body.get_mut(&key) {
                    merge_fields(existing, incoming);
                } else {
                    body.insert(key, Value::Object(incoming));
                }
            }
            value => {
                body.insert(key, value);
            }
        }
    }
}

pub(crate) fn parse_payload(data: &str, source: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|e| {
        Error::decode_with_context(
            format!("failed to parse stream payload: {}", e),
            ErrorContext::new().with_source(source),
        )
    })
}

pub(crate) fn missing_field(field: &str, source: &str) -> Error {
    Error::decode_with_context(
        format!("response is missing '{}'", field),
        ErrorContext::new().with_field_path(field).with_source(source),
    )
}

/// Tool-call arguments arrive either as a JSON string or as an object.
pub(crate) fn decode_arguments(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(s)) if s.trim().is_empty() => Value::Object(Map::new()),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(other) => other.clone(),
    }
}
