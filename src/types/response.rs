//! The normalized result of one completed call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::tool::ToolCall;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ChatContent {
    Text(String),
    /// Output that passed validation against the requested schema.
    Structured(Value),
}

impl ChatContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChatContent::Text(s) => Some(s),
            ChatContent::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ChatContent::Structured(v) => Some(v),
            ChatContent::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl ProviderExtras {
    pub fn is_empty(&self) -> bool {
        self.logprobs.is_none() && self.safety_ratings.is_none() && self.thinking.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: ChatContent,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub model: String,
    #[serde(default, skip_serializing_if = "ProviderExtras::is_empty")]
    pub extras: ProviderExtras,
}

impl ChatResult {
    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }

    pub fn structured(&self) -> Option<&Value> {
        self.content.as_structured()
    }

    /// Deserialize the structured content into a Rust type.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        let value = self.structured().cloned().ok_or_else(|| {
            crate::Error::decode_with_context(
                "result carries no structured content",
                crate::ErrorContext::new().with_source("chat_result"),
            )
        })?;
        Ok(serde_json::from_value(value)?)
    }
}
