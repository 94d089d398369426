//! Backend-neutral streaming events, produced by the drivers from raw stream lines.

use serde::{Deserialize, Serialize};

use crate::types::response::{FinishReason, Usage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StreamingEvent {
    /// Partial content delta (text streaming)
    TextDelta { text: String },

    /// Thinking delta (reasoning process)
    ThinkingDelta { thinking: String },

    /// First fragment of a tool call; later fragments share `index`.
    ToolCallStarted { index: u32, id: String, name: String },

    /// Partial tool call (arguments streaming)
    PartialToolCall { index: u32, arguments: String },

    /// Usage, finish reason and model id, whichever the chunk carried.
    Metadata {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// Provider-specific payloads (log-probabilities, safety ratings).
    Extras {
        #[serde(skip_serializing_if = "Option::is_none")]
        logprobs: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        safety_ratings: Option<serde_json::Value>,
    },

    /// Error reported inside the stream body.
    StreamError { error: serde_json::Value },

    StreamEnd,
}
