//! # Types Module
//!
//! Backend-neutral request, result and event types.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChatRequest`] | One logical call: messages, schema, tools, sampling, cancellation |
//! | [`Message`] | Chat message with role and text or multimodal parts |
//! | [`ToolDefinition`] | Tool offered to the model, parameters as a [`SchemaNode`](crate::schema::SchemaNode) |
//! | [`ChatResult`] | Normalized outcome of a completed call |
//! | [`StreamingEvent`] | Driver-level event decoded from one stream line |
//!
//! ## Example
//!
//! ```rust
//! use unichat::types::{ChatRequest, Message, ToolChoice};
//!
//! let request = ChatRequest::new(
//!     "gpt-4o-mini",
//!     vec![Message::system("Be brief."), Message::user("What's the weather?")],
//! )
//! .temperature(0.2)
//! .tool_choice(ToolChoice::Auto);
//! assert_eq!(request.messages.len(), 2);
//! ```

pub mod events;
pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use events::StreamingEvent;
pub use message::{ContentPart, ImageSource, Message, MessageContent, MessageRole};
pub use request::{ChatRequest, SamplingParams};
pub use response::{ChatContent, ChatResult, FinishReason, ProviderExtras, Usage};
pub use tool::{ToolCall, ToolChoice, ToolDefinition};
