//! # unichat
//!
//! One chat call shape for OpenAI-compatible, Anthropic and Gemini backends, with
//! schema-checked structured output, tool calling, streaming and retries.
//!
//! ## Overview
//!
//! A caller describes a call once as a [`ChatRequest`]: messages, an optional response
//! schema, optional tools and sampling parameters. A [`ChatClient`] compiles it for the
//! configured backend, sends it through a [`transport::Transport`], retries transient and
//! schema failures, and returns a backend-neutral [`ChatResult`].
//!
//! - **Schema abstraction**: JSON Schema documents and field-probing structural inputs
//!   both become one [`schema::SchemaNode`] tree.
//! - **Dialect compiler**: pure per-backend translation of that tree into the wire
//!   schema each backend accepts.
//! - **Retry/cancellation**: exponential backoff with jitter, retry-after hints and a
//!   [`CancellationToken`] that interrupts any suspension point.
//! - **Normalization**: complete bodies and streamed fragments end up as the same
//!   validated result.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use unichat::{ApiStyle, ChatClient, ChatRequest, Message, ResponseSchema};
//!
//! #[tokio::main]
//! async fn main() -> unichat::Result<()> {
//!     let client = ChatClient::builder()
//!         .api_style(ApiStyle::AnthropicMessages)
//!         .header("x-api-key", std::env::var("ANTHROPIC_API_KEY").unwrap_or_default())
//!         .build()?;
//!
//!     let schema = ResponseSchema::from_value(json!({
//!         "type": "object",
//!         "properties": { "city": { "type": "string" } },
//!         "required": ["city"]
//!     }))?;
//!     let request = ChatRequest::new("claude-sonnet-4-5", vec![Message::user("Capital of France?")])
//!         .schema(schema);
//!
//!     let result = client.chat(&request).await?;
//!     println!("{:?}", result.structured());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`schema`] | Schema input classification, node tree, validation |
//! | [`dialect`] | Per-backend schema and tool compilation |
//! | [`drivers`] | Request building and response decoding per backend |
//! | [`pipeline`] | Stream decoding, fragment assembly, normalization |
//! | [`resilience`] | Retry policy, executor and cancellation |
//! | [`client`] | The [`ChatClient`] facade and error classification |
//! | [`transport`] | The network primitive and its reqwest adapter |
//! | [`config`] | YAML/env client configuration |
//! | [`types`] | Messages, tools, requests, results, stream events |

pub mod client;
pub mod config;
pub mod dialect;
pub mod drivers;
pub mod pipeline;
pub mod resilience;
pub mod schema;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, ChatClientBuilder};
pub use config::ClientConfig;
pub use drivers::{ApiStyle, ProviderDriver};
pub use pipeline::ChatStream;
pub use resilience::{CancellationToken, RetryPolicy};
pub use schema::{ResponseSchema, SchemaNode, ValidationError};
pub use types::{
    events::StreamingEvent,
    message::{Message, MessageRole},
    request::ChatRequest,
    response::{ChatContent, ChatResult, FinishReason, Usage},
    tool::{ToolCall, ToolChoice, ToolDefinition},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorClass, ErrorContext};

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// For binaries and tests; libraries embedding unichat install their own.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
