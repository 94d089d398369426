//! The chat client facade.
//!
//! Keep the public surface small: build a [`ChatClient`] once, then call
//! [`ChatClient::chat`] or [`ChatClient::chat_stream`] per request.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod error_classification;

pub use builder::ChatClientBuilder;
pub use core::{CallContext, ChatClient};
pub use error_classification::{classify_error_body, classify_http};
