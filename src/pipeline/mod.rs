//! # Response Pipeline
//!
//! Everything between raw response bytes and a [`ChatResult`](crate::types::ChatResult):
//!
//! ```text
//! bytes ─▶ decode (lines) ─▶ driver (events) ─▶ assemble ─▶ normalize ─▶ ChatResult
//!                                                   └──▶ ChatStream fragments
//! ```
//!
//! Single-shot bodies skip the first three stages: the driver decodes the whole JSON body
//! straight into a [`RawOutcome`].

pub mod assemble;
pub mod decode;
pub mod normalize;
pub mod stream;

pub use assemble::{StreamAccumulator, ToolCallAssembler};
pub use decode::{line_payload, payload_stream, LineBuffer};
pub use normalize::{extract_json, normalize, strip_optional_nulls, RawOutcome};
pub use stream::{cancellable, event_stream, ChatStream};
