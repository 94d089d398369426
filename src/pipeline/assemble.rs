//! Folds streaming events into the pieces of one outcome.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::client::error_classification::classify_error_body;
use crate::pipeline::normalize::RawOutcome;
use crate::types::events::StreamingEvent;
use crate::types::response::{FinishReason, ProviderExtras, Usage};
use crate::types::tool::ToolCall;
use crate::Result;

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Collects tool calls whose arguments arrive as string fragments.
///
/// Fragments are keyed by the index the backend assigns. A second start on an index that
/// already holds a call opens a new slot, so later fragments with that index extend the
/// newest call.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    slots: Vec<PendingCall>,
    by_index: BTreeMap<u32, usize>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_started(&mut self, index: u32, id: String, name: String) {
        if let Some(&slot) = self.by_index.get(&index) {
            let pending = &mut self.slots[slot];
            if pending.id.is_empty() && pending.name.is_empty() {
                pending.id = id;
                pending.name = name;
                return;
            }
            if pending.id == id {
                return;
            }
        }
        self.slots.push(PendingCall {
            id,
            name,
            arguments: String::new(),
        });
        self.by_index.insert(index, self.slots.len() - 1);
    }

    pub fn on_partial(&mut self, index: u32, fragment: &str) {
        let slot = match self.by_index.get(&index) {
            Some(&slot) => slot,
            None => {
                self.slots.push(PendingCall::default());
                self.by_index.insert(index, self.slots.len() - 1);
                self.slots.len() - 1
            }
        };
        self.slots[slot].arguments.push_str(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Calls in start order. Arguments that do not parse are kept as the raw string.
    pub fn finalize(self) -> Vec<ToolCall> {
        self.slots
            .into_iter()
            .map(|pending| {
                let trimmed = pending.arguments.trim();
                let arguments = if trimmed.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(pending.arguments.clone()))
                };
                ToolCall {
                    id: pending.id,
                    name: pending.name,
                    arguments,
                }
            })
            .collect()
    }
}

/// Accumulates text, thinking, tool calls and metadata from a stream of events.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    thinking: String,
    tools: ToolCallAssembler,
    usage: Usage,
    finish_reason: Option<FinishReason>,
    model: Option<String>,
    extras: ProviderExtras,
    ended: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in. Returns the text fragment it carried, if any.
    ///
    /// An in-band error event becomes the classified error.
    pub fn apply(&mut self, event: StreamingEvent) -> Result<Option<String>> {
        match event {
            StreamingEvent::TextDelta { text } => {
                self.text.push_str(&text);
                return Ok(Some(text));
            }
            StreamingEvent::ThinkingDelta { thinking } => self.thinking.push_str(&thinking),
            StreamingEvent::ToolCallStarted { index, id, name } => self.tools.on_started(index, id, name),
            StreamingEvent::PartialToolCall { index, arguments } => self.tools.on_partial(index, &arguments),
            StreamingEvent::Metadata {
                usage,
                finish_reason,
                model,
            } => {
                if let Some(usage) = usage {
                    self.usage = merge_usage(self.usage, usage);
                }
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason;
                }
                if self.model.is_none() {
                    self.model = model;
                }
            }
            StreamingEvent::Extras {
                logprobs,
                safety_ratings,
            } => {
                if let Some(lp) = logprobs {
                    append_array(&mut self.extras.logprobs, lp);
                }
                if safety_ratings.is_some() {
                    self.extras.safety_ratings = safety_ratings;
                }
            }
            StreamingEvent::StreamError { error } => return Err(classify_error_body(&error)),
            StreamingEvent::StreamEnd => self.ended = true,
        }
        Ok(None)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(self) -> RawOutcome {
        let tool_calls = self.tools.finalize();
        let mut extras = self.extras;
        if !self.thinking.is_empty() {
            extras.thinking = Some(self.thinking);
        }
        RawOutcome {
            text: self.text,
            finish_reason: promote_tool_finish(self.finish_reason, &tool_calls),
            tool_calls,
            usage: self.usage,
            model: self.model.unwrap_or_default(),
            extras,
        }
    }
}

/// A plain stop that produced tool calls is reported as `ToolCalls`.
pub(crate) fn promote_tool_finish(reason: Option<FinishReason>, tool_calls: &[ToolCall]) -> Option<FinishReason> {
    match reason {
        None | Some(FinishReason::Stop) if !tool_calls.is_empty() => Some(FinishReason::ToolCalls),
        other => other,
    }
}

/// Backends report usage in pieces (input first, output at the end) or cumulatively.
/// Non-zero counts replace earlier ones.
fn merge_usage(acc: Usage, next: Usage) -> Usage {
    let input_tokens = if next.input_tokens > 0 { next.input_tokens } else { acc.input_tokens };
    let output_tokens = if next.output_tokens > 0 { next.output_tokens } else { acc.output_tokens };
    Usage {
        input_tokens,
        output_tokens,
        total_tokens: next.total_tokens.max(input_tokens + output_tokens),
    }
}

fn append_array(slot: &mut Option<Value>, next: Value) {
    match (slot.as_mut(), next) {
        (Some(Value::Array(existing)), Value::Array(more)) => existing.extend(more),
        (_, next) => *slot = Some(next),
    }
}
