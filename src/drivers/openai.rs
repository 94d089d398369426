//! OpenAI chat completions driver, also used for OpenAI-compatible services.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::client::error_classification::classify_error_body;
use crate::dialect;
use crate::pipeline::RawOutcome;
use crate::types::events::StreamingEvent;
use crate::types::message::{ContentPart, ImageSource, Message, MessageContent, MessageRole};
use crate::types::request::ChatRequest;
use crate::types::response::{FinishReason, ProviderExtras, Usage};
use crate::types::tool::ToolCall;
use crate::Result;

use super::{decode_arguments, merge_fields, missing_field, parse_payload, ApiStyle, DriverRequest, ProviderDriver};

const SOURCE: &str = "openai_driver";
const CHAT_PATH: &str = "/chat/completions";

#[derive(Debug)]
pub struct OpenAiDriver {
    provider_id: String,
}

impl OpenAiDriver {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn image_url(source: &ImageSource) -> String {
    match source {
        ImageSource::Url { url } => url.clone(),
        ImageSource::Base64 { media_type, data } => format!("data:{};base64,{}", media_type, data),
    }
}

pub(crate) fn result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let parts = match (&message.role, &message.content) {
            (MessageRole::Tool, _) => {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.text(),
                }));
                continue;
            }
            (role, MessageContent::Text(text)) => {
                out.push(json!({ "role": role_name(*role), "content": text }));
                continue;
            }
            (_, MessageContent::Parts(parts)) => parts,
        };

        let mut content = Vec::new();
        let mut tool_calls = Vec::new();
        let mut results = Vec::new();
        for part in parts {
            match part {
                ContentPart::Text { text } => content.push(json!({ "type": "text", "text": text })),
                ContentPart::Image { source } => {
                    content.push(json!({ "type": "image_url", "image_url": { "url": image_url(source) } }))
                }
                ContentPart::ToolUse { id, name, input } => tool_calls.push(json!({
                    "id": id,
                    "type": "function",
                    "function": { "name": name, "arguments": input.to_string() },
                })),
                ContentPart::ToolResult {
                    tool_use_id, content, ..
                } => results.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": result_text(content),
                })),
            }
        }

        if !content.is_empty() || !tool_calls.is_empty() {
            let mut m = Map::new();
            m.insert("role".into(), json!(role_name(message.role)));
            let body = if content.is_empty() {
                Value::Null
            } else if message.role == MessageRole::Assistant {
                // Assistant turns only carry text.
                json!(message.text())
            } else {
                Value::Array(content)
            };
            m.insert("content".into(), body);
            if !tool_calls.is_empty() {
                m.insert("tool_calls".into(), Value::Array(tool_calls));
            }
            out.push(Value::Object(m));
        }
        out.extend(results);
    }
    out
}

fn parse_usage(usage: &Value) -> Option<Usage> {
    if !usage.is_object() {
        return None;
    }
    let input = usage["prompt_tokens"].as_u64().unwrap_or(0);
    let output = usage["completion_tokens"].as_u64().unwrap_or(0);
    let mut parsed = Usage::new(input, output);
    if let Some(total) = usage["total_tokens"].as_u64() {
        parsed.total_tokens = total;
    }
    Some(parsed)
}

impl ProviderDriver for OpenAiDriver {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::OpenAiCompatible
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.openai.com/v1"
    }

    fn build_request(&self, request: &ChatRequest) -> Result<DriverRequest> {
        let tooling = dialect::openai::compile_tooling(
            request.schema.as_ref(),
            &request.tools,
            request.tool_choice.as_ref(),
        )?;

        let mut body = Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert("messages".into(), Value::Array(convert_messages(&request.messages)));
        if request.stream {
            body.insert("stream".into(), json!(true));
            body.insert("stream_options".into(), json!({ "include_usage": true }));
        }
        let sampling = &request.sampling;
        if let Some(t) = sampling.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(mt) = sampling.max_tokens {
            body.insert("max_tokens".into(), json!(mt));
        }
        if let Some(p) = sampling.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if !sampling.stop.is_empty() {
            body.insert("stop".into(), json!(sampling.stop));
        }
        merge_fields(&mut body, tooling.fields);

        Ok(DriverRequest {
            path: CHAT_PATH.to_string(),
            headers: HashMap::new(),
            body: Value::Object(body),
            stream: request.stream,
            plan: tooling.plan,
        })
    }

    fn parse_response(&self, body: &Value) -> Result<RawOutcome> {
        if body.get("error").map_or(false, Value::is_object) {
            return Err(classify_error_body(body));
        }
        let choice = body.pointer("/choices/0").ok_or_else(|| missing_field("choices", SOURCE))?;
        let message = &choice["message"];

        let mut text = message["content"].as_str().unwrap_or_default().to_string();
        let mut finish_reason = choice["finish_reason"].as_str().map(map_finish_reason);
        if let Some(refusal) = message["refusal"].as_str() {
            if text.is_empty() {
                text = refusal.to_string();
                finish_reason = Some(FinishReason::ContentFilter);
            }
        }

        let mut tool_calls: Vec<ToolCall> = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .map(|tc| ToolCall {
                        id: tc["id"].as_str().unwrap_or_default().to_string(),
                        name: tc.pointer("/function/name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        arguments: decode_arguments(tc.pointer("/function/arguments")),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(call) = message.get("function_call").filter(|v| v.is_object()) {
            tool_calls.push(ToolCall {
                id: "function_call".to_string(),
                name: call["name"].as_str().unwrap_or_default().to_string(),
                arguments: decode_arguments(call.get("arguments")),
            });
        }

        let extras = ProviderExtras {
            logprobs: choice.get("logprobs").filter(|v| !v.is_null()).cloned(),
            safety_ratings: None,
            thinking: message["reasoning_content"].as_str().map(String::from),
        };

        Ok(RawOutcome {
            text,
            tool_calls,
            finish_reason,
            usage: parse_usage(&body["usage"]).unwrap_or_default(),
            model: body["model"].as_str().unwrap_or_default().to_string(),
            extras,
        })
    }

    fn parse_stream_event(&self, data: &str) -> Result<Vec<StreamingEvent>> {
        if data.trim().is_empty() || self.is_stream_done(data) {
            return Ok(Vec::new());
        }
        let v = parse_payload(data, SOURCE)?;
        if let Some(error) = v.get("error").filter(|e| !e.is_null()) {
            return Ok(vec![StreamingEvent::StreamError { error: error.clone() }]);
        }

        let mut events = Vec::new();
        let delta = v.pointer("/choices/0/delta");
        if let Some(delta) = delta {
            if let Some(thinking) = delta["reasoning_content"].as_str().filter(|s| !s.is_empty()) {
                events.push(StreamingEvent::ThinkingDelta {
                    thinking: thinking.to_string(),
                });
            }
            if let Some(content) = delta["content"].as_str().filter(|s| !s.is_empty()) {
                events.push(StreamingEvent::TextDelta {
                    text: content.to_string(),
                });
            }
            for (position, tc) in delta["tool_calls"].as_array().into_iter().flatten().enumerate() {
                let index = tc["index"].as_u64().map(|i| i as u32).unwrap_or(position as u32);
                if let Some(id) = tc["id"].as_str() {
                    events.push(StreamingEvent::ToolCallStarted {
                        index,
                        id: id.to_string(),
                        name: tc.pointer("/function/name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    });
                }
                if let Some(args) = tc.pointer("/function/arguments").and_then(Value::as_str).filter(|s| !s.is_empty()) {
                    events.push(StreamingEvent::PartialToolCall {
                        index,
                        arguments: args.to_string(),
                    });
                }
            }
        }

        if let Some(logprobs) = v.pointer("/choices/0/logprobs/content").filter(|l| !l.is_null()) {
            events.push(StreamingEvent::Extras {
                logprobs: Some(logprobs.clone()),
                safety_ratings: None,
            });
        }

        let finish_reason = v.pointer("/choices/0/finish_reason").and_then(Value::as_str).map(map_finish_reason);
        let usage = parse_usage(&v["usage"]);
        let model = v["model"].as_str().map(String::from);
        if finish_reason.is_some() || usage.is_some() || model.is_some() {
            events.push(StreamingEvent::Metadata {
                usage,
                finish_reason,
                model,
            });
        }
        Ok(events)
    }
}
