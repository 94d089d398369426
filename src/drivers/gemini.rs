//! Google Gemini generateContent API driver. Key differences:
//! - Uses `contents` instead of `messages`, with `parts` instead of `content`.
//! - Roles: `user` and `model` (not `assistant`). System uses `systemInstruction`.
//! - `generationConfig` wraps temperature, max tokens (→ `maxOutputTokens`), etc.
//! - Function responses are matched to calls by name, not id.
//! - Streaming (`alt=sse`) sends a full response object per event.

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

use super::openai::result_text;
use super::{merge_fields, parse_payload, ApiStyle, DriverRequest, ProviderDriver};

const SOURCE: &str = "gemini_driver";

#[derive(Debug)]
pub struct GeminiDriver {
    provider_id: String,
}

pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

impl GeminiDriver {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }

    /// Separate system instructions from conversation contents.
    fn split_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        // Function responses carry the function name; recover it from earlier calls.
        let call_names: HashMap<&str, &str> = messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Parts(parts) => Some(parts),
                MessageContent::Text(_) => None,
            })
            .flatten()
            .filter_map(|p| match p {
                ContentPart::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
                _ => None,
            })
            .collect();
        let name_for = |id: &str| -> String {
            match call_names.get(id) {
                Some(name) => name.to_string(),
                None => id.to_string(),
            }
        };

        let mut system_parts: Vec<String> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();
        for m in messages {
            let (role, parts) = match m.role {
                MessageRole::System => {
                    system_parts.push(m.text());
                    continue;
                }
                MessageRole::User => ("user", Self::content_to_parts(&m.content, &name_for)),
                MessageRole::Assistant => ("model", Self::content_to_parts(&m.content, &name_for)),
                MessageRole::Tool => {
                    let id = m.tool_call_id.clone().unwrap_or_default();
                    (
                        "user",
                        vec![json!({
                            "functionResponse": {
                                "name": name_for(id.as_str()),
                                "response": { "content": m.text() },
                            }
                        })],
                    )
                }
            };
            contents.push(json!({ "role": role, "parts": parts }));
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(json!({ "parts": [{ "text": system_parts.join("\n\n") }] }))
        };
        (system_instruction, contents)
    }

    /// Convert message content to Gemini `parts`.
    fn content_to_parts(content: &MessageContent, name_for: &dyn Fn(&str) -> String) -> Vec<Value> {
        match content {
            MessageContent::Text(s) => vec![json!({ "text": s })],
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({ "text": text }),
                    ContentPart::Image {
                        source: ImageSource::Base64 { media_type, data },
                    } => json!({ "inlineData": { "mimeType": media_type, "data": data } }),
                    ContentPart::Image {
                        source: ImageSource::Url { url },
                    } => json!({ "fileData": { "fileUri": url } }),
                    ContentPart::ToolUse { name, input, .. } => {
                        json!({ "functionCall": { "name": name, "args": input } })
                    }
                    ContentPart::ToolResult {
                        tool_use_id, content, ..
                    } => json!({
                        "functionResponse": {
                            "name": name_for(tool_use_id.as_str()),
                            "response": { "content": result_text(content) },
                        }
                    }),
                })
                .collect(),
        }
    }

    /// Decode one response object (complete body or stream chunk).
    fn decode_candidate(body: &Value) -> Decoded {
        let candidate = &body["candidates"][0];
        let mut decoded = Decoded::default();
        for part in candidate.pointer("/content/parts").and_then(Value::as_array).into_iter().flatten() {
            if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().unwrap_or_default().to_string();
                let id = call["id"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                decoded.tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
                });
            } else if let Some(text) = part["text"].as_str() {
                if part["thought"].as_bool() == Some(true) {
                    decoded.thinking.push_str(text);
                } else {
                    decoded.text.push_str(text);
                }
            }
        }
        decoded.finish_reason = candidate["finishReason"].as_str().map(map_finish_reason);
        if body.pointer("/promptFeedback/blockReason").is_some() && candidate.is_null() {
            decoded.finish_reason = Some(FinishReason::ContentFilter);
        }
        decoded.safety_ratings = candidate
            .get("safetyRatings")
            .or_else(|| body.pointer("/promptFeedback/safetyRatings"))
            .cloned();
        decoded.logprobs = candidate.get("logprobsResult").cloned();
        decoded.usage = parse_usage(&body["usageMetadata"]);
        decoded.model = body["modelVersion"].as_str().map(String::from);
        decoded
    }
}

#[derive(Debug, Default)]
struct Decoded {
    text: String,
    thinking: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    safety_ratings: Option<Value>,
    logprobs: Option<Value>,
    usage: Option<Usage>,
    model: Option<String>,
}

fn parse_usage(usage: &Value) -> Option<Usage> {
    if !usage.is_object() {
        return None;
    }
    let mut parsed = Usage::new(
        usage["promptTokenCount"].as_u64().unwrap_or(0),
        usage["candidatesTokenCount"].as_u64().unwrap_or(0),
    );
    if let Some(total) = usage["totalTokenCount"].as_u64() {
        parsed.total_tokens = total;
    }
    Some(parsed)
}

impl ProviderDriver for GeminiDriver {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::GeminiGenerate
    }

    fn default_base_url(&self) -> &'static str {
        "https://generativelanguage.googleapis.com/v1beta"
    }

    fn build_request(&self, request: &ChatRequest) -> Result<DriverRequest> {
        let tooling = dialect::gemini::compile_tooling(
            request.schema.as_ref(),
            &request.tools,
            request.tool_choice.as_ref(),
        )?;
        let (system_instruction, contents) = Self::split_messages(&request.messages);

        let mut body = Map::new();
        body.insert("contents".into(), Value::Array(contents));
        if let Some(sys) = system_instruction {
            body.insert("systemInstruction".into(), sys);
        }

        let sampling = &request.sampling;
        let mut generation = Map::new();
        if let Some(t) = sampling.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(mt) = sampling.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(mt));
        }
        if let Some(p) = sampling.top_p {
            generation.insert("topP".into(), json!(p));
        }
        if !sampling.stop.is_empty() {
            generation.insert("stopSequences".into(), json!(sampling.stop));
        }
        if !generation.is_empty() {
            body.insert("generationConfig".into(), Value::Object(generation));
        }
        merge_fields(&mut body, tooling.fields);

        let path = if request.stream {
            format!("/models/{}:streamGenerateContent?alt=sse", request.model)
        } else {
            format!("/models/{}:generateContent", request.model)
        };

        Ok(DriverRequest {
            path,
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
        let decoded = Self::decode_candidate(body);
        // A function-call part means the turn ended in tool calls.
        let finish_reason = match decoded.finish_reason {
            None | Some(FinishReason::Stop) if !decoded.tool_calls.is_empty() => Some(FinishReason::ToolCalls),
            other => other,
        };
        Ok(RawOutcome {
            text: decoded.text,
            tool_calls: decoded.tool_calls,
            finish_reason,
            usage: decoded.usage.unwrap_or_default(),
            model: decoded.model.unwrap_or_default(),
            extras: ProviderExtras {
                logprobs: decoded.logprobs,
                safety_ratings: decoded.safety_ratings,
                thinking: (!decoded.thinking.is_empty()).then_some(decoded.thinking),
            },
        })
    }

    fn parse_stream_event(&self, data: &str) -> Result<Vec<StreamingEvent>> {
        if data.trim().is_empty() || self.is_stream_done(data) {
            return Ok(Vec::new());
        }
        let v = parse_payload(data, SOURCE)?;
        if let Some(error) = v.get("error").filter(|e| e.is_object()) {
            return Ok(vec![StreamingEvent::StreamError { error: error.clone() }]);
        }

        let decoded = Self::decode_candidate(&v);
        let mut events = Vec::new();
        if !decoded.thinking.is_empty() {
            events.push(StreamingEvent::ThinkingDelta {
                thinking: decoded.thinking,
            });
        }
        if !decoded.text.is_empty() {
            events.push(StreamingEvent::TextDelta { text: decoded.text });
        }
        // Calls arrive whole; each is started and completed in one go.
        for (index, call) in decoded.tool_calls.into_iter().enumerate() {
            let index = index as u32;
            events.push(StreamingEvent::ToolCallStarted {
                index,
                id: call.id,
                name: call.name,
            });
            events.push(StreamingEvent::PartialToolCall {
                index,
                arguments: call.arguments.to_string(),
            });
        }
        if decoded.safety_ratings.is_some() || decoded.logprobs.is_some() {
            events.push(StreamingEvent::Extras {
                logprobs: decoded.logprobs,
                safety_ratings: decoded.safety_ratings,
            });
        }
        if decoded.usage.is_some() || decoded.finish_reason.is_some() || decoded.model.is_some() {
            events.push(StreamingEvent::Metadata {
                usage: decoded.usage,
                finish_reason: decoded.finish_reason,
                model: decoded.model,
            });
        }
        Ok(events)
    }
}
