//! Anthropic Messages API driver. Handles the key differences from OpenAI:
//! - System messages are a top-level `system` parameter, not part of `messages`.
//! - Content uses typed blocks; tool results travel inside a `user` turn.
//! - Streaming uses typed events (`content_block_delta`, `message_delta`, ...).
//! - `max_tokens` is required, not optional.

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

const SOURCE: &str = "anthropic_driver";
const MESSAGES_PATH: &str = "/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug)]
pub struct AnthropicDriver {
    provider_id: String,
}

pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        // end_turn, stop_sequence, pause_turn and anything newer
        _ => FinishReason::Stop,
    }
}

fn image_block(source: &ImageSource) -> Value {
    match source {
        ImageSource::Base64 { media_type, data } => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data },
        }),
        ImageSource::Url { url } => json!({
            "type": "image",
            "source": { "type": "url", "url": url },
        }),
    }
}

fn content_blocks(content: &MessageContent) -> Vec<Value> {
    match content {
        MessageContent::Text(s) => vec![json!({ "type": "text", "text": s })],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::Image { source } => image_block(source),
                ContentPart::ToolUse { id, name, input } => json!({
                    "type": "tool_use", "id": id, "name": name, "input": input,
                }),
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let mut block = json!({
                        "type": "tool_result", "tool_use_id": tool_use_id, "content": content,
                    });
                    if *is_error {
                        block["is_error"] = json!(true);
                    }
                    block
                }
            })
            .collect(),
    }
}

impl AnthropicDriver {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }

    /// Extract system text and convert the remaining turns.
    ///
    /// Tool messages become `tool_result` blocks in a user turn; consecutive turns with
    /// the same role are merged since the API expects alternation.
    fn split_system_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

        for m in messages {
            let (role, blocks) = match m.role {
                MessageRole::System => {
                    system_parts.push(m.text());
                    continue;
                }
                MessageRole::User => ("user", content_blocks(&m.content)),
                MessageRole::Assistant => ("assistant", content_blocks(&m.content)),
                MessageRole::Tool => (
                    "user",
                    vec![json!({
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                        "content": m.text(),
                    })],
                ),
            };
            match turns.last_mut() {
                Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
                _ => turns.push((role, blocks)),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        let turns = turns
            .into_iter()
            .map(|(role, blocks)| json!({ "role": role, "content": blocks }))
            .collect();
        (system, turns)
    }
}

fn parse_usage(usage: &Value) -> Option<Usage> {
    if !usage.is_object() {
        return None;
    }
    Some(Usage::new(
        usage["input_tokens"].as_u64().unwrap_or(0),
        usage["output_tokens"].as_u64().unwrap_or(0),
    ))
}

impl ProviderDriver for AnthropicDriver {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::AnthropicMessages
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.anthropic.com/v1"
    }

    fn build_request(&self, request: &ChatRequest) -> Result<DriverRequest> {
        let tooling = dialect::anthropic::compile_tooling(
            request.schema.as_ref(),
            &request.tools,
            request.tool_choice.as_ref(),
        )?;
        let (system, msgs) = Self::split_system_messages(&request.messages);

        let sampling = &request.sampling;
        let mut body = Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert("messages".into(), Value::Array(msgs));
        body.insert(
            "max_tokens".into(),
            json!(sampling.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        if let Some(sys) = system {
            body.insert("system".into(), Value::String(sys));
        }
        if request.stream {
            body.insert("stream".into(), json!(true));
        }
        if let Some(t) = sampling.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = sampling.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if !sampling.stop.is_empty() {
            body.insert("stop_sequences".into(), json!(sampling.stop));
        }
        merge_fields(&mut body, tooling.fields);

        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), API_VERSION.into());

        Ok(DriverRequest {
            path: MESSAGES_PATH.to_string(),
            headers,
            body: Value::Object(body),
            stream: request.stream,
            plan: tooling.plan,
        })
    }

    fn parse_response(&self, body: &Value) -> Result<RawOutcome> {
        if body["type"] == "error" {
            return Err(classify_error_body(body));
        }
        let blocks = body["content"].as_array().ok_or_else(|| missing_field("content", SOURCE))?;

        let mut text = String::new();
        let mut thinking = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
                Some("thinking") => thinking.push_str(block["thinking"].as_str().unwrap_or_default()),
                Some("tool_use") => tool_calls.push(ToolCall {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    arguments: decode_arguments(block.get("input")),
                }),
                _ => {}
            }
        }

        Ok(RawOutcome {
            text,
            tool_calls,
            finish_reason: body["stop_reason"].as_str().map(map_finish_reason),
            usage: parse_usage(&body["usage"]).unwrap_or_default(),
            model: body["model"].as_str().unwrap_or_default().to_string(),
            extras: ProviderExtras {
                thinking: (!thinking.is_empty()).then_some(thinking),
                ..Default::default()
            },
        })
    }

    fn parse_stream_event(&self, data: &str) -> Result<Vec<StreamingEvent>> {
        if data.trim().is_empty() || self.is_stream_done(data) {
            return Ok(Vec::new());
        }
        let v = parse_payload(data, SOURCE)?;
        let index = v["index"].as_u64().unwrap_or(0) as u32;

        let event = match v["type"].as_str().unwrap_or_default() {
            "message_start" => {
                let message = &v["message"];
                Some(StreamingEvent::Metadata {
                    usage: parse_usage(&message["usage"]),
                    finish_reason: None,
                    model: message["model"].as_str().map(String::from),
                })
            }
            "content_block_start" => {
                let block = &v["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => Some(StreamingEvent::ToolCallStarted {
                        index,
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                    }),
                    Some("text") => block["text"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(|t| StreamingEvent::TextDelta { text: t.to_string() }),
                    _ => None,
                }
            }
            "content_block_delta" => {
                let delta = &v["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => delta["text"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(|t| StreamingEvent::TextDelta { text: t.to_string() }),
                    Some("input_json_delta") => delta["partial_json"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(|t| StreamingEvent::PartialToolCall {
                            index,
                            arguments: t.to_string(),
                        }),
                    Some("thinking_delta") => delta["thinking"].as_str().map(|t| StreamingEvent::ThinkingDelta {
                        thinking: t.to_string(),
                    }),
                    _ => None,
                }
            }
            "message_delta" => Some(StreamingEvent::Metadata {
                usage: parse_usage(&v["usage"]),
                finish_reason: v.pointer("/delta/stop_reason").and_then(Value::as_str).map(map_finish_reason),
                model: None,
            }),
            "message_stop" => Some(StreamingEvent::StreamEnd),
            "error" => Some(StreamingEvent::StreamError {
                error: v.get("error").cloned().unwrap_or(Value::Null),
            }),
            // ping, content_block_stop
            _ => None,
        };
        Ok(event.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ResponseSchema, SchemaNode};
    use crate::types::tool::ToolChoice;

    #[test]
    fn test_system_message_extraction() {
        let msgs = vec![Message::system("You are helpful."), Message::user("Hi")];
        let (sys, user_msgs) = AnthropicDriver::split_system_messages(&msgs);
        assert_eq!(sys.as_deref(), Some("You are helpful."));
        assert_eq!(user_msgs.len(), 1);
        assert_eq!(user_msgs[0]["role"], "user");
    }

    #[test]
    fn test_tool_results_merge_into_one_user_turn() {
        let msgs = vec![
            Message::user("weather in Paris and Rome?"),
            Message::with_parts(
                MessageRole::Assistant,
                vec![
                    ContentPart::ToolUse { id: "t1".into(), name: "weather".into(), input: json!({"city": "Paris"}) },
                    ContentPart::ToolUse { id: "t2".into(), name: "weather".into(), input: json!({"city": "Rome"}) },
                ],
            ),
            Message::tool("t1", "sunny"),
            Message::tool("t2", "rain"),
        ];
        let (_, turns) = AnthropicDriver::split_system_messages(&msgs);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2]["role"], "user");
        assert_eq!(turns[2]["content"][1]["tool_use_id"], "t2");
    }

    #[test]
    fn test_anthropic_build_request() {
        let driver = AnthropicDriver::new("anthropic");
        let request = ChatRequest::new("claude-sonnet-4-20250514", vec![Message::user("Hello")]).max_tokens(1024);
        let req = driver.build_request(&request).unwrap();
        assert_eq!(req.body["max_tokens"], 1024);
        assert_eq!(req.body["model"], "claude-sonnet-4-20250514");
        assert!(req.headers.contains_key("anthropic-version"));
        assert!(req.body.get("stream").is_none());
    }

    #[test]
    fn test_schema_forces_named_tool() {
        let driver = AnthropicDriver::new("anthropic");
        let request = ChatRequest::new("claude", vec![Message::user("?")])
            .schema(ResponseSchema::from_node(SchemaNode::string()));
        let req = driver.build_request(&request).unwrap();
        assert_eq!(
            req.body["tool_choice"],
            json!({"type": "tool", "name": dialect::STRUCTURED_OUTPUT_TOOL})
        );
    }

    #[test]
    fn test_ambiguous_required_choice_is_rejected() {
        let driver = AnthropicDriver::new("anthropic");
        let tools = vec![
            crate::types::ToolDefinition::new("a", SchemaNode::object(Default::default())),
            crate::types::ToolDefinition::new("b", SchemaNode::object(Default::default())),
        ];
        let request = ChatRequest::new("claude", vec![Message::user("?")])
            .tools(tools)
            .tool_choice(ToolChoice::Required);
        assert!(matches!(
            driver.build_request(&request),
            Err(crate::Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_anthropic_parse_response() {
        let driver = AnthropicDriver::new("anthropic");
        let body = json!({
            "model": "claude-x",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Hello!"},
                {"type": "tool_use", "id": "tu_1", "name": "lookup", "input": {"q": 1}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let raw = driver.parse_response(&body).unwrap();
        assert_eq!(raw.text, "Hello!");
        assert_eq!(raw.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(raw.usage.total_tokens, 15);
        assert_eq!(raw.tool_calls[0].arguments, json!({"q": 1}));
        assert_eq!(raw.extras.thinking.as_deref(), Some("hmm"));
    }

    #[test]
    fn test_anthropic_parse_stream_events() {
        let driver = AnthropicDriver::new("anthropic");
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(
            driver.parse_stream_event(data).unwrap(),
            vec![StreamingEvent::TextDelta { text: "Hi".into() }]
        );

        let data = r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"{\"a\""}}"#;
        assert_eq!(
            driver.parse_stream_event(data).unwrap(),
            vec![StreamingEvent::PartialToolCall { index: 2, arguments: "{\"a\"".into() }]
        );

        let data = r#"{"type":"message_delta","delta":{"stop_reason":"refusal"},"usage":{"output_tokens":3}}"#;
        match &driver.parse_stream_event(data).unwrap()[0] {
            StreamingEvent::Metadata { finish_reason, usage, .. } => {
                assert_eq!(*finish_reason, Some(FinishReason::ContentFilter));
                assert_eq!(usage.unwrap().output_tokens, 3);
            }
            other => panic!("expected Metadata, got {:?}", other),
        }

        assert!(driver.parse_stream_event(r#"{"type":"ping"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_anthropic_stop_reason_normalization() {
        assert_eq!(map_finish_reason("end_turn"), FinishReason::Stop);
        assert_eq!(map_finish_reason("stop_sequence"), FinishReason::Stop);
        assert_eq!(map_finish_reason("max_tokens"), FinishReason::Length);
    }
}
