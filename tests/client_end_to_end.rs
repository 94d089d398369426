//! Full calls through `ChatClient` against scripted transports.

use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use unichat::drivers::DriverRequest;
use unichat::transport::{FnTransport, RawResponse};
use unichat::{
    ApiStyle, CancellationToken, ChatClient, ChatContent, ChatRequest, Error, FinishReason, Message, ResponseSchema,
    RetryPolicy,
};

/// Replays canned responses in order and records what was sent.
#[derive(Clone, Default)]
struct Script {
    responses: Arc<Mutex<VecDeque<RawResponse>>>,
    sent: Arc<Mutex<Vec<DriverRequest>>>,
}

impl Script {
    fn new(responses: Vec<RawResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            sent: Arc::default(),
        }
    }

    fn transport(&self) -> Arc<FnTransport> {
        let script = self.clone();
        Arc::new(FnTransport::new(move |request: DriverRequest| {
            let script = script.clone();
            async move {
                script.sent.lock().unwrap().push(request);
                script
                    .responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| Error::network("script exhausted"))
            }
        }))
    }

    fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

fn client(style: ApiStyle, script: &Script, policy: RetryPolicy) -> ChatClient {
    ChatClient::builder()
        .api_style(style)
        .transport(script.transport())
        .retry_policy(policy)
        .build()
        .unwrap()
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries)
        .with_initial_delay(Duration::from_millis(5))
        .with_jitter(false)
}

fn city_schema() -> ResponseSchema {
    ResponseSchema::from_value(json!({
        "type": "object",
        "properties": { "city": { "type": "string" }, "country": { "type": "string" } },
        "required": ["city"]
    }))
    .unwrap()
}

fn openai_tool_response(arguments: Value) -> RawResponse {
    RawResponse::json(
        200,
        &json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "respond_with_structured_output", "arguments": arguments.to_string() }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 6, "total_tokens": 26 }
        }),
    )
}

fn request() -> ChatRequest {
    ChatRequest::new("gpt-4o", vec![Message::user("Where is the Louvre?")]).schema(city_schema())
}

#[tokio::test(start_paused = true)]
async fn test_server_fault_then_structured_success() {
    let script = Script::new(vec![
        RawResponse::new(503, "upstream unavailable"),
        openai_tool_response(json!({ "city": "Paris", "country": null })),
    ]);
    let client = client(ApiStyle::OpenAiCompatible, &script, fast_policy(3));

    let result = client.chat(&request()).await.unwrap();
    assert_eq!(result.content, ChatContent::Structured(json!({ "city": "Paris" })));
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.usage.total_tokens, 26);
    assert_eq!(script.calls(), 2);

    // The request is compiled once and resent unchanged.
    let sent = script.sent.lock().unwrap();
    assert_eq!(sent[0].body, sent[1].body);
    assert_eq!(sent[0].path, "/chat/completions");
}

#[tokio::test(start_paused = true)]
async fn test_schema_mismatch_is_retried() {
    let script = Script::new(vec![
        openai_tool_response(json!({ "country": "France" })),
        openai_tool_response(json!({ "city": "Paris", "country": "France" })),
    ]);
    let client = client(ApiStyle::OpenAiCompatible, &script, fast_policy(2));

    let result = client.chat(&request()).await.unwrap();
    assert_eq!(result.structured().unwrap()["city"], "Paris");
    assert_eq!(script.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_validation_exhaustion_surfaces_failure() {
    let script = Script::new((0..3).map(|_| openai_tool_response(json!({ "country": "France" }))).collect());
    let client = client(ApiStyle::OpenAiCompatible, &script, fast_policy(2));

    let err = client.chat(&request()).await.unwrap_err();
    assert!(matches!(err, Error::ValidationFailure { .. }));
    assert_eq!(script.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_fault_is_terminal() {
    let script = Script::new(vec![RawResponse::json(
        401,
        &json!({ "error": { "message": "Incorrect API key", "type": "invalid_request_error" } }),
    )]);
    let client = client(ApiStyle::OpenAiCompatible, &script, fast_policy(3));

    match client.chat(&request()).await {
        Err(Error::ClientFault { status_code, message }) => {
            assert_eq!(status_code, 401);
            assert_eq!(message, "Incorrect API key");
        }
        other => panic!("expected ClientFault, got {:?}", other),
    }
    assert_eq!(script.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_header_sets_the_wait() {
    let script = Script::new(vec![
        RawResponse::new(429, "").with_header("Retry-After", "2"),
        openai_tool_response(json!({ "city": "Paris" })),
    ]);
    let client = client(ApiStyle::OpenAiCompatible, &script, RetryPolicy::new(1));

    let start = Instant::now();
    client.chat(&request()).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2100));
}

#[tokio::test(start_paused = true)]
async fn test_pre_cancelled_call_sends_nothing() {
    let script = Script::new(vec![openai_tool_response(json!({ "city": "Paris" }))]);
    let client = client(ApiStyle::OpenAiCompatible, &script, fast_policy(3));
    let token = CancellationToken::new();
    token.cancel_with_reason("shutdown");

    let err = client.chat(&request().cancel_token(token)).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(script.calls(), 0);
}

#[tokio::test]
async fn test_gemini_native_schema_from_text() {
    let script = Script::new(vec![RawResponse::json(
        200,
        &json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "```json\n{\"city\": \"Paris\"}\n```" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 5, "totalTokenCount": 12 },
            "modelVersion": "gemini-2.0-flash"
        }),
    )]);
    let client = client(ApiStyle::GeminiGenerate, &script, RetryPolicy::no_retry());
    let request = ChatRequest::new("gemini-2.0-flash", vec![Message::user("Where is the Louvre?")]).schema(city_schema());

    let result = client.chat(&request).await.unwrap();
    assert_eq!(result.structured(), Some(&json!({ "city": "Paris" })));
    assert_eq!(result.model, "gemini-2.0-flash");

    let sent = script.sent.lock().unwrap();
    assert_eq!(sent[0].path, "/models/gemini-2.0-flash:generateContent");
    assert_eq!(sent[0].body["generationConfig"]["responseMimeType"], "application/json");
}

fn anthropic_stream_chunks() -> Vec<bytes::Bytes> {
    [
        json!({ "type": "message_start", "message": { "model": "claude-test", "usage": { "input_tokens": 4, "output_tokens": 0 } } }),
        json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "text", "text": "" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "Hello" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": " there" } }),
        json!({ "type": "message_delta", "delta": { "stop_reason": "end_turn" }, "usage": { "output_tokens": 2 } }),
        json!({ "type": "message_stop" }),
    ]
    .iter()
    .map(|e| bytes::Bytes::from(format!("event: {}\ndata: {}\n\n", e["type"].as_str().unwrap_or_default(), e)))
    .collect()
}

#[tokio::test]
async fn test_chat_consumes_a_streaming_request() {
    let script = Script::new(vec![RawResponse::chunked(200, anthropic_stream_chunks())]);
    let client = client(ApiStyle::AnthropicMessages, &script, RetryPolicy::no_retry());
    let request = ChatRequest::new("claude-test", vec![Message::user("Hi")]).stream();

    let result = client.chat(&request).await.unwrap();
    assert_eq!(result.text(), Some("Hello there"));
    assert_eq!(result.usage.output_tokens, 2);
    assert!(script.sent.lock().unwrap()[0].stream);
}

#[tokio::test(start_paused = true)]
async fn test_chat_stream_retries_only_establishment() {
    let script = Script::new(vec![
        RawResponse::json(529, &json!({ "type": "error", "error": { "type": "overloaded_error", "message": "Overloaded" } })),
        RawResponse::chunked(200, anthropic_stream_chunks()),
    ]);
    let client = client(ApiStyle::AnthropicMessages, &script, fast_policy(2));
    let request = ChatRequest::new("claude-test", vec![Message::user("Hi")]);

    let stream = client.chat_stream(&request).await.unwrap();
    let text: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
    assert_eq!(text.concat(), "Hello there");
    assert_eq!(script.calls(), 2);
}
