//! Streamed bodies through decoding, assembly and normalization.

use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use unichat::dialect::anthropic;
use unichat::drivers::{create_driver, ApiStyle};
use unichat::pipeline::{cancellable, event_stream, ChatStream};
use unichat::schema::ValidatorCache;
use unichat::{BoxStream, CancellationToken, ChatContent, Error, FinishReason, ResponseSchema};

fn sse(payloads: &[serde_json::Value]) -> Vec<String> {
    payloads.iter().map(|p| format!("data: {}\n\n", p)).collect()
}

fn body(chunks: Vec<String>) -> BoxStream<'static, Bytes> {
    Box::pin(tokio_stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))))
}

fn openai_text_chunks() -> Vec<String> {
    let mut chunks = sse(&[
        json!({ "choices": [{ "delta": { "content": "Hel" } }] }),
        json!({ "choices": [{ "delta": { "content": "lo wor" } }] }),
        json!({ "choices": [{ "delta": { "content": "ld!" }, "finish_reason": "stop" }] }),
        json!({ "choices": [], "usage": { "prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8 } }),
    ]);
    chunks.push("data: [DONE]\n\n".to_string());
    chunks
}

fn chat_stream(style: ApiStyle, chunks: Vec<String>, schema: Option<&ResponseSchema>) -> ChatStream {
    let driver = create_driver(style, style.as_str());
    let plan = schema.and_then(|s| anthropic::compile_tooling(Some(s), &[], None).unwrap().plan);
    ChatStream::new(event_stream(body(chunks), driver), plan, Arc::new(ValidatorCache::default()))
}

#[tokio::test]
async fn test_fragments_concatenate_to_full_text() {
    let stream = chat_stream(ApiStyle::OpenAiCompatible, openai_text_chunks(), None);
    let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
    assert_eq!(fragments, vec!["Hel", "lo wor", "ld!"]);
    assert_eq!(fragments.concat(), "Hello world!");
}

#[tokio::test]
async fn test_complete_matches_single_shot_shape() {
    let result = chat_stream(ApiStyle::OpenAiCompatible, openai_text_chunks(), None)
        .complete()
        .await
        .unwrap();
    assert_eq!(result.text(), Some("Hello world!"));
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.usage.total_tokens, 8);
}

#[tokio::test]
async fn test_lines_split_across_chunk_boundaries() {
    let whole: String = openai_text_chunks().concat();
    let bytes = whole.as_bytes();
    // Cut at awkward places, including inside a JSON string.
    let cuts = [3usize, 17, 18, 40, 77, bytes.len()];
    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        let cut = cut.min(bytes.len());
        if cut > start {
            chunks.push(String::from_utf8(bytes[start..cut].to_vec()).unwrap());
            start = cut;
        }
    }
    let result = chat_stream(ApiStyle::OpenAiCompatible, chunks, None).complete().await.unwrap();
    assert_eq!(result.text(), Some("Hello world!"));
}

#[tokio::test]
async fn test_tool_call_arguments_assembled_by_index() {
    let mut chunks = sse(&[
        json!({ "choices": [{ "delta": { "tool_calls": [
            { "index": 0, "id": "call_a", "function": { "name": "get_weather", "arguments": "" } }
        ] } }] }),
        json!({ "choices": [{ "delta": { "tool_calls": [
            { "index": 1, "id": "call_b", "function": { "name": "get_time", "arguments": "{\"tz\":" } }
        ] } }] }),
        json!({ "choices": [{ "delta": { "tool_calls": [
            { "index": 0, "function": { "arguments": "{\"city\":\"Par" } }
        ] } }] }),
        json!({ "choices": [{ "delta": { "tool_calls": [
            { "index": 0, "function": { "arguments": "is\"}" } },
            { "index": 1, "function": { "arguments": "\"CET\"}" } }
        ] }, "finish_reason": "tool_calls" }] }),
    ]);
    chunks.push("data: [DONE]\n\n".into());

    let result = chat_stream(ApiStyle::OpenAiCompatible, chunks, None).complete().await.unwrap();
    assert_eq!(result.finish_reason, FinishReason::ToolCalls);
    assert_eq!(result.tool_calls.len(), 2);
    assert_eq!(result.tool_calls[0].id, "call_a");
    assert_eq!(result.tool_calls[0].arguments, json!({ "city": "Paris" }));
    assert_eq!(result.tool_calls[1].name, "get_time");
    assert_eq!(result.tool_calls[1].arguments, json!({ "tz": "CET" }));
}

#[tokio::test]
async fn test_structured_stream_withholds_fragments_and_validates() {
    let schema = ResponseSchema::from_value(json!({
        "type": "object",
        "properties": { "city": { "type": "string" } },
        "required": ["city"]
    }))
    .unwrap();
    let events = [
        json!({ "type": "message_start", "message": { "model": "claude-test", "usage": { "input_tokens": 12, "output_tokens": 0 } } }),
        json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "tool_use", "id": "toolu_1", "name": "respond_with_structured_output", "input": {} } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "input_json_delta", "partial_json": "{\"ci" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "input_json_delta", "partial_json": "ty\": \"Paris\"}" } }),
        json!({ "type": "content_block_stop", "index": 0 }),
        json!({ "type": "message_delta", "delta": { "stop_reason": "tool_use" }, "usage": { "output_tokens": 9 } }),
        json!({ "type": "message_stop" }),
    ];
    let chunks: Vec<String> = events
        .iter()
        .map(|e| format!("event: {}\ndata: {}\n\n", e["type"].as_str().unwrap(), e))
        .collect();

    let mut stream = chat_stream(ApiStyle::AnthropicMessages, chunks.clone(), Some(&schema));
    assert!(stream.is_structured());
    assert!(stream.next().await.is_none());

    let result = chat_stream(ApiStyle::AnthropicMessages, chunks, Some(&schema))
        .complete()
        .await
        .unwrap();
    assert_eq!(result.content, ChatContent::Structured(json!({ "city": "Paris" })));
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(result.model, "claude-test");
    assert_eq!(result.usage.input_tokens, 12);
    assert_eq!(result.usage.output_tokens, 9);
}

#[tokio::test]
async fn test_in_band_error_surfaces_classified() {
    let chunks = sse(&[
        json!({ "choices": [{ "delta": { "content": "partial" } }] }),
        json!({ "error": { "type": "overloaded_error", "message": "Overloaded" } }),
    ]);
    let err = chat_stream(ApiStyle::OpenAiCompatible, chunks, None).complete().await.unwrap_err();
    assert!(matches!(err, Error::ServerFault { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_a_stalled_stream() {
    let first = sse(&[json!({ "choices": [{ "delta": { "content": "Hel" } }] })]);
    let stalled: BoxStream<'static, Bytes> = Box::pin(
        stream::iter(first.into_iter().map(|c| Ok(Bytes::from(c)))).chain(stream::pending()),
    );
    let token = CancellationToken::new();
    let driver = create_driver(ApiStyle::OpenAiCompatible, "openai");
    let events = cancellable(event_stream(stalled, driver), token.clone());
    let mut stream = ChatStream::new(events, None, Arc::new(ValidatorCache::default()));

    assert_eq!(stream.next().await.unwrap().unwrap(), "Hel");

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel_with_reason("caller went away");
    });
    match stream.next().await {
        Some(Err(Error::Cancelled { reason })) => assert_eq!(reason.as_deref(), Some("caller went away")),
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert!(stream.next().await.is_none());
}
