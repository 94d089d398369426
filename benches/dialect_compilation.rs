//! Benchmarks for schema lowering and dialect compilation
//!
//! This benchmark measures:
//! - JSON Schema document to node tree lowering
//! - Per-backend compilation of a nested schema
//! - Full request building through each driver

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use unichat::dialect::{anthropic, gemini, openai};
use unichat::drivers::{create_driver, ApiStyle};
use unichat::{ChatRequest, Message, ResponseSchema};

fn order_schema(line_items: usize) -> Value {
    let mut properties = serde_json::Map::new();
    for i in 0..line_items {
        properties.insert(
            format!("field_{}", i),
            json!({ "type": ["string", "null"], "maxLength": 64 }),
        );
    }
    json!({
        "type": "object",
        "properties": {
            "order_id": { "type": "string" },
            "customer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "email": { "type": "string", "format": "email" }
                },
                "required": ["name"]
            },
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "sku": { "type": "string" },
                        "quantity": { "type": "integer", "minimum": 1 },
                        "status": { "enum": ["pending", "shipped", "delivered"] }
                    },
                    "required": ["sku", "quantity"]
                }
            },
            "metadata": { "type": "object", "properties": properties }
        },
        "required": ["order_id", "items"]
    })
}

fn bench_lowering(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema_lowering");
    for size in [4usize, 32, 128] {
        let document = order_schema(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("json_document", size), &document, |b, doc| {
            b.iter(|| ResponseSchema::from_value(black_box(doc.clone())).unwrap())
        });
    }
    group.finish();
}

fn bench_dialects(c: &mut Criterion) {
    let schema = ResponseSchema::from_value(order_schema(32)).unwrap();
    let node = schema.node();

    let mut group = c.benchmark_group("dialect_compilation");
    group.bench_function("openai", |b| b.iter(|| openai::compile(black_box(node))));
    group.bench_function("anthropic", |b| b.iter(|| anthropic::compile(black_box(node))));
    group.bench_function("gemini", |b| b.iter(|| gemini::compile(black_box(node))));
    group.finish();
}

fn bench_build_request(c: &mut Criterion) {
    let schema = ResponseSchema::from_value(order_schema(32)).unwrap();
    let request = ChatRequest::new(
        "bench-model",
        vec![
            Message::system("Extract the order."),
            Message::user("Order 42: two lamps for Ada Lovelace."),
        ],
    )
    .schema(schema);

    let mut group = c.benchmark_group("build_request");
    for style in [ApiStyle::OpenAiCompatible, ApiStyle::AnthropicMessages, ApiStyle::GeminiGenerate] {
        let driver = create_driver(style, style.as_str());
        group.bench_with_input(BenchmarkId::from_parameter(style), &request, |b, req| {
            b.iter(|| driver.build_request(black_box(req)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lowering, bench_dialects, bench_build_request);
criterion_main!(benches);
