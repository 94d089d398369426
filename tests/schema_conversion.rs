//! Schema classification, lowering and validation of model output.

use serde_json::json;
use unichat::dialect::{openai, STRUCTURED_OUTPUT_TOOL};
use unichat::pipeline::{normalize, RawOutcome};
use unichat::schema::{classify, validate_structured, SchemaInput, ValidatorCache};
use unichat::{ChatContent, Error, ResponseSchema, ToolCall};

fn zod(type_name: &str) -> serde_json::Value {
    json!({ "_def": { "typeName": type_name } })
}

#[test]
fn test_structural_and_document_inputs_lower_to_the_same_tree() {
    let structural = json!({
        "_def": {
            "typeName": "ZodObject",
            "shape": {
                "name": zod("ZodString"),
                "nickname": { "_def": { "typeName": "ZodOptional", "innerType": zod("ZodString") } },
                "score": { "_def": { "typeName": "ZodNullable", "innerType": zod("ZodNumber") } }
            }
        }
    });
    let document = json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "nickname": { "type": "string" },
            "score": { "type": ["number", "null"] }
        },
        "required": ["name", "score"]
    });

    assert!(matches!(classify(structural.clone()).unwrap(), SchemaInput::Structural(_)));
    assert!(matches!(classify(document.clone()).unwrap(), SchemaInput::JsonDocument(_)));

    let a = ResponseSchema::from_value(structural).unwrap();
    let b = ResponseSchema::from_value(document).unwrap();
    assert_eq!(a.node(), b.node());
}

#[test]
fn test_newer_structural_encoding_is_probed() {
    let value = json!({
        "_zod": {
            "def": {
                "type": "object",
                "shape": {
                    "status": { "_zod": { "def": { "type": "enum", "entries": { "open": "open", "closed": "closed" } } } }
                }
            }
        }
    });
    let schema = ResponseSchema::from_value(value).unwrap();
    let compiled = openai::compile(schema.node());
    assert_eq!(compiled.schema["properties"]["status"]["type"], "string");
    assert_eq!(compiled.schema["properties"]["status"]["enum"], json!(["open", "closed"]));
}

#[test]
fn test_unclassifiable_value_is_schema_error() {
    let err = ResponseSchema::from_value(json!({ "hello": "world" })).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }));
}

#[test]
fn test_validation_reports_paths() {
    let schema = ResponseSchema::from_value(json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "age": { "type": "integer", "minimum": 0 }
        },
        "required": ["name", "age"]
    }))
    .unwrap();
    let cache = ValidatorCache::default();

    let ok = validate_structured(&schema, json!({ "name": "Ada", "age": 36 }), &cache).unwrap();
    assert_eq!(ok["name"], "Ada");

    match validate_structured(&schema, json!({ "name": "Ada", "age": -1 }), &cache) {
        Err(Error::ValidationFailure { cause, .. }) => {
            assert!(!cause.is_empty());
            assert!(cause.iter().any(|e| e.path.as_deref().map_or(false, |p| p.contains("age"))));
        }
        other => panic!("expected ValidationFailure, got {:?}", other),
    }
}

#[test]
fn test_optional_field_round_trip_through_strict_dialect() {
    let schema = ResponseSchema::from_value(json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "nickname": { "type": "string" }
        },
        "required": ["name"]
    }))
    .unwrap();
    let plan = openai::compile_tooling(Some(&schema), &[], None).unwrap().plan;

    // Strict mode makes the model emit every field; the optional one comes back null.
    let raw = RawOutcome {
        tool_calls: vec![ToolCall {
            id: "call_1".into(),
            name: STRUCTURED_OUTPUT_TOOL.into(),
            arguments: json!({ "name": "Ada", "nickname": null }),
        }],
        ..Default::default()
    };
    let result = normalize(raw, plan.as_ref(), &ValidatorCache::default()).unwrap();
    assert_eq!(result.content, ChatContent::Structured(json!({ "name": "Ada" })));
    assert!(result.tool_calls.is_empty());
}
