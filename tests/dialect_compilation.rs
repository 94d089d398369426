//! Dialect compilation across the three backends.

use serde_json::{json, Value};
use unichat::dialect::{anthropic, gemini, openai, StructuredMode, STRUCTURED_OUTPUT_TOOL};
use unichat::{ResponseSchema, ToolChoice, ToolDefinition};

fn profile_schema() -> ResponseSchema {
    ResponseSchema::from_value(json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "nickname": { "type": "string" },
            "age": { "anyOf": [{ "type": "integer" }, { "type": "null" }] },
            "tags": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["name", "age", "tags"]
    }))
    .unwrap()
}

/// Every key used anywhere in the tree.
fn keys(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                out.push(k.clone());
                keys(v, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| keys(v, out)),
        _ => {}
    }
}

/// Every `type` value in the tree.
fn type_names(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(t)) = map.get("type") {
                out.push(t.clone());
            }
            map.values().for_each(|v| type_names(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| type_names(v, out)),
        _ => {}
    }
}

#[test]
fn test_openai_marks_everything_required() {
    let compiled = openai::compile(profile_schema().node());
    assert_eq!(compiled.schema["required"], json!(["name", "nickname", "age", "tags"]));
    assert_eq!(compiled.schema["additionalProperties"], json!(false));
    assert_eq!(compiled.schema["properties"]["age"], json!({ "type": "integer" }));
    assert_eq!(compiled.optional_paths.iter().collect::<Vec<_>>(), vec!["nickname"]);
}

#[test]
fn test_anthropic_keeps_real_required_set() {
    let compiled = anthropic::compile(profile_schema().node());
    assert_eq!(compiled["required"], json!(["name", "age", "tags"]));
    assert_eq!(compiled["properties"]["age"], json!({ "type": "integer" }));
    assert!(compiled.get("additionalProperties").is_none());
}

#[test]
fn test_gemini_upper_case_ordering_and_nullable() {
    let compiled = gemini::compile(profile_schema().node());
    assert_eq!(compiled["type"], "OBJECT");
    assert_eq!(compiled["required"], json!(["name", "age", "tags"]));
    assert_eq!(compiled["propertyOrdering"], json!(["name", "nickname", "age", "tags"]));
    assert_eq!(compiled["properties"]["age"], json!({ "type": "INTEGER", "nullable": true }));
    assert_eq!(compiled["properties"]["tags"]["items"]["type"], "STRING");
}

#[test]
fn test_dialect_purity() {
    let node = profile_schema();
    let node = node.node();

    let mut found = Vec::new();
    keys(&anthropic::compile(node), &mut found);
    keys(&openai::compile(node).schema, &mut found);
    assert!(!found.iter().any(|k| k == "propertyOrdering" || k == "nullable"));

    let mut found = Vec::new();
    keys(&gemini::compile(node), &mut found);
    assert!(!found.iter().any(|k| k == "additionalProperties" || k == "anyOf"));

    let mut types = Vec::new();
    type_names(&gemini::compile(node), &mut types);
    assert!(types.iter().all(|t| t.chars().all(|c| c.is_ascii_uppercase())));

    let mut types = Vec::new();
    type_names(&anthropic::compile(node), &mut types);
    assert!(types.iter().all(|t| t.chars().all(|c| c.is_ascii_lowercase())));
}

#[test]
fn test_literals_degrade_under_gemini() {
    let schema = ResponseSchema::from_value(json!({
        "type": "object",
        "properties": {
            "kind": { "const": "person" },
            "version": { "const": 2 },
            "active": { "const": true }
        },
        "required": ["kind", "version", "active"]
    }))
    .unwrap();
    let compiled = gemini::compile(schema.node());
    assert_eq!(compiled["properties"]["kind"], json!({ "type": "STRING", "format": "enum", "enum": ["person"] }));
    assert_eq!(compiled["properties"]["version"], json!({ "type": "INTEGER" }));
    assert_eq!(compiled["properties"]["active"], json!({ "type": "BOOLEAN" }));

    let compiled = anthropic::compile(schema.node());
    assert_eq!(compiled["properties"]["kind"], json!({ "type": "string", "enum": ["person"] }));
}

#[test]
fn test_schema_becomes_forced_tool_for_anthropic() {
    let schema = profile_schema();
    let tooling = anthropic::compile_tooling(Some(&schema), &[], None).unwrap();
    let tools = tooling.fields["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], STRUCTURED_OUTPUT_TOOL);
    assert_eq!(tools[0]["input_schema"]["required"], json!(["name", "age", "tags"]));
    assert_eq!(tooling.fields["tool_choice"], json!({ "type": "tool", "name": STRUCTURED_OUTPUT_TOOL }));
    assert_eq!(
        tooling.plan.map(|p| p.mode),
        Some(StructuredMode::Tool { wrapped: false })
    );
}

#[test]
fn test_gemini_native_vs_folded_modes() {
    let schema = profile_schema();
    let native = gemini::compile_tooling(Some(&schema), &[], None).unwrap();
    assert_eq!(native.fields["generationConfig"]["responseMimeType"], "application/json");
    assert!(native.fields.get("tools").is_none());
    assert_eq!(native.plan.as_ref().map(|p| &p.mode), Some(&StructuredMode::Native));

    let weather = ToolDefinition::from_schema_value(
        "get_weather",
        &json!({ "type": "object", "properties": { "city": { "type": "string" } }, "required": ["city"] }),
    )
    .unwrap();
    let folded = gemini::compile_tooling(Some(&schema), &[weather], None).unwrap();
    assert!(folded.fields.get("generationConfig").is_none());
    let declarations = folded.fields["tools"][0]["functionDeclarations"].as_array().unwrap();
    let names: Vec<&str> = declarations.iter().filter_map(|d| d["name"].as_str()).collect();
    assert_eq!(names, vec!["get_weather", STRUCTURED_OUTPUT_TOOL]);
    assert_eq!(folded.fields["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
}

#[test]
fn test_non_object_root_is_wrapped() {
    let schema = ResponseSchema::from_value(json!({ "type": "array", "items": { "type": "string" } })).unwrap();
    let tooling = openai::compile_tooling(Some(&schema), &[], None).unwrap();
    let tool = tooling.fields["tools"]
        .as_array()
        .and_then(|tools| tools.iter().find(|t| t["function"]["name"] == STRUCTURED_OUTPUT_TOOL))
        .cloned()
        .unwrap();
    assert_eq!(tool["function"]["parameters"]["properties"]["value"]["type"], "array");
    assert_eq!(
        tooling.plan.map(|p| p.mode),
        Some(StructuredMode::Tool { wrapped: true })
    );
}

#[test]
fn test_tool_choice_none_with_schema_is_rejected() {
    let schema = profile_schema();
    for result in [
        openai::compile_tooling(Some(&schema), &[], Some(&ToolChoice::None)),
        anthropic::compile_tooling(Some(&schema), &[], Some(&ToolChoice::None)),
    ] {
        assert!(matches!(result, Err(unichat::Error::Configuration { .. })));
    }
}

#[test]
fn test_anthropic_forces_structured_tool_alongside_user_tools() {
    let schema = profile_schema();
    let lookup = ToolDefinition::from_schema_value(
        "lookup",
        &json!({ "type": "object", "properties": { "q": { "type": "string" } }, "required": ["q"] }),
    )
    .unwrap();
    for choice in [None, Some(ToolChoice::Auto)] {
        let tooling = anthropic::compile_tooling(Some(&schema), &[lookup.clone()], choice.as_ref()).unwrap();
        assert_eq!(tooling.fields["tool_choice"], json!({ "type": "tool", "name": STRUCTURED_OUTPUT_TOOL }));
        let names: Vec<&str> = tooling.fields["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, vec!["lookup", STRUCTURED_OUTPUT_TOOL]);
    }
}

#[test]
fn test_strict_bounds_per_dialect() {
    let schema = ResponseSchema::from_value(json!({
        "type": "object",
        "properties": { "ratio": { "type": "number", "exclusiveMinimum": 0, "maximum": 1 } },
        "required": ["ratio"]
    }))
    .unwrap();

    let expected = json!({ "type": "number", "exclusiveMinimum": 0.0, "maximum": 1.0 });
    assert_eq!(openai::compile(schema.node()).schema["properties"]["ratio"], expected);
    assert_eq!(anthropic::compile(schema.node())["properties"]["ratio"], expected);
    // Gemini has no strict bound, so only the inclusive one survives.
    assert_eq!(
        gemini::compile(schema.node())["properties"]["ratio"],
        json!({ "type": "NUMBER", "maximum": 1.0 })
    );
}
