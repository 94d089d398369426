//! Schema abstraction: one node tree, whatever the schema came in as.
//!
//! Two input kinds are recognized by sniffing the value's shape:
//!
//! | Kind | Recognized by |
//! |------|---------------|
//! | [`SchemaInput::Structural`] | a definition object under `_def`, `_zod.def` or `def` |
//! | [`SchemaInput::JsonDocument`] | any of `type`, `properties`, `items`, `anyOf`, `oneOf`, `$ref`, `enum`, `const` |
//!
//! Both are lowered to a [`SchemaNode`], which the dialect compilers and the node
//! validator consume.
//!
//! ```
//! use unichat::schema::{classify, SchemaKind};
//! use serde_json::json;
//!
//! let input = classify(json!({ "type": "object", "properties": { "n": { "type": "integer" } } })).unwrap();
//! assert_eq!(input.kind(), SchemaKind::JsonDocument);
//! assert!(input.to_node().unwrap().is_object());
//! ```

pub mod cache;
pub mod error;
pub mod json_document;
pub mod node;
pub mod structural;
pub mod validate;

pub use cache::ValidatorCache;
pub use error::{ValidationError, ValidationResult};
pub use node::{NodeKind, NumberConstraints, ObjectSchema, Property, SchemaNode, StringConstraints};
pub use validate::{validate_structured, NodeValidator};

use serde_json::Value;

use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Structural,
    JsonDocument,
}

/// A schema value tagged with the kind it was classified as.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaInput {
    Structural(Value),
    JsonDocument(Value),
}

impl SchemaInput {
    pub fn kind(&self) -> SchemaKind {
        match self {
            SchemaInput::Structural(_) => SchemaKind::Structural,
            SchemaInput::JsonDocument(_) => SchemaKind::JsonDocument,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            SchemaInput::Structural(v) | SchemaInput::JsonDocument(v) => v,
        }
    }

    pub fn to_node(&self) -> Result<SchemaNode> {
        match self {
            SchemaInput::Structural(v) => structural::to_node(v),
            SchemaInput::JsonDocument(v) => json_document::to_node(v),
        }
    }
}

/// Classify an untyped schema value. Structural definitions are checked first.
pub fn classify(value: Value) -> Result<SchemaInput> {
    if structural::is_structural(&value) {
        Ok(SchemaInput::Structural(value))
    } else if json_document::is_json_document(&value) {
        Ok(SchemaInput::JsonDocument(value))
    } else {
        Err(Error::schema_with_context(
            "value is neither a structural schema nor a JSON Schema document",
            ErrorContext::new().with_source("schema_classifier"),
        ))
    }
}

/// Classify and lower in one step.
pub fn to_node(value: &Value) -> Result<SchemaNode> {
    classify(value.clone())?.to_node()
}

/// The response schema attached to a chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    input: SchemaInput,
    node: SchemaNode,
    name: String,
    description: Option<String>,
}

impl ResponseSchema {
    pub fn from_value(value: Value) -> Result<Self> {
        let input = classify(value)?;
        let node = input.to_node()?;
        let description = node.description.clone();
        Ok(Self {
            input,
            node,
            name: "response".to_string(),
            description,
        })
    }

    /// Build from a node tree directly. Validation walks the tree.
    pub fn from_node(node: SchemaNode) -> Self {
        Self {
            input: SchemaInput::Structural(Value::Null),
            description: node.description.clone(),
            node,
            name: "response".to_string(),
        }
    }

    /// Derive the schema of a Rust type.
    pub fn for_type<T: schemars::JsonSchema>() -> Result<Self> {
        let schema = schemars::schema_for!(T);
        let value = serde_json::to_value(&schema)?;
        let title = value.get("title").and_then(|t| t.as_str()).map(String::from);
        let mut schema = Self::from_value(value)?;
        if let Some(title) = title {
            schema.name = title;
        }
        Ok(schema)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn input(&self) -> &SchemaInput {
        &self.input
    }

    pub fn node(&self) -> &SchemaNode {
        &self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_structural_first() {
        let value = json!({ "_def": { "typeName": "ZodString" }, "type": "string" });
        assert_eq!(classify(value).unwrap().kind(), SchemaKind::Structural);
    }

    #[test]
    fn test_classify_rejects_unknown_shapes() {
        assert!(matches!(
            classify(json!({ "hello": "world" })),
            Err(Error::Schema { .. })
        ));
        assert!(classify(json!("string")).is_err());
    }

    #[test]
    fn test_for_type_uses_title_as_name() {
        #[derive(schemars::JsonSchema)]
        #[allow(dead_code)]
        struct Weather {
            city: String,
            celsius: f64,
            note: Option<String>,
        }

        let schema = ResponseSchema::for_type::<Weather>().unwrap();
        assert_eq!(schema.name(), "Weather");
        let NodeKind::Object(object) = &schema.node().kind else {
            panic!("expected object");
        };
        assert!(object.is_required("city"));
        assert!(!object.is_required("note"));
    }
}
