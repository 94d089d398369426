//! The uniform schema tree every input kind is lowered into.

use serde_json::Value;
use std::collections::BTreeSet;

/// One node of a response or tool-parameter schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub kind: NodeKind,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    String(StringConstraints),
    Number(NumberConstraints),
    Boolean,
    Array {
        items: Box<SchemaNode>,
        min_items: Option<u64>,
        max_items: Option<u64>,
    },
    Object(ObjectSchema),
    /// Closed set of string values, in declaration order.
    Enum(Vec<String>),
    Literal(Value),
    /// The field may be absent.
    Optional(Box<SchemaNode>),
    /// The field may be `null`.
    Nullable(Box<SchemaNode>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringConstraints {
    pub pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberConstraints {
    pub integer: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// `minimum` is a strict bound.
    pub exclusive_minimum: bool,
    /// `maximum` is a strict bound.
    pub exclusive_maximum: bool,
    pub multiple_of: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub node: SchemaNode,
}

/// Object shape. Properties keep declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: Vec<Property>,
    pub required: BTreeSet<String>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property; it is marked required unless the node is `Optional`.
    pub fn property(mut self, name: impl Into<String>, node: SchemaNode) -> Self {
        let name = name.into();
        let required = !node.is_optional();
        self.insert(name, node, required);
        self
    }

    /// Add or replace a property with explicit required-set membership.
    pub fn insert(&mut self, name: String, node: SchemaNode, required: bool) {
        if required {
            self.required.insert(name.clone());
        } else {
            self.required.remove(&name);
        }
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.node = node,
            None => self.properties.push(Property { name, node }),
        }
    }

    /// A property is required when it is listed in `required` and not wrapped in `Optional`.
    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
            && self
                .get(name)
                .map(|node| !node.is_optional())
                .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.node)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}

impl SchemaNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::new(NodeKind::String(StringConstraints::default()))
    }

    pub fn string_with(constraints: StringConstraints) -> Self {
        Self::new(NodeKind::String(constraints))
    }

    pub fn number() -> Self {
        Self::new(NodeKind::Number(NumberConstraints::default()))
    }

    pub fn integer() -> Self {
        Self::new(NodeKind::Number(NumberConstraints {
            integer: true,
            ..Default::default()
        }))
    }

    pub fn number_with(constraints: NumberConstraints) -> Self {
        Self::new(NodeKind::Number(constraints))
    }

    pub fn boolean() -> Self {
        Self::new(NodeKind::Boolean)
    }

    pub fn array(items: SchemaNode) -> Self {
        Self::new(NodeKind::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        })
    }

    pub fn object(object: ObjectSchema) -> Self {
        Self::new(NodeKind::Object(object))
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(NodeKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(NodeKind::Literal(value.into()))
    }

    /// Wrap in `Optional`. Already-optional nodes are returned unchanged.
    pub fn optional(self) -> Self {
        if self.is_optional() {
            return self;
        }
        Self::new(NodeKind::Optional(Box::new(self)))
    }

    /// Wrap in `Nullable`. Already-nullable nodes are returned unchanged.
    pub fn nullable(self) -> Self {
        if matches!(self.kind, NodeKind::Nullable(_)) {
            return self;
        }
        Self::new(NodeKind::Nullable(Box::new(self)))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.kind, NodeKind::Optional(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, NodeKind::Object(_))
    }

    /// The node with any `Optional` wrapper removed.
    pub fn without_optional(&self) -> &SchemaNode {
        match &self.kind {
            NodeKind::Optional(inner) => inner,
            _ => self,
        }
    }

    /// Description of this node, falling back to the description of a wrapped node.
    pub fn effective_description(&self) -> Option<&str> {
        if let Some(d) = self.description.as_deref() {
            return Some(d);
        }
        match &self.kind {
            NodeKind::Optional(inner) | NodeKind::Nullable(inner) => inner.effective_description(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_never_double_wraps() {
        let node = SchemaNode::string().optional().optional();
        match node.kind {
            NodeKind::Optional(inner) => assert_eq!(*inner, SchemaNode::string()),
            other => panic!("expected Optional, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_wins_over_required_set() {
        let mut object = ObjectSchema::new();
        object.insert("nickname".into(), SchemaNode::string().optional(), true);
        assert!(object.required.contains("nickname"));
        assert!(!object.is_required("nickname"));
    }

    #[test]
    fn test_property_order_preserved() {
        let object = ObjectSchema::new()
            .property("zeta", SchemaNode::string())
            .property("alpha", SchemaNode::integer())
            .property("mid", SchemaNode::boolean().optional());
        let names: Vec<_> = object.names().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(object.is_required("zeta"));
        assert!(!object.is_required("mid"));
    }

    #[test]
    fn test_effective_description_looks_through_wrappers() {
        let node = SchemaNode::string().with_description("display name").optional();
        assert_eq!(node.effective_description(), Some("display name"));
    }
}
