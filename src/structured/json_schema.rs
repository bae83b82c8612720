//! Strict JSON-schema derivation for vendor-native structured output
//!
//! Some vendors can enforce a response shape server-side when handed a
//! JSON schema in strict mode: every object must set
//! `additionalProperties: false` and list all properties as required.
//! This module derives such a schema from a definition tree; adapters use
//! it only when the request schema is flagged native and the model
//! advertises structured output.

use serde_json::{Map, Value, json};

use super::schema::{Constraints, Fields, LeafKind, ListElements, SchemaNode};
use super::StructuredResponse;

impl StructuredResponse {
    /// Derive a strict JSON schema from the definition
    pub fn to_json_schema(&self) -> Value {
        object_schema(&self.definition)
    }
}

fn object_schema(fields: &Fields) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, node) in fields {
        properties.insert(name.clone(), node_schema(node));
        required.push(json!(name));
    }
    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": Value::Array(required),
        "additionalProperties": false,
    })
}

fn node_schema(node: &SchemaNode) -> Value {
    match node {
        SchemaNode::Leaf {
            kind,
            description,
            constraints,
            choices,
        } => {
            let mut map = Map::new();
            match kind {
                LeafKind::Str => {
                    map.insert("type".into(), json!("string"));
                }
                LeafKind::Int => {
                    map.insert("type".into(), json!("integer"));
                }
                LeafKind::Float => {
                    map.insert("type".into(), json!("number"));
                }
                LeafKind::Bool => {
                    map.insert("type".into(), json!("boolean"));
                }
                LeafKind::Enum => {
                    map.insert("type".into(), json!("string"));
                    map.insert("enum".into(), json!(choices));
                }
            }
            if !description.is_empty() {
                map.insert("description".into(), json!(description));
            }
            apply_constraints(&mut map, kind, constraints);
            Value::Object(map)
        }
        SchemaNode::Dict { description, fields } => {
            let mut schema = object_schema(fields);
            if !description.is_empty() {
                schema["description"] = json!(description);
            }
            schema
        }
        SchemaNode::List {
            description,
            constraints,
            elements,
        } => {
            let items = match elements {
                ListElements::Primitive(kind) => node_schema(&SchemaNode::Leaf {
                    kind: *kind,
                    description: String::new(),
                    constraints: Constraints::default(),
                    choices: Vec::new(),
                }),
                ListElements::Fields(fields) => object_schema(fields),
            };
            let mut map = Map::new();
            map.insert("type".into(), json!("array"));
            map.insert("items".into(), items);
            if !description.is_empty() {
                map.insert("description".into(), json!(description));
            }
            if let Some(v) = constraints.min_length {
                map.insert("minItems".into(), json!(v));
            }
            if let Some(v) = constraints.max_length {
                map.insert("maxItems".into(), json!(v));
            }
            Value::Object(map)
        }
    }
}

fn apply_constraints(map: &mut Map<String, Value>, kind: &LeafKind, constraints: &Constraints) {
    let numeric = matches!(kind, LeafKind::Int | LeafKind::Float);
    if numeric {
        if let Some(v) = constraints.ge {
            map.insert("minimum".into(), json!(v));
        }
        if let Some(v) = constraints.gt {
            map.insert("exclusiveMinimum".into(), json!(v));
        }
        if let Some(v) = constraints.le {
            map.insert("maximum".into(), json!(v));
        }
        if let Some(v) = constraints.lt {
            map.insert("exclusiveMaximum".into(), json!(v));
        }
        if let Some(v) = constraints.multiple_of {
            map.insert("multipleOf".into(), json!(v));
        }
    }
    if matches!(kind, LeafKind::Str) {
        if let Some(v) = constraints.min_length {
            map.insert("minLength".into(), json!(v));
        }
        if let Some(v) = constraints.max_length {
            map.insert("maxLength".into(), json!(v));
        }
    }
}
