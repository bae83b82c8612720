//! Structured-response engine
//!
//! Builds, renders and parses the XML-like schema language used to elicit
//! typed outputs from models. The contract is the round trip: schema →
//! prompt template → best-effort LLM text → parsed instance, where
//! rendering a parsed instance and re-parsing it reproduces the instance.

mod from_prompt;
mod json_schema;
mod schema;
mod to_prompt;

pub use schema::{Constraints, Fields, FORBIDDEN_FIELD_NAMES, LeafKind, ListElements, SchemaNode};

use std::sync::LazyLock;

use regex::Regex;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::utils::error::{LlmError, Result};

/// A structured-response definition plus, once parsed, its instance tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredResponse {
    pub class_name: String,
    pub definition: Fields,
    /// Populated value tree shaped like the definition
    pub instance: Option<Value>,
    /// Whether the definition is eligible for a vendor-native JSON-schema path
    pub native: bool,
}

impl StructuredResponse {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            definition: Fields::new(),
            instance: None,
            native: false,
        }
    }

    pub fn with_native(mut self, native: bool) -> Self {
        self.native = native;
        self
    }

    /// Root tag used in prompts and parsed output
    pub fn root_tag(&self) -> String {
        camel_to_snake(&self.class_name)
    }

    /// Add a node at a dot-separated field path.
    ///
    /// Intermediate segments must name existing `dict` nodes or lists with
    /// dict-shaped elements; for lists the path descends into the element
    /// schema. The final segment inserts or replaces a field.
    pub fn add_node(&mut self, path: &str, node: SchemaNode) -> Result<()> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let name = segments
            .pop()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LlmError::conversion(format!("invalid node path '{path}'")))?;

        if FORBIDDEN_FIELD_NAMES.contains(&name) {
            return Err(LlmError::conversion(format!(
                "field name '{name}' is forbidden"
            )));
        }

        let mut fields = &mut self.definition;
        for segment in segments {
            let (_, parent) = fields
                .iter_mut()
                .find(|(field, _)| field == segment)
                .ok_or_else(|| {
                    LlmError::conversion(format!(
                        "intermediary node '{segment}' not found for path '{path}'"
                    ))
                })?;
            fields = match parent {
                SchemaNode::Dict { fields, .. } => fields,
                SchemaNode::List {
                    elements: ListElements::Fields(fields),
                    ..
                } => fields,
                SchemaNode::List { .. } => {
                    return Err(LlmError::conversion(format!(
                        "'{segment}' is a list of primitives; cannot add nodes under it"
                    )));
                }
                SchemaNode::Leaf { .. } => {
                    return Err(LlmError::conversion(format!(
                        "'{segment}' is a leaf; cannot add nodes under it"
                    )));
                }
            };
        }

        if let Some(existing) = fields.iter_mut().find(|(field, _)| field == name) {
            existing.1 = node;
        } else {
            fields.push((name.to_string(), node));
        }
        Ok(())
    }

    /// Serialize to the flat wire record as a JSON string
    pub fn serialize(&self) -> String {
        serde_json::to_string(&self.to_wire()).expect("wire record is always serializable")
    }

    /// Parse the flat wire record from a JSON string
    pub fn deserialize(json_string: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json_string)
            .map_err(|e| LlmError::conversion(format!("invalid structured response JSON: {e}")))?;
        Self::from_wire(&value)
    }

    fn to_wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("class_name".into(), json!(self.class_name));
        map.insert("definition".into(), schema::fields_to_value(&self.definition));
        map.insert(
            "instance".into(),
            self.instance.clone().unwrap_or(Value::Null),
        );
        map.insert("native".into(), json!(self.native));
        Value::Object(map)
    }

    fn from_wire(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| LlmError::conversion("structured response must be a JSON object"))?;
        let class_name = map
            .get("class_name")
            .and_then(Value::as_str)
            .unwrap_or("StructuredResponse")
            .to_string();
        let definition = match map.get("definition") {
            Some(Value::Object(fields)) => schema::fields_from_map(fields)?,
            _ => Fields::new(),
        };
        let instance = match map.get("instance") {
            None | Some(Value::Null) => None,
            Some(other) => Some(other.clone()),
        };
        let native = map.get("native").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            class_name,
            definition,
            instance,
            native,
        })
    }
}

impl Serialize for StructuredResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StructuredResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_wire(&value).map_err(D::Error::custom)
    }
}

/// CamelCase to snake_case, keeping digit boundaries intact
pub fn camel_to_snake(name: &str) -> String {
    static FIRST: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid regex"));
    static SECOND: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));

    let pass = FIRST.replace_all(name, "${1}_${2}");
    SECOND.replace_all(&pass, "${1}_${2}").to_lowercase()
}

/// Coerce trimmed tag text to a leaf value. Int and float are strict;
/// bool accepts true/1/false/0 and treats any other non-empty text as
/// true; enum text is returned verbatim.
pub(crate) fn coerce_text(kind: LeafKind, text: &str) -> std::result::Result<Value, String> {
    let text = text.trim();
    match kind {
        LeafKind::Int => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("cannot parse '{text}' as int")),
        LeafKind::Float => text
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("cannot parse '{text}' as float")),
        LeafKind::Bool => Ok(match text.to_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            other => Value::Bool(!other.is_empty()),
        }),
        LeafKind::Str | LeafKind::Enum => Ok(Value::String(text.to_string())),
    }
}
