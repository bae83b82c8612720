//! Schema tree for structured responses
//!
//! A definition is an ordered set of named nodes. Nodes are leaves (str,
//! int, float, bool, enum), dicts of named children, or lists whose
//! elements are either a primitive kind or a dict-shaped field set. The
//! tree is the wire contract: it serializes to the same flat JSON shape
//! the clients send.

use serde_json::{Map, Value, json};

use crate::utils::error::{LlmError, Result};

/// Field names that collide with schema attribute names
pub const FORBIDDEN_FIELD_NAMES: &[&str] = &[
    "type",
    "description",
    "elements",
    "choices",
    "int",
    "float",
    "bool",
    "dict",
    "enum",
    "list",
    "item",
];

/// Primitive leaf kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    Str,
    Int,
    Float,
    Bool,
    Enum,
}

impl LeafKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafKind::Str => "str",
            LeafKind::Int => "int",
            LeafKind::Float => "float",
            LeafKind::Bool => "bool",
            LeafKind::Enum => "enum",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "str" => Some(LeafKind::Str),
            "int" => Some(LeafKind::Int),
            "float" => Some(LeafKind::Float),
            "bool" => Some(LeafKind::Bool),
            "enum" => Some(LeafKind::Enum),
            _ => None,
        }
    }
}

/// Numeric and length constraints recognized on leaves and lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub ge: Option<f64>,
    pub gt: Option<f64>,
    pub le: Option<f64>,
    pub lt: Option<f64>,
    pub multiple_of: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// (wire key, prompt attribute name, value) for each set constraint,
    /// in the canonical rendering order
    pub fn entries(&self) -> Vec<(&'static str, &'static str, f64)> {
        let mut out = Vec::new();
        if let Some(v) = self.ge {
            out.push(("ge", "greater_or_equal", v));
        }
        if let Some(v) = self.gt {
            out.push(("gt", "greater_than", v));
        }
        if let Some(v) = self.le {
            out.push(("le", "less_or_equal", v));
        }
        if let Some(v) = self.lt {
            out.push(("lt", "less_than", v));
        }
        if let Some(v) = self.multiple_of {
            out.push(("multiple_of", "multiple_of", v));
        }
        if let Some(v) = self.min_length {
            out.push(("min_length", "min_length", v as f64));
        }
        if let Some(v) = self.max_length {
            out.push(("max_length", "max_length", v as f64));
        }
        out
    }
}

/// Ordered named children of a dict node or a complex list element
pub type Fields = Vec<(String, SchemaNode)>;

/// Element schema of a list node
#[derive(Debug, Clone, PartialEq)]
pub enum ListElements {
    Primitive(LeafKind),
    Fields(Fields),
}

/// One node of a structured-response definition
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Leaf {
        kind: LeafKind,
        description: String,
        constraints: Constraints,
        choices: Vec<String>,
    },
    Dict {
        description: String,
        fields: Fields,
    },
    List {
        description: String,
        constraints: Constraints,
        elements: ListElements,
    },
}

impl SchemaNode {
    pub fn str_field(description: impl Into<String>) -> Self {
        Self::leaf(LeafKind::Str, description)
    }

    pub fn int_field(description: impl Into<String>) -> Self {
        Self::leaf(LeafKind::Int, description)
    }

    pub fn float_field(description: impl Into<String>) -> Self {
        Self::leaf(LeafKind::Float, description)
    }

    pub fn bool_field(description: impl Into<String>) -> Self {
        Self::leaf(LeafKind::Bool, description)
    }

    pub fn enum_field<S: Into<String>>(
        description: impl Into<String>,
        choices: impl IntoIterator<Item = S>,
    ) -> Self {
        SchemaNode::Leaf {
            kind: LeafKind::Enum,
            description: description.into(),
            constraints: Constraints::default(),
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dict(description: impl Into<String>) -> Self {
        SchemaNode::Dict {
            description: description.into(),
            fields: Fields::new(),
        }
    }

    pub fn list_of(kind: LeafKind, description: impl Into<String>) -> Self {
        SchemaNode::List {
            description: description.into(),
            constraints: Constraints::default(),
            elements: ListElements::Primitive(kind),
        }
    }

    pub fn list_of_dicts(description: impl Into<String>) -> Self {
        SchemaNode::List {
            description: description.into(),
            constraints: Constraints::default(),
            elements: ListElements::Fields(Fields::new()),
        }
    }

    fn leaf(kind: LeafKind, description: impl Into<String>) -> Self {
        SchemaNode::Leaf {
            kind,
            description: description.into(),
            constraints: Constraints::default(),
            choices: Vec::new(),
        }
    }

    /// Replace the constraints on a leaf or list node
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        match &mut self {
            SchemaNode::Leaf { constraints: c, .. } => *c = constraints,
            SchemaNode::List { constraints: c, .. } => *c = constraints,
            SchemaNode::Dict { .. } => {}
        }
        self
    }

    /// Wire form of this node
    pub fn to_value(&self) -> Value {
        match self {
            SchemaNode::Leaf {
                kind,
                description,
                constraints,
                choices,
            } => {
                let mut map = Map::new();
                map.insert("type".into(), json!(kind.as_str()));
                map.insert("description".into(), json!(description));
                for (key, _, value) in constraints.entries() {
                    map.insert(key.into(), number_value(value));
                }
                if *kind == LeafKind::Enum {
                    map.insert("choices".into(), json!(choices));
                }
                Value::Object(map)
            }
            SchemaNode::Dict { description, fields } => {
                let mut map = Map::new();
                map.insert("type".into(), json!("dict"));
                map.insert("description".into(), json!(description));
                map.insert("elements".into(), fields_to_value(fields));
                Value::Object(map)
            }
            SchemaNode::List {
                description,
                constraints,
                elements,
            } => {
                let mut map = Map::new();
                map.insert("type".into(), json!("list"));
                map.insert("description".into(), json!(description));
                match elements {
                    ListElements::Primitive(kind) => {
                        map.insert("elements".into(), json!(kind.as_str()));
                    }
                    ListElements::Fields(fields) => {
                        map.insert("elements".into(), fields_to_value(fields));
                    }
                }
                for (key, _, value) in constraints.entries() {
                    map.insert(key.into(), number_value(value));
                }
                Value::Object(map)
            }
        }
    }

    /// Parse one node from its wire form
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| LlmError::conversion("schema node must be a JSON object"))?;
        let description = map
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let type_name = map.get("type").and_then(Value::as_str).unwrap_or("str");

        match type_name {
            "dict" => {
                let elements = map
                    .get("elements")
                    .and_then(Value::as_object)
                    .ok_or_else(|| LlmError::conversion("dict node missing elements"))?;
                Ok(SchemaNode::Dict {
                    description,
                    fields: fields_from_map(elements)?,
                })
            }
            "list" => {
                let elements = match map.get("elements") {
                    Some(Value::String(kind_name)) => {
                        let kind = LeafKind::parse(kind_name).ok_or_else(|| {
                            LlmError::conversion(format!("unknown list element type '{kind_name}'"))
                        })?;
                        ListElements::Primitive(kind)
                    }
                    Some(Value::Object(fields)) => ListElements::Fields(fields_from_map(fields)?),
                    _ => return Err(LlmError::conversion("list node missing elements")),
                };
                Ok(SchemaNode::List {
                    description,
                    constraints: constraints_from_map(map),
                    elements,
                })
            }
            leaf => {
                let kind = LeafKind::parse(leaf)
                    .ok_or_else(|| LlmError::conversion(format!("unknown node type '{leaf}'")))?;
                let choices = map
                    .get("choices")
                    .and_then(Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .map(|v| match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(SchemaNode::Leaf {
                    kind,
                    description,
                    constraints: constraints_from_map(map),
                    choices,
                })
            }
        }
    }
}

/// Render a constraint number without a trailing `.0` for whole values
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

pub(crate) fn fields_to_value(fields: &Fields) -> Value {
    let mut map = Map::new();
    for (name, node) in fields {
        map.insert(name.clone(), node.to_value());
    }
    Value::Object(map)
}

pub(crate) fn fields_from_map(map: &Map<String, Value>) -> Result<Fields> {
    let mut fields = Fields::new();
    for (name, node) in map {
        fields.push((name.clone(), SchemaNode::from_value(node)?));
    }
    Ok(fields)
}

fn constraints_from_map(map: &Map<String, Value>) -> Constraints {
    Constraints {
        ge: map.get("ge").and_then(Value::as_f64),
        gt: map.get("gt").and_then(Value::as_f64),
        le: map.get("le").and_then(Value::as_f64),
        lt: map.get("lt").and_then(Value::as_f64),
        multiple_of: map.get("multiple_of").and_then(Value::as_f64),
        min_length: map.get("min_length").and_then(Value::as_u64),
        max_length: map.get("max_length").and_then(Value::as_u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_wire_round_trip() {
        let node = SchemaNode::int_field("an age").with_constraints(Constraints {
            ge: Some(0.0),
            le: Some(120.0),
            ..Default::default()
        });
        let value = node.to_value();
        assert_eq!(value["type"], "int");
        assert_eq!(value["ge"], 0);
        assert_eq!(value["le"], 120);
        assert_eq!(SchemaNode::from_value(&value).unwrap(), node);
    }

    #[test]
    fn enum_wire_carries_choices() {
        let node = SchemaNode::enum_field("rain chance", ["low", "medium", "high"]);
        let value = node.to_value();
        assert_eq!(value["choices"], json!(["low", "medium", "high"]));
        assert_eq!(SchemaNode::from_value(&value).unwrap(), node);
    }

    #[test]
    fn list_wire_distinguishes_element_shapes() {
        let primitive = SchemaNode::list_of(LeafKind::Int, "hourly index");
        assert_eq!(primitive.to_value()["elements"], "int");

        let complex = SchemaNode::List {
            description: "items".into(),
            constraints: Constraints::default(),
            elements: ListElements::Fields(vec![("id".into(), SchemaNode::int_field("item id"))]),
        };
        let value = complex.to_value();
        assert_eq!(value["elements"]["id"]["type"], "int");
        assert_eq!(SchemaNode::from_value(&value).unwrap(), complex);
    }

    #[test]
    fn whole_constraints_render_without_decimals() {
        assert_eq!(format_number(-20.0), "-20");
        assert_eq!(format_number(60.0), "60");
        assert_eq!(format_number(0.5), "0.5");
    }
}
