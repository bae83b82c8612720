//! Prompt and instance rendering
//!
//! `to_prompt` produces the XML-like template embedded in prompts so the
//! model knows the expected shape. `to_xml` renders a populated instance
//! back to the same language; it is the round-trip partner of the parser.

use serde_json::Value;

use super::schema::{Constraints, Fields, LeafKind, ListElements, SchemaNode, format_number};
use super::StructuredResponse;

const INDENT: &str = "    ";

impl StructuredResponse {
    /// Render the definition as an XML-like prompt template.
    ///
    /// Every field element carries a `type` attribute; leaf bodies show the
    /// description as `[… - as a <type>]`; enums list their choices; lists
    /// show one `<li index='0'>` example followed by an `...` sentinel.
    pub fn to_prompt(&self) -> String {
        let root = self.root_tag();
        let mut lines = vec![format!("<{root}>")];
        for (name, node) in &self.definition {
            render_field(&mut lines, name, node, 1);
        }
        lines.push(format!("</{root}>"));
        lines.join("\n")
    }

    /// Render the populated instance as XML. Null-valued fields are
    /// omitted so a re-parse reproduces them as nulls.
    pub fn to_xml(&self) -> String {
        let root = self.root_tag();
        let Some(instance) = &self.instance else {
            return format!("<{root}>\n</{root}>");
        };
        let mut lines = vec![format!("<{root}>")];
        render_instance_fields(&mut lines, &self.definition, instance, 1);
        lines.push(format!("</{root}>"));
        lines.join("\n")
    }
}

fn attrs_to_str(attrs: &[(&str, String)]) -> String {
    attrs
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}='{v}'"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn constraint_attrs(constraints: &Constraints) -> Vec<(&'static str, String)> {
    constraints
        .entries()
        .into_iter()
        .map(|(_, attr, value)| (attr, format_number(value)))
        .collect()
}

fn render_field(lines: &mut Vec<String>, name: &str, node: &SchemaNode, indent: usize) {
    let pad = INDENT.repeat(indent);
    match node {
        SchemaNode::List {
            description,
            constraints,
            elements,
        } => {
            let elements_attr = match elements {
                ListElements::Primitive(kind) => kind.as_str().to_string(),
                ListElements::Fields(_) => "dict".to_string(),
            };
            let mut attrs = vec![
                ("type", "list".to_string()),
                ("elements", elements_attr.clone()),
                ("description", description.clone()),
            ];
            attrs.extend(constraint_attrs(constraints));
            lines.push(format!("{pad}<{name} {}>", attrs_to_str(&attrs)));
            lines.push(format!("{pad}{INDENT}<li index='0'>"));
            match elements {
                ListElements::Fields(fields) => {
                    for (sub_name, sub_node) in fields {
                        render_field(lines, sub_name, sub_node, indent + 2);
                    }
                }
                ListElements::Primitive(_) => {
                    lines.push(format!(
                        "{pad}{INDENT}{INDENT}[value here - as an {elements_attr}]"
                    ));
                }
            }
            lines.push(format!("{pad}{INDENT}</li>"));
            lines.push(format!("{pad}{INDENT}..."));
            lines.push(format!("{pad}</{name}>"));
        }
        SchemaNode::Dict { description, fields } => {
            let attrs = vec![
                ("type", "dict".to_string()),
                ("description", description.clone()),
            ];
            lines.push(format!("{pad}<{name} {}>", attrs_to_str(&attrs)));
            for (sub_name, sub_node) in fields {
                render_field(lines, sub_name, sub_node, indent + 1);
            }
            lines.push(format!("{pad}</{name}>"));
        }
        SchemaNode::Leaf {
            kind,
            description,
            constraints,
            choices,
        } => {
            let mut attrs = vec![("type", kind.as_str().to_string())];
            if *kind == LeafKind::Enum {
                attrs.push((
                    "choices",
                    serde_json::to_string(choices).expect("string list serializes"),
                ));
            }
            attrs.extend(constraint_attrs(constraints));
            let inner = if description.is_empty() {
                format!("[value here - as a {}]", kind.as_str())
            } else {
                format!("[{description} - as a {}]", kind.as_str())
            };
            lines.push(format!(
                "{pad}<{name} {}>{inner}</{name}>",
                attrs_to_str(&attrs)
            ));
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_instance_fields(lines: &mut Vec<String>, fields: &Fields, value: &Value, indent: usize) {
    for (name, node) in fields {
        match value.get(name) {
            Some(field_value) if !field_value.is_null() => {
                render_instance_field(lines, name, node, field_value, indent);
            }
            _ => {}
        }
    }
}

fn render_instance_field(
    lines: &mut Vec<String>,
    name: &str,
    node: &SchemaNode,
    value: &Value,
    indent: usize,
) {
    let pad = INDENT.repeat(indent);
    match node {
        SchemaNode::Leaf { .. } => {
            lines.push(format!("{pad}<{name}>{}</{name}>", value_to_text(value)));
        }
        SchemaNode::Dict { fields, .. } => {
            lines.push(format!("{pad}<{name}>"));
            render_instance_fields(lines, fields, value, indent + 1);
            lines.push(format!("{pad}</{name}>"));
        }
        SchemaNode::List { elements, .. } => {
            lines.push(format!("{pad}<{name}>"));
            let items = value.as_array().cloned().unwrap_or_default();
            for item in &items {
                match elements {
                    ListElements::Primitive(_) => {
                        lines.push(format!("{pad}{INDENT}<li>{}</li>", value_to_text(item)));
                    }
                    ListElements::Fields(fields) => {
                        lines.push(format!("{pad}{INDENT}<li>"));
                        render_instance_fields(lines, fields, item, indent + 2);
                        lines.push(format!("{pad}{INDENT}</li>"));
                    }
                }
            }
            lines.push(format!("{pad}</{name}>"));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::schema::Constraints;
    use super::*;

    fn weather_schema() -> StructuredResponse {
        let mut sr = StructuredResponse::new("WeatherPrognosis");
        sr.add_node("location", SchemaNode::str_field("The location of the weather forecast"))
            .unwrap();
        sr.add_node(
            "current_temperature",
            SchemaNode::float_field("The current temperature in degrees Celsius"),
        )
        .unwrap();
        sr.add_node(
            "rain_probability_timebound",
            SchemaNode::list_of_dicts("List of chances of rain"),
        )
        .unwrap();
        sr.add_node(
            "rain_probability_timebound.chance",
            SchemaNode::enum_field("The chance of rain", ["low", "medium", "high"]),
        )
        .unwrap();
        sr.add_node(
            "rain_probability_timebound.when",
            SchemaNode::str_field("The time of day"),
        )
        .unwrap();
        sr.add_node(
            "hourly_index",
            SchemaNode::list_of(LeafKind::Int, "List of hourly UV index"),
        )
        .unwrap();
        sr.add_node(
            "high",
            SchemaNode::float_field("The high temperature in degrees Celsius").with_constraints(
                Constraints {
                    ge: Some(-20.0),
                    le: Some(60.0),
                    ..Default::default()
                },
            ),
        )
        .unwrap();
        sr.add_node("storm_tonight", SchemaNode::bool_field("Whether there will be a storm"))
            .unwrap();
        sr
    }

    #[test]
    fn root_tag_is_snake_case() {
        let prompt = weather_schema().to_prompt();
        assert!(prompt.starts_with("<weather_prognosis>"));
        assert!(prompt.ends_with("</weather_prognosis>"));
    }

    #[test]
    fn leaf_descriptions_are_bracketed_with_type() {
        let prompt = weather_schema().to_prompt();
        assert!(prompt.contains(
            "<location type='str'>[The location of the weather forecast - as a str]</location>"
        ));
        assert!(prompt.contains("[The current temperature in degrees Celsius - as a float]"));
        assert!(prompt.contains("[Whether there will be a storm - as a bool]"));
    }

    #[test]
    fn missing_description_uses_value_here() {
        let mut sr = StructuredResponse::new("Bare");
        sr.add_node("field", SchemaNode::str_field("")).unwrap();
        assert!(sr.to_prompt().contains("<field type='str'>[value here - as a str]</field>"));
    }

    #[test]
    fn enum_renders_json_choices() {
        let prompt = weather_schema().to_prompt();
        assert!(prompt.contains(r#"choices='["low","medium","high"]'"#));
    }

    #[test]
    fn constraints_use_human_names() {
        let prompt = weather_schema().to_prompt();
        assert!(prompt.contains("greater_or_equal='-20'"));
        assert!(prompt.contains("less_or_equal='60'"));
    }

    #[test]
    fn lists_show_example_item_and_sentinel() {
        let prompt = weather_schema().to_prompt();
        assert!(prompt.contains("<rain_probability_timebound type='list' elements='dict'"));
        assert!(prompt.contains("<hourly_index type='list' elements='int'"));
        assert!(prompt.contains("<li index='0'>"));
        assert!(prompt.contains("[value here - as an int]"));
        let sentinel_count = prompt.matches("...").count();
        assert_eq!(sentinel_count, 2);
    }

    #[test]
    fn every_field_element_has_type_attribute() {
        let prompt = weather_schema().to_prompt();
        for line in prompt.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('<')
                && !trimmed.starts_with("</")
                && !trimmed.starts_with("<li")
                && !trimmed.starts_with("<weather_prognosis")
            {
                assert!(trimmed.contains("type='"), "missing type attr on: {trimmed}");
            }
        }
    }

    #[test]
    fn instance_rendering_skips_null_fields() {
        let mut sr = weather_schema();
        sr.instance = Some(json!({
            "location": "Annecy, FR",
            "current_temperature": 18.7,
            "rain_probability_timebound": null,
            "hourly_index": [3, 4],
            "high": null,
            "storm_tonight": false
        }));
        let xml = sr.to_xml();
        assert!(xml.contains("<location>Annecy, FR</location>"));
        assert!(xml.contains("<li>3</li>"));
        assert!(xml.contains("<storm_tonight>false</storm_tonight>"));
        assert!(!xml.contains("rain_probability_timebound"));
        assert!(!xml.contains("<high>"));
    }

    #[test]
    fn empty_instance_renders_bare_root() {
        let sr = StructuredResponse::new("WeatherPrognosis");
        assert_eq!(sr.to_xml(), "<weather_prognosis>\n</weather_prognosis>");
    }
}
