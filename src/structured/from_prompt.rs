//! Best-effort parsing of LLM output
//!
//! LLM output is XML-shaped, not XML: tags go unclosed, closing tags get
//! garbled, attribute junk appears everywhere, and literal tag-like
//! fragments show up inside string values. The parser therefore never
//! validates. A regex lexer slices the root span into open/close/
//! self-closing/text events (keeping each event's raw source), and a
//! stack-style builder walks the events guided by the declared schema:
//! unknown children are skipped, expected children that never appear stay
//! null, and markup inside a declared leaf is kept as literal text.
//!
//! Only type coercion is strict: a declared int or float field whose text
//! does not parse is an error; everything structural is tolerated.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::schema::{Fields, LeafKind, ListElements, SchemaNode};
use super::{StructuredResponse, coerce_text};
use crate::utils::error::{LlmError, Result};

impl StructuredResponse {
    /// Parse raw model text and populate `instance`.
    ///
    /// Tolerates prose around the root element and the malformations
    /// described in the module docs. Failures carry the offending text and
    /// the target class name.
    pub fn from_prompt(&mut self, text: &str) -> Result<()> {
        if self.definition.is_empty() {
            return Err(LlmError::structured_response(
                "definition not initialized",
                text,
                self.class_name.clone(),
            ));
        }
        match parse_instance(&self.root_tag(), &self.definition, text) {
            Ok(instance) => {
                self.instance = Some(instance);
                Ok(())
            }
            Err(message) => Err(LlmError::structured_response(
                message,
                text,
                self.class_name.clone(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EventKind<'a> {
    Open(&'a str),
    Close(&'a str),
    SelfClose(&'a str),
    Text,
}

#[derive(Debug, Clone, Copy)]
struct Event<'a> {
    kind: EventKind<'a>,
    /// Exact source slice, used to preserve stray markup literally
    raw: &'a str,
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<\s*(/?)\s*([A-Za-z_][A-Za-z0-9_.:-]*)((?:[^>"']|"[^"]*"|'[^']*')*?)(/?)\s*>"#)
        .expect("valid tag regex")
});

/// Slice the span into events; anything that is not a well-formed tag
/// stays text.
fn lex(span: &str) -> Vec<Event<'_>> {
    let mut events = Vec::new();
    let mut last_end = 0;
    for captures in TAG_RE.captures_iter(span) {
        let whole = captures.get(0).expect("match");
        if whole.start() > last_end {
            events.push(Event {
                kind: EventKind::Text,
                raw: &span[last_end..whole.start()],
            });
        }
        let name = captures.get(2).expect("name").as_str();
        let is_close = !captures.get(1).expect("slash").as_str().is_empty();
        let is_self_close = !captures.get(4).expect("slash").as_str().is_empty();
        let kind = if is_close {
            EventKind::Close(name)
        } else if is_self_close {
            EventKind::SelfClose(name)
        } else {
            EventKind::Open(name)
        };
        events.push(Event {
            kind,
            raw: whole.as_str(),
        });
        last_end = whole.end();
    }
    if last_end < span.len() {
        events.push(Event {
            kind: EventKind::Text,
            raw: &span[last_end..],
        });
    }
    events
}

struct Parser<'a> {
    events: Vec<Event<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Event<'a>> {
        self.events.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

fn find_root_start(text: &str, root_tag: &str) -> Option<usize> {
    let pattern = format!("<{root_tag}");
    let mut from = 0;
    while let Some(offset) = text[from..].find(&pattern) {
        let start = from + offset;
        let after = start + pattern.len();
        let at_boundary = text[after..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        if at_boundary {
            return Some(start);
        }
        from = start + 1;
    }
    None
}

fn parse_instance(root_tag: &str, fields: &Fields, text: &str) -> std::result::Result<Value, String> {
    let start = find_root_start(text, root_tag)
        .ok_or_else(|| format!("root tag <{root_tag}> not found in output"))?;
    let close_pattern = format!("</{root_tag}>");
    let end = text
        .rfind(&close_pattern)
        .filter(|&end| end > start)
        .ok_or_else(|| format!("closing tag {close_pattern} not found in output"))?;
    let span = &text[start..end + close_pattern.len()];

    let mut parser = Parser {
        events: lex(span),
        pos: 0,
    };

    // Step over the root opener; attribute junk on it is already ignored
    // by the lexer.
    loop {
        match parser.peek() {
            Some(event) => {
                parser.advance();
                if event.kind == EventKind::Open(root_tag) {
                    break;
                }
            }
            None => return Err(format!("root tag <{root_tag}> not found in output")),
        }
    }

    parse_fields(&mut parser, root_tag, &[], fields, None)
}

/// Parse the children of a container. Declared fields start as null;
/// unknown opens are skipped; a close of an enclosing container returns
/// without consuming so the ancestor can finish its own scope.
fn parse_fields(
    parser: &mut Parser<'_>,
    container: &str,
    ancestors: &[&str],
    fields: &Fields,
    stop_on_open: Option<&str>,
) -> std::result::Result<Value, String> {
    let declared: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
    let mut map = Map::new();
    for (name, _) in fields {
        map.insert(name.clone(), Value::Null);
    }

    while let Some(event) = parser.peek() {
        match event.kind {
            EventKind::Text => parser.advance(),
            EventKind::SelfClose(_) => parser.advance(),
            EventKind::Close(name) => {
                if name == container {
                    parser.advance();
                    break;
                }
                if ancestors.contains(&name) {
                    break;
                }
                parser.advance();
            }
            EventKind::Open(name) => {
                if stop_on_open == Some(name) {
                    break;
                }
                match fields.iter().find(|(field, _)| field == name) {
                    Some((_, node)) => {
                        parser.advance();
                        let value = parse_node(parser, name, node, &declared, container, ancestors)?;
                        map.insert(name.to_string(), value);
                    }
                    None => {
                        parser.advance();
                        skip_unknown(parser, name, container, ancestors);
                    }
                }
            }
        }
    }
    Ok(Value::Object(map))
}

fn parse_node(
    parser: &mut Parser<'_>,
    name: &str,
    node: &SchemaNode,
    siblings: &[&str],
    container: &str,
    ancestors: &[&str],
) -> std::result::Result<Value, String> {
    match node {
        SchemaNode::Leaf { kind, .. } => {
            parse_leaf(parser, name, *kind, siblings, container, ancestors)
        }
        SchemaNode::Dict { fields, .. } => {
            let mut inner = ancestors.to_vec();
            inner.push(container);
            parse_fields(parser, name, &inner, fields, None)
        }
        SchemaNode::List { elements, .. } => {
            let mut inner = ancestors.to_vec();
            inner.push(container);
            parse_list(parser, name, elements, &inner)
        }
    }
}

/// Collect leaf text. Closure comes from the matching close tag, a repeat
/// of the same opening tag (garbled close), the opening tag of a declared
/// sibling (unclosed leaf), or the close of an enclosing container. Any
/// other markup is literal content.
fn parse_leaf(
    parser: &mut Parser<'_>,
    name: &str,
    kind: LeafKind,
    siblings: &[&str],
    container: &str,
    ancestors: &[&str],
) -> std::result::Result<Value, String> {
    let mut buffer = String::new();
    while let Some(event) = parser.peek() {
        match event.kind {
            EventKind::Close(n) if n == name => {
                parser.advance();
                break;
            }
            EventKind::Close(n) if n == container || ancestors.contains(&n) => break,
            EventKind::Open(n) if n == name => {
                parser.advance();
                break;
            }
            EventKind::Open(n) if siblings.contains(&n) => break,
            _ => {
                buffer.push_str(event.raw);
                parser.advance();
            }
        }
    }
    coerce_text(kind, &buffer).map_err(|e| format!("field '{name}': {e}"))
}

fn parse_list(
    parser: &mut Parser<'_>,
    name: &str,
    elements: &ListElements,
    ancestors: &[&str],
) -> std::result::Result<Value, String> {
    let mut items = Vec::new();
    while let Some(event) = parser.peek() {
        match event.kind {
            EventKind::Close(n) if n == name => {
                parser.advance();
                break;
            }
            EventKind::Close(n) if ancestors.contains(&n) => break,
            EventKind::Open("li") => {
                parser.advance();
                let mut inner = ancestors.to_vec();
                inner.push(name);
                match elements {
                    ListElements::Primitive(kind) => {
                        items.push(parse_li_primitive(parser, *kind, &inner)?);
                    }
                    ListElements::Fields(fields) => {
                        items.push(parse_fields(parser, "li", &inner, fields, Some("li"))?);
                    }
                }
            }
            EventKind::Open(n) => {
                parser.advance();
                skip_unknown(parser, n, name, ancestors);
            }
            _ => parser.advance(),
        }
    }
    Ok(Value::Array(items))
}

/// One primitive list item; a following `<li>` implies closure of the
/// current one.
fn parse_li_primitive(
    parser: &mut Parser<'_>,
    kind: LeafKind,
    ancestors: &[&str],
) -> std::result::Result<Value, String> {
    let mut buffer = String::new();
    while let Some(event) = parser.peek() {
        match event.kind {
            EventKind::Close("li") => {
                parser.advance();
                break;
            }
            EventKind::Close(n) if ancestors.contains(&n) => break,
            EventKind::Open("li") => break,
            _ => {
                buffer.push_str(event.raw);
                parser.advance();
            }
        }
    }
    coerce_text(kind, &buffer).map_err(|e| format!("list item: {e}"))
}

/// Step over an undeclared subtree; bail without consuming when an
/// enclosing container closes first (the unknown tag was never closed).
fn skip_unknown(parser: &mut Parser<'_>, name: &str, container: &str, ancestors: &[&str]) {
    let mut depth = 1usize;
    while let Some(event) = parser.peek() {
        match event.kind {
            EventKind::Open(n) if n == name => {
                depth += 1;
                parser.advance();
            }
            EventKind::Close(n) if n == name => {
                depth -= 1;
                parser.advance();
                if depth == 0 {
                    return;
                }
            }
            EventKind::Close(n) if n == container || ancestors.contains(&n) => return,
            _ => parser.advance(),
        }
    }
}
