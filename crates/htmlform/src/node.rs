//! Template node tree.

use crate::escape::escape_attribute;
use std::fmt;

/// HTML elements that never have content or a closing tag.
const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// One-based line and column of a construct in the template text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Computes the position of byte offset `offset` within `text`.
    pub(crate) fn at(text: &str, offset: usize) -> Self {
        let before = &text[..offset.min(text.len())];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Entity-decoded value. Attributes written without a value hold an empty string.
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Raw text, exactly as written in the template.
    Text(String),
    Comment(String),
    Element(Element),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub position: Position,
}

impl Element {
    pub(crate) fn new(name: String, attributes: Vec<Attribute>, position: Position) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
            position,
        }
    }

    /// Returns the value of attribute `name`, matched exactly.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn is_void(&self) -> bool {
        is_void_element(&self.name)
    }

    /// Serialises the opening tag, re-escaping attribute values.
    pub fn start_tag(&self) -> String {
        let mut out = format!("<{}", self.name);
        for attr in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", attr.name, escape_attribute(&attr.value)));
        }
        if self.is_void() {
            out.push_str("/>");
        } else {
            out.push('>');
        }
        out
    }

    /// Serialises the closing tag; void elements have none.
    pub fn end_tag(&self) -> String {
        if self.is_void() {
            String::new()
        } else {
            format!("</{}>", self.name)
        }
    }

    /// Concatenated raw text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
            Node::Comment(_) => {}
        }
    }
}

pub(crate) fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

pub(crate) fn is_raw_text_element(name: &str) -> bool {
    name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style")
}
