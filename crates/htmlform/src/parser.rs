//! Template tokeniser and tree builder.

use crate::escape::decode_entities;
use crate::node::{is_raw_text_element, Attribute, Element, Node, Position};
use crate::{MarkupError, MarkupResult, ROOT_ELEMENT};

/// A parsed form template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormTemplate {
    root: Element,
}

impl FormTemplate {
    /// Parses template text.
    ///
    /// Whitespace, comments, a doctype or an XML declaration may surround the root element.
    /// Any other content outside `<htmlform>` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`MarkupError`] with the line and column of the offending construct.
    pub fn parse(text: &str) -> MarkupResult<Self> {
        Parser { text, pos: 0 }.parse_document()
    }

    /// The `<htmlform>` element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn children(&self) -> &[Node] {
        &self.root.children
    }

    /// All elements named `name`, in document order.
    pub fn find_elements(&self, name: &str) -> Vec<&Element> {
        fn walk<'a>(nodes: &'a [Node], name: &str, out: &mut Vec<&'a Element>) {
            for node in nodes {
                if let Node::Element(el) = node {
                    if el.name == name {
                        out.push(el);
                    }
                    walk(&el.children, name, out);
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.root.children, name, &mut out);
        out
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_document(mut self) -> MarkupResult<FormTemplate> {
        let text = self.text;
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        while self.pos < text.len() {
            let start = self.pos;
            let rest = &text[start..];

            if let Some(body) = rest.strip_prefix("<!--") {
                let end = body
                    .find("-->")
                    .ok_or_else(|| MarkupError::UnterminatedComment(self.position(start)))?;
                let comment = body[..end].to_string();
                self.pos = start + 4 + end + 3;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Comment(comment));
                }
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest
                    .find('>')
                    .ok_or_else(|| MarkupError::UnterminatedTag(self.position(start)))?;
                self.pos = start + end + 1;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(rest[..=end].to_string()));
                }
            } else if rest.starts_with("</") {
                self.pos += 2;
                let name = self.parse_name()?;
                self.skip_whitespace();
                if !self.eat('>') {
                    return Err(MarkupError::UnterminatedTag(self.position(start)));
                }
                let open = stack.pop().ok_or_else(|| MarkupError::UnexpectedClosingTag {
                    found: name.clone(),
                    position: self.position(start),
                })?;
                if open.name != name {
                    return Err(MarkupError::MismatchedClosingTag {
                        expected: open.name,
                        found: name,
                        position: self.position(start),
                    });
                }
                self.attach(open, &mut stack, &mut root, start)?;
            } else if starts_element(rest) {
                self.pos += 1;
                let name = self.parse_name()?;
                let (attributes, self_closing) = self.parse_attributes(start)?;
                let mut element = Element::new(name, attributes, self.position(start));

                if self_closing || element.is_void() {
                    self.attach(element, &mut stack, &mut root, start)?;
                } else if is_raw_text_element(&element.name) {
                    let close = format!("</{}", element.name);
                    let body_start = self.pos;
                    let end = text[body_start..].find(&close).ok_or_else(|| {
                        MarkupError::UnclosedElement {
                            name: element.name.clone(),
                            position: element.position,
                        }
                    })?;
                    element
                        .children
                        .push(Node::Text(text[body_start..body_start + end].to_string()));
                    self.pos = body_start + end + close.len();
                    self.skip_whitespace();
                    if !self.eat('>') {
                        return Err(MarkupError::UnterminatedTag(
                            self.position(body_start + end),
                        ));
                    }
                    self.attach(element, &mut stack, &mut root, start)?;
                } else {
                    stack.push(element);
                }
            } else {
                let end = next_markup(rest);
                let run = &rest[..end];
                self.pos = start + end;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Text(run.to_string())),
                    None if run.trim().is_empty() => {}
                    None => return Err(MarkupError::ContentOutsideRoot(self.position(start))),
                }
            }
        }

        if let Some(open) = stack.pop() {
            return Err(MarkupError::UnclosedElement {
                name: open.name,
                position: open.position,
            });
        }

        root.map(|root| FormTemplate { root })
            .ok_or(MarkupError::MissingRoot)
    }

    fn attach(
        &self,
        element: Element,
        stack: &mut [Element],
        root: &mut Option<Element>,
        start: usize,
    ) -> MarkupResult<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => {
                if root.is_some() {
                    return Err(MarkupError::ContentOutsideRoot(self.position(start)));
                }
                if element.name != ROOT_ELEMENT {
                    return Err(MarkupError::UnexpectedRoot(element.name));
                }
                *root = Some(element);
            }
        }
        Ok(())
    }

    fn parse_name(&mut self) -> MarkupResult<String> {
        let rest = &self.text[self.pos..];
        if !rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            return Err(MarkupError::InvalidName(self.position(self.pos)));
        }
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')))
            .unwrap_or(rest.len());
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    /// Parses attributes up to and including `>` or `/>`.
    ///
    /// Returns the attributes and whether the tag was self-closing.
    fn parse_attributes(&mut self, tag_start: usize) -> MarkupResult<(Vec<Attribute>, bool)> {
        let mut attributes: Vec<Attribute> = Vec::new();

        loop {
            self.skip_whitespace();
            let rest = &self.text[self.pos..];
            if rest.is_empty() {
                return Err(MarkupError::UnterminatedTag(self.position(tag_start)));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok((attributes, true));
            }
            if self.eat('>') {
                return Ok((attributes, false));
            }

            let attr_start = self.pos;
            let name = self.parse_name()?;
            self.skip_whitespace();
            let value = if self.eat('=') {
                self.skip_whitespace();
                self.parse_attribute_value()?
            } else {
                String::new()
            };

            if attributes.iter().any(|a| a.name == name) {
                return Err(MarkupError::DuplicateAttribute {
                    name,
                    position: self.position(attr_start),
                });
            }
            attributes.push(Attribute { name, value });
        }
    }

    fn parse_attribute_value(&mut self) -> MarkupResult<String> {
        let value_start = self.pos;
        let rest = &self.text[value_start..];

        if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let body = &rest[1..];
            let end = body
                .find(quote)
                .ok_or_else(|| MarkupError::UnterminatedAttribute(self.position(value_start)))?;
            self.pos = value_start + 1 + end + 1;
            return Ok(decode_entities(&body[..end]));
        }

        let len = rest
            .find(|c: char| c.is_whitespace() || c == '>')
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(MarkupError::UnterminatedAttribute(self.position(value_start)));
        }
        self.pos += len;
        Ok(decode_entities(&rest[..len]))
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.pos..];
        let len = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        self.pos += len;
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.text[self.pos..].starts_with(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn position(&self, offset: usize) -> Position {
        Position::at(self.text, offset)
    }
}

fn starts_element(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('<') && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Byte offset of the next `<` that opens markup, or the end of `rest`.
///
/// A `<` followed by anything else (for example `a < b`) is ordinary text.
fn next_markup(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut from = 0;
    while let Some(offset) = rest[from..].find('<') {
        let at = from + offset;
        match bytes.get(at + 1) {
            Some(b) if b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?') => return at,
            _ => from = at + 1,
        }
    }
    rest.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENROLL_FORM: &str = r#"<htmlform>
    Enrollment Date: <enrollInProgram programId="10" showDate="true" stateIds="200" />
    <br>
    Encounter Date: <encounterDate/>
    <submit/>
</htmlform>"#;

    #[test]
    fn parses_enrollment_form() {
        let template = FormTemplate::parse(ENROLL_FORM).expect("should parse");
        assert_eq!(template.root().name, "htmlform");

        let tags = template.find_elements("enrollInProgram");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].attribute("programId"), Some("10"));
        assert_eq!(tags[0].attribute("showDate"), Some("true"));
        assert_eq!(tags[0].attribute("stateIds"), Some("200"));
        assert_eq!(tags[0].position, Position { line: 2, column: 22 });

        assert_eq!(template.find_elements("br").len(), 1);
        assert_eq!(template.find_elements("submit").len(), 1);
    }

    #[test]
    fn keeps_text_and_nesting() {
        let template =
            FormTemplate::parse("<htmlform><p class='x'>Hello <b>there</b></p></htmlform>")
                .expect("should parse");
        let p = template.find_elements("p")[0];
        assert_eq!(p.attribute("class"), Some("x"));
        assert_eq!(p.text_content(), "Hello there");
        assert_eq!(p.start_tag(), "<p class=\"x\">");
    }

    #[test]
    fn decodes_attribute_entities_and_bare_values() {
        let template = FormTemplate::parse(
            r#"<htmlform><enrollInProgram programId=10 stateIds="SNOMED CT:A&amp;B" showDate/></htmlform>"#,
        )
        .expect("should parse");
        let tag = template.find_elements("enrollInProgram")[0];
        assert_eq!(tag.attribute("programId"), Some("10"));
        assert_eq!(tag.attribute("stateIds"), Some("SNOMED CT:A&B"));
        assert_eq!(tag.attribute("showDate"), Some(""));
    }

    #[test]
    fn script_content_is_raw_text() {
        let template = FormTemplate::parse(
            "<htmlform><script>if (a < b && c > d) { go(); }</script></htmlform>",
        )
        .expect("should parse");
        let script = template.find_elements("script")[0];
        assert_eq!(
            script.children,
            vec![Node::Text("if (a < b && c > d) { go(); }".into())]
        );
    }

    #[test]
    fn lone_less_than_is_text() {
        let template = FormTemplate::parse("<htmlform>a < b</htmlform>").expect("should parse");
        assert_eq!(template.children(), &[Node::Text("a < b".into())]);
    }

    #[test]
    fn allows_comments_and_doctype_around_root() {
        let template = FormTemplate::parse(
            "<?xml version=\"1.0\"?>\n<!-- intro -->\n<htmlform><!-- inner --></htmlform>\n",
        )
        .expect("should parse");
        assert_eq!(template.children(), &[Node::Comment(" inner ".into())]);
    }

    #[test]
    fn rejects_mismatched_closing_tag() {
        let err = FormTemplate::parse("<htmlform>\n<p><b></p></htmlform>").expect_err("mismatch");
        assert_eq!(
            err,
            MarkupError::MismatchedClosingTag {
                expected: "b".into(),
                found: "p".into(),
                position: Position { line: 2, column: 7 },
            }
        );
    }

    #[test]
    fn rejects_unclosed_element() {
        let err = FormTemplate::parse("<htmlform><div>").expect_err("unclosed");
        assert!(matches!(err, MarkupError::UnclosedElement { name, .. } if name == "div"));
    }

    #[test]
    fn rejects_unexpected_closing_tag() {
        let err = FormTemplate::parse("<htmlform></htmlform></div>").expect_err("stray close");
        assert!(matches!(err, MarkupError::UnexpectedClosingTag { found, .. } if found == "div"));
    }

    #[test]
    fn rejects_wrong_or_missing_root() {
        assert_eq!(
            FormTemplate::parse("<form></form>").expect_err("wrong root"),
            MarkupError::UnexpectedRoot("form".into())
        );
        assert_eq!(
            FormTemplate::parse("  <!-- nothing -->  ").expect_err("no root"),
            MarkupError::MissingRoot
        );
    }

    #[test]
    fn rejects_text_outside_root() {
        let err = FormTemplate::parse("hello <htmlform></htmlform>").expect_err("outside root");
        assert_eq!(
            err,
            MarkupError::ContentOutsideRoot(Position { line: 1, column: 1 })
        );
        let err =
            FormTemplate::parse("<htmlform></htmlform><htmlform></htmlform>").expect_err("two roots");
        assert!(matches!(err, MarkupError::ContentOutsideRoot(_)));
    }

    #[test]
    fn rejects_duplicate_attribute() {
        let err = FormTemplate::parse(r#"<htmlform><submit a="1" a="2"/></htmlform>"#)
            .expect_err("duplicate");
        assert!(matches!(err, MarkupError::DuplicateAttribute { name, .. } if name == "a"));
    }

    #[test]
    fn rejects_unterminated_constructs() {
        assert!(matches!(
            FormTemplate::parse("<htmlform><submit").expect_err("tag"),
            MarkupError::UnterminatedTag(_)
        ));
        assert!(matches!(
            FormTemplate::parse("<htmlform><!-- oops</htmlform>").expect_err("comment"),
            MarkupError::UnterminatedComment(_)
        ));
        assert!(matches!(
            FormTemplate::parse(r#"<htmlform><submit a="1/></htmlform>"#).expect_err("attr"),
            MarkupError::UnterminatedAttribute(_)
        ));
    }
}
