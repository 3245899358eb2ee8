//! Form template markup support.
//!
//! This crate is responsible for turning the text of an HTML form template into a node tree
//! that the form engine can walk. It knows nothing about patients, programs or widgets; tag
//! semantics live in `formentry-core`. This crate handles syntax only:
//! - elements, attributes, comments and text
//! - HTML void elements and raw-text elements (`script`, `style`)
//! - a small set of character entities in attribute values
//! - escaping helpers for rendering
//!
//! A template must have a single `<htmlform>` root element.

mod escape;
mod node;
mod parser;

pub use escape::{decode_entities, escape_attribute, escape_text};
pub use node::{Attribute, Element, Node, Position};
pub use parser::FormTemplate;

/// Name of the required root element.
pub const ROOT_ELEMENT: &str = "htmlform";

/// Errors returned by the markup parser.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("unterminated tag starting at {0}")]
    UnterminatedTag(Position),

    #[error("unterminated comment starting at {0}")]
    UnterminatedComment(Position),

    #[error("unterminated attribute value at {0}")]
    UnterminatedAttribute(Position),

    #[error("invalid element or attribute name at {0}")]
    InvalidName(Position),

    #[error("duplicate attribute '{name}' at {position}")]
    DuplicateAttribute { name: String, position: Position },

    #[error("closing tag </{found}> at {position} does not match <{expected}>")]
    MismatchedClosingTag {
        expected: String,
        found: String,
        position: Position,
    },

    #[error("closing tag </{found}> at {position} has no matching opening tag")]
    UnexpectedClosingTag { found: String, position: Position },

    #[error("element <{name}> opened at {position} is never closed")]
    UnclosedElement { name: String, position: Position },

    #[error("template has no <htmlform> root element")]
    MissingRoot,

    #[error("root element must be <htmlform>, found <{0}>")]
    UnexpectedRoot(String),

    #[error("content outside the <htmlform> root at {0}")]
    ContentOutsideRoot(Position),
}

/// Type alias for Results that can fail with a [`MarkupError`].
pub type MarkupResult<T> = Result<T, MarkupError>;
