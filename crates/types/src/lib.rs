//! Validated text primitives shared across the form entry crates.
//!
//! Form templates carry most of their configuration as attribute strings. The types in this
//! crate turn those strings into values that cannot be empty or malformed once constructed:
//! - [`NonEmptyText`] for names and codes
//! - [`ReferenceList`] for comma-separated identifier attributes such as `stateIds="200,201"`
//! - [`parse_flag`] for boolean attributes such as `showDate="true"`

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("text cannot be empty")]
    Empty,

    /// A comma-separated list contained an empty entry (for example `"200,,201"`)
    #[error("reference list contains an empty entry at position {0}")]
    EmptyEntry(usize),

    /// A boolean flag was not `true` or `false`
    #[error("expected 'true' or 'false', got '{0}'")]
    InvalidFlag(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText`, returning [`TextError::Empty`] when the trimmed input is
    /// empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison, used for matching names typed into form templates.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for NonEmptyText {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// An ordered list of identifier references parsed from a comma-separated attribute.
///
/// Each entry is trimmed. The list itself may be empty (an absent or blank attribute), but
/// no individual entry may be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceList(Vec<NonEmptyText>);

impl ReferenceList {
    /// Parses `"200, 201"` into two references.
    ///
    /// A blank input yields an empty list. A dangling or doubled comma is rejected with the
    /// zero-based position of the empty entry.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        input
            .split(',')
            .enumerate()
            .map(|(position, entry)| {
                NonEmptyText::new(entry).map_err(|_| TextError::EmptyEntry(position))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NonEmptyText> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ReferenceList {
    type Item = &'a NonEmptyText;
    type IntoIter = std::slice::Iter<'a, NonEmptyText>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parses a boolean tag attribute. Matching is case-insensitive and whitespace-tolerant.
pub fn parse_flag(input: &str) -> Result<bool, TextError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(TextError::InvalidFlag(input.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  SNOMED CT ").expect("valid text");
        assert_eq!(text.as_str(), "SNOMED CT");
        assert!(text.eq_ignore_case("snomed ct"));
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new(" \t\n"), Err(TextError::Empty));
    }

    #[test]
    fn non_empty_text_deserialize_rejects_empty() {
        let err = serde_json::from_str::<NonEmptyText>("\"   \"").expect_err("should fail");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn reference_list_parses_entries_in_order() {
        let list = ReferenceList::parse(" 200, SNOMED CT:Test Code ,201").expect("valid list");
        let entries: Vec<&str> = list.iter().map(NonEmptyText::as_str).collect();
        assert_eq!(entries, vec!["200", "SNOMED CT:Test Code", "201"]);
    }

    #[test]
    fn reference_list_blank_is_empty() {
        assert!(ReferenceList::parse("   ").expect("blank is fine").is_empty());
    }

    #[test]
    fn reference_list_rejects_empty_entry() {
        assert_eq!(ReferenceList::parse("200,,201"), Err(TextError::EmptyEntry(1)));
        assert_eq!(ReferenceList::parse("200,"), Err(TextError::EmptyEntry(1)));
    }

    #[test]
    fn parse_flag_accepts_mixed_case() {
        assert_eq!(parse_flag("TRUE"), Ok(true));
        assert_eq!(parse_flag(" false "), Ok(false));
        assert!(matches!(parse_flag("yes"), Err(TextError::InvalidFlag(_))));
    }
}
