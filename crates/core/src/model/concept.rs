//! Terminology: concepts, concept sources and mappings.
//!
//! Only the slice needed to resolve a `SOURCE:CODE` reference in a form template to a concept,
//! and from there to a program or workflow state.

use super::ids::{ConceptId, ConceptSourceId};
use crate::NonEmptyText;
use formentry_uuid::EntityUuid;
use serde::{Deserialize, Serialize};

/// An external terminology, e.g. `SNOMED CT`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptSource {
    pub id: ConceptSourceId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub name: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hl7_code: Option<String>,
}

impl ConceptSource {
    /// True if `reference` names this source, by name or HL7 code, ignoring case.
    pub fn matches(&self, reference: &str) -> bool {
        self.name.eq_ignore_case(reference)
            || self
                .hl7_code
                .as_deref()
                .is_some_and(|code| code.eq_ignore_ascii_case(reference.trim()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConceptMapping {
    pub source: ConceptSourceId,
    pub code: NonEmptyText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Concept {
    pub id: ConceptId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub name: NonEmptyText,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<ConceptMapping>,
}

impl Concept {
    /// Codes are compared exactly; sources are compared by id.
    pub fn has_mapping(&self, source: ConceptSourceId, code: &str) -> bool {
        self.mappings
            .iter()
            .any(|m| m.source == source && m.code.as_str() == code.trim())
    }
}

/// A `SOURCE:CODE` reference as written in a template attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingReference<'a> {
    pub source: &'a str,
    pub code: &'a str,
}

impl<'a> MappingReference<'a> {
    /// Splits at the first `:`. Both halves must be non-blank.
    pub fn parse(reference: &'a str) -> Option<Self> {
        let (source, code) = reference.split_once(':')?;
        let (source, code) = (source.trim(), code.trim());
        if source.is_empty() || code.is_empty() {
            return None;
        }
        Some(Self { source, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_reference_splits_at_first_colon() {
        let reference = MappingReference::parse("SNOMED CT: Test Code").expect("valid reference");
        assert_eq!(reference.source, "SNOMED CT");
        assert_eq!(reference.code, "Test Code");
        assert_eq!(
            MappingReference::parse("LOCAL:a:b").map(|r| r.code),
            Some("a:b")
        );
    }

    #[test]
    fn mapping_reference_rejects_plain_ids() {
        assert!(MappingReference::parse("200").is_none());
        assert!(MappingReference::parse(":code").is_none());
        assert!(MappingReference::parse("SNOMED CT:").is_none());
    }

    #[test]
    fn source_matches_name_or_hl7_code() {
        let source = ConceptSource {
            id: ConceptSourceId(1),
            uuid: EntityUuid::new(),
            name: NonEmptyText::new("SNOMED CT").unwrap(),
            hl7_code: Some("SCT".into()),
        };
        assert!(source.matches("snomed ct"));
        assert!(source.matches("sct"));
        assert!(!source.matches("LOINC"));
    }
}
