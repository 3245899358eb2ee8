//! Concepts and their terminology mappings.

use crate::dataset::Dataset;
use crate::model::{Concept, ConceptId, ConceptMapping, ConceptSource};
use crate::store::DataStore;
use crate::{FormEntryError, FormEntryResult, NonEmptyText};

impl Dataset {
    /// Finds a concept source by name or HL7 code.
    pub fn concept_source_by_name(&self, name: &str) -> Option<&ConceptSource> {
        self.concept_sources.values().find(|s| s.matches(name))
    }

    /// Finds the first concept mapped to `code` in the source named `source`.
    pub fn concept_by_mapping<'a>(&'a self, source: &str, code: &'a str) -> Option<&'a Concept> {
        self.concepts_by_mapping(source, code).next()
    }

    /// Every concept mapped to `code` in the source named `source`, in id order.
    pub fn concepts_by_mapping<'a>(
        &'a self,
        source: &str,
        code: &'a str,
    ) -> impl Iterator<Item = &'a Concept> + 'a {
        let source = self.concept_source_by_name(source).map(|s| s.id);
        self.concepts
            .values()
            .filter(move |c| source.is_some_and(|id| c.has_mapping(id, code)))
    }
}

#[derive(Clone, Debug)]
pub struct ConceptRepository {
    store: DataStore,
}

impl ConceptRepository {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    pub fn get_concept(&self, id: ConceptId) -> Option<Concept> {
        self.store.read(|d| d.concept(id).cloned())
    }

    pub fn get_concept_source_by_name(&self, name: &str) -> Option<ConceptSource> {
        self.store.read(|d| d.concept_source_by_name(name).cloned())
    }

    pub fn get_concept_by_mapping(&self, code: &str, source_name: &str) -> Option<Concept> {
        self.store
            .read(|d| d.concept_by_mapping(source_name, code).cloned())
    }

    /// Maps `concept` to `code` in the named source. Adding an existing mapping does nothing.
    pub fn add_mapping(
        &self,
        concept: ConceptId,
        source_name: &str,
        code: &str,
    ) -> FormEntryResult<()> {
        let code = NonEmptyText::new(code)?;
        self.store.transaction(|d| {
            let source = d
                .concept_source_by_name(source_name)
                .map(|s| s.id)
                .ok_or_else(|| {
                    FormEntryError::InvalidInput(format!("unknown concept source '{source_name}'"))
                })?;
            let target = d.concepts.get_mut(&concept).ok_or_else(|| {
                FormEntryError::DanglingReference {
                    kind: "concept",
                    id: concept.to_string(),
                }
            })?;
            if !target.has_mapping(source, code.as_str()) {
                target.mappings.push(ConceptMapping {
                    source,
                    code: code.clone(),
                });
                tracing::debug!(%concept, code = %code, "concept mapping added");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONCEPTS: &str = r#"
concept_sources:
  - { id: 1, name: "SNOMED CT", hl7_code: SCT }
concepts:
  - { id: 10002, name: "Initial state" }
"#;

    #[test]
    fn test_add_mapping_then_lookup() {
        let repo = ConceptRepository::new(DataStore::from_yaml(CONCEPTS).expect("store"));
        assert!(repo.get_concept_by_mapping("Test Code", "SNOMED CT").is_none());

        repo.add_mapping(ConceptId(10002), "SNOMED CT", "Test Code")
            .expect("add mapping");
        repo.add_mapping(ConceptId(10002), "sct", "Test Code")
            .expect("idempotent");

        let concept = repo
            .get_concept_by_mapping("Test Code", "snomed ct")
            .expect("mapped concept");
        assert_eq!(concept.id, ConceptId(10002));
        assert_eq!(concept.mappings.len(), 1);
    }

    #[test]
    fn test_add_mapping_rejects_unknown_source() {
        let repo = ConceptRepository::new(DataStore::from_yaml(CONCEPTS).expect("store"));
        let err = repo
            .add_mapping(ConceptId(10002), "LOINC", "1234-5")
            .expect_err("unknown source");
        assert!(matches!(err, FormEntryError::InvalidInput(_)));
        assert!(repo.get_concept_source_by_name("SCT").is_some());
    }
}
