//! Turns identifier references written in template attributes into entities.
//!
//! A reference is tried, in order, as an integer id, a canonical uuid and a `SOURCE:CODE`
//! concept mapping. Programs may also be named.

use crate::dataset::Dataset;
use crate::model::{MappingReference, Program, ProgramWorkflow, ProgramWorkflowState, StateId};
use crate::{FormEntryError, FormEntryResult};
use formentry_uuid::EntityUuid;

enum Reference<'a> {
    Id(u32),
    Uuid(EntityUuid),
    Mapping(MappingReference<'a>),
    Other(&'a str),
}

fn classify(reference: &str) -> Reference<'_> {
    let reference = reference.trim();
    if let Ok(id) = reference.parse::<u32>() {
        return Reference::Id(id);
    }
    if let Ok(uuid) = EntityUuid::parse(reference) {
        return Reference::Uuid(uuid);
    }
    match MappingReference::parse(reference) {
        Some(mapping) => Reference::Mapping(mapping),
        None => Reference::Other(reference),
    }
}

pub(crate) fn resolve_program<'a>(
    dataset: &'a Dataset,
    reference: &str,
) -> FormEntryResult<&'a Program> {
    let found = match classify(reference) {
        Reference::Id(id) => dataset.program(crate::model::ProgramId(id)),
        Reference::Uuid(uuid) => dataset.program_by_uuid(uuid),
        Reference::Mapping(mapping) => dataset
            .concepts_by_mapping(mapping.source, mapping.code)
            .find_map(|concept| dataset.programs.values().find(|p| p.concept == concept.id))
            .or_else(|| dataset.program_by_name(reference)),
        Reference::Other(name) => dataset.program_by_name(name),
    };
    found.ok_or_else(|| FormEntryError::UnknownProgram(reference.trim().to_string()))
}

/// Resolves a state within `program`.
pub(crate) fn resolve_state<'a>(
    dataset: &Dataset,
    program: &'a Program,
    reference: &str,
) -> FormEntryResult<(&'a ProgramWorkflow, &'a ProgramWorkflowState)> {
    let found = match classify(reference) {
        Reference::Id(id) => program.state(StateId(id)),
        Reference::Uuid(uuid) => program.states().find(|(_, s)| s.uuid == uuid),
        Reference::Mapping(mapping) => dataset
            .concepts_by_mapping(mapping.source, mapping.code)
            .find_map(|concept| program.states().find(|(_, s)| s.concept == concept.id)),
        Reference::Other(_) => None,
    };
    found.ok_or_else(|| FormEntryError::UnknownState {
        program: program.id,
        reference: reference.trim().to_string(),
    })
}

pub(crate) fn resolve_workflow<'a>(
    dataset: &'a Dataset,
    reference: &str,
) -> FormEntryResult<(&'a Program, &'a ProgramWorkflow)> {
    let found = match classify(reference) {
        Reference::Id(id) => dataset.workflow(crate::model::WorkflowId(id)),
        Reference::Uuid(uuid) => dataset.workflow_by_uuid(uuid),
        Reference::Mapping(_) | Reference::Other(_) => None,
    };
    found.ok_or_else(|| FormEntryError::UnknownWorkflow(reference.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProgramId, WorkflowId};

    const DATA: &str = r#"
concept_sources:
  - { id: 1, name: "SNOMED CT" }
concepts:
  - { id: 1, name: "HIV Program", mappings: [{ source: 1, code: "PROG" }] }
  - { id: 2, name: "Status" }
  - { id: 3, name: "Initial", mappings: [{ source: 1, code: "Test Code" }] }
programs:
  - id: 10
    name: "HIV Program"
    concept: 1
    workflows:
      - id: 100
        uuid: 72a90efc-5140-11e1-a3e3-00248140a5eb
        concept: 2
        states:
          - { id: 200, uuid: 0f7b5c6e-7e4b-4b8e-9c49-4a3bd4a8f200, concept: 3, initial: true }
"#;

    #[test]
    fn test_resolve_program_by_every_reference_kind() {
        let d = Dataset::parse(DATA).expect("dataset");
        for reference in ["10", " 10 ", "hiv program", "SNOMED CT:PROG"] {
            assert_eq!(
                resolve_program(&d, reference).expect(reference).id,
                ProgramId(10)
            );
        }
        assert!(matches!(
            resolve_program(&d, "99"),
            Err(FormEntryError::UnknownProgram(_))
        ));
    }

    #[test]
    fn test_resolve_state_by_id_uuid_and_mapping() {
        let d = Dataset::parse(DATA).expect("dataset");
        let program = d.program(ProgramId(10)).expect("program");
        for reference in [
            "200",
            "0f7b5c6e-7e4b-4b8e-9c49-4a3bd4a8f200",
            "SNOMED CT:Test Code",
        ] {
            let (workflow, state) = resolve_state(&d, program, reference).expect(reference);
            assert_eq!(workflow.id, WorkflowId(100));
            assert_eq!(state.id, StateId(200));
        }
        assert!(matches!(
            resolve_state(&d, program, "SNOMED CT:Other"),
            Err(FormEntryError::UnknownState { .. })
        ));
    }

    #[test]
    fn test_resolve_state_when_mapping_is_shared_with_another_concept() {
        let shared = r#"
concept_sources:
  - { id: 1, name: "SNOMED CT" }
concepts:
  - { id: 1, name: "HIV Program" }
  - { id: 2, name: "Status" }
  - { id: 3, name: "Unrelated", mappings: [{ source: 1, code: "Shared" }] }
  - { id: 4, name: "Initial", mappings: [{ source: 1, code: "Shared" }] }
programs:
  - id: 10
    name: "HIV Program"
    concept: 1
    workflows:
      - id: 100
        concept: 2
        states:
          - { id: 200, concept: 4, initial: true }
"#;
        let d = Dataset::parse(shared).expect("dataset");
        assert_eq!(d.concepts_by_mapping("SNOMED CT", "Shared").count(), 2);
        assert_eq!(
            d.concept_by_mapping("SNOMED CT", "Shared").map(|c| c.id.0),
            Some(3)
        );

        let program = d.program(ProgramId(10)).expect("program");
        let (_, state) = resolve_state(&d, program, "SNOMED CT:Shared").expect("mapped state");
        assert_eq!(state.id, StateId(200));
    }

    #[test]
    fn test_resolve_workflow() {
        let d = Dataset::parse(DATA).expect("dataset");
        let (program, workflow) =
            resolve_workflow(&d, "72a90efc-5140-11e1-a3e3-00248140a5eb").expect("by uuid");
        assert_eq!((program.id, workflow.id), (ProgramId(10), WorkflowId(100)));
        assert!(resolve_workflow(&d, "Status").is_err());
    }
}
