//! Domain entities held by the store.

mod concept;
mod ids;
mod patient;
mod program;

pub use concept::{Concept, ConceptMapping, ConceptSource, MappingReference};
pub(crate) use ids::next_key;
pub use ids::{
    ConceptId, ConceptSourceId, EncounterId, EntityId, LocationId, PatientId, PatientProgramId,
    PatientStateId, ProgramId, ProviderId, StateId, WorkflowId,
};
pub use patient::{Encounter, Location, Patient, Provider};
pub use program::{
    PatientProgram, PatientState, Program, ProgramWorkflow, ProgramWorkflowState,
};

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}
