//! In-memory reference data and its YAML fixture format.
//!
//! A [`Dataset`] holds every entity the form engine reads or writes. Fixture files list the
//! entities per kind; loading a fixture merges it into a dataset, replacing entities by id.

use crate::model::{
    next_key, Concept, ConceptId, ConceptSource, ConceptSourceId, Encounter, EncounterId,
    EntityId, Location, LocationId, PatientId, PatientProgram, PatientProgramId, PatientStateId,
    Patient, Program, ProgramId, ProgramWorkflow, ProgramWorkflowState, Provider, ProviderId,
    StateId, WorkflowId,
};
use crate::{FormEntryError, FormEntryResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fixture document layout. Every section is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetWire {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    concept_sources: Vec<ConceptSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    concepts: Vec<Concept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    providers: Vec<Provider>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    patients: Vec<Patient>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    programs: Vec<Program>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    patient_programs: Vec<PatientProgram>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    encounters: Vec<Encounter>,
}

fn keyed<K: Ord, V>(items: Vec<V>, key: impl Fn(&V) -> K) -> BTreeMap<K, V> {
    items.into_iter().map(|v| (key(&v), v)).collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    pub(crate) concept_sources: BTreeMap<ConceptSourceId, ConceptSource>,
    pub(crate) concepts: BTreeMap<ConceptId, Concept>,
    pub(crate) locations: BTreeMap<LocationId, Location>,
    pub(crate) providers: BTreeMap<ProviderId, Provider>,
    pub(crate) patients: BTreeMap<PatientId, Patient>,
    pub(crate) programs: BTreeMap<ProgramId, Program>,
    pub(crate) patient_programs: BTreeMap<PatientProgramId, PatientProgram>,
    pub(crate) encounters: BTreeMap<EncounterId, Encounter>,
}

impl From<DatasetWire> for Dataset {
    fn from(wire: DatasetWire) -> Self {
        Self {
            concept_sources: keyed(wire.concept_sources, |s| s.id),
            concepts: keyed(wire.concepts, |c| c.id),
            locations: keyed(wire.locations, |l| l.id),
            providers: keyed(wire.providers, |p| p.id),
            patients: keyed(wire.patients, |p| p.id),
            programs: keyed(wire.programs, |p| p.id),
            patient_programs: keyed(wire.patient_programs, |p| p.id),
            encounters: keyed(wire.encounters, |e| e.id),
        }
    }
}

impl Dataset {
    /// Parses a fixture document and checks it on its own.
    ///
    /// # Errors
    ///
    /// Returns [`FormEntryError::DatasetSchema`] with the path of the offending key when the
    /// document does not match the fixture layout, or a reference error from
    /// [`Dataset::check_integrity`].
    pub fn parse(text: &str) -> FormEntryResult<Self> {
        let dataset = Self::parse_unchecked(text)?;
        dataset.check_integrity()?;
        Ok(dataset)
    }

    fn parse_unchecked(text: &str) -> FormEntryResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let de = serde_yaml::Deserializer::from_str(text);
        let wire: DatasetWire = serde_path_to_error::deserialize(de).map_err(|e| {
            FormEntryError::DatasetSchema {
                path: e.path().to_string(),
                message: e.inner().to_string(),
            }
        })?;
        Ok(wire.into())
    }

    /// Merges a fixture document into this dataset. Entities with an existing id are replaced.
    ///
    /// The dataset is left untouched when the document or the merged result is invalid.
    pub fn merge_yaml(&mut self, text: &str) -> FormEntryResult<()> {
        let incoming = Self::parse_unchecked(text)?;
        let mut merged = self.clone();
        merged.concept_sources.extend(incoming.concept_sources);
        merged.concepts.extend(incoming.concepts);
        merged.locations.extend(incoming.locations);
        merged.providers.extend(incoming.providers);
        merged.patients.extend(incoming.patients);
        merged.programs.extend(incoming.programs);
        merged.patient_programs.extend(incoming.patient_programs);
        merged.encounters.extend(incoming.encounters);
        merged.check_integrity()?;
        *self = merged;
        Ok(())
    }

    /// Renders the dataset in fixture layout.
    pub fn render(&self) -> FormEntryResult<String> {
        let wire = DatasetWire {
            concept_sources: self.concept_sources.values().cloned().collect(),
            concepts: self.concepts.values().cloned().collect(),
            locations: self.locations.values().cloned().collect(),
            providers: self.providers.values().cloned().collect(),
            patients: self.patients.values().cloned().collect(),
            programs: self.programs.values().cloned().collect(),
            patient_programs: self.patient_programs.values().cloned().collect(),
            encounters: self.encounters.values().cloned().collect(),
        };
        serde_yaml::to_string(&wire).map_err(FormEntryError::YamlSerialization)
    }

    /// Checks that every reference between entities resolves.
    ///
    /// Workflow, state and patient-state ids must also be unique across the whole dataset, since
    /// they are looked up without their parent. A patient has at most one active enrollment per
    /// program.
    pub fn check_integrity(&self) -> FormEntryResult<()> {
        fn dangling(kind: &'static str, id: impl ToString) -> FormEntryError {
            FormEntryError::DanglingReference {
                kind,
                id: id.to_string(),
            }
        }

        for concept in self.concepts.values() {
            for mapping in &concept.mappings {
                if !self.concept_sources.contains_key(&mapping.source) {
                    return Err(dangling("concept source", mapping.source));
                }
            }
        }

        let mut workflow_ids = BTreeSet::new();
        let mut state_ids = BTreeSet::new();
        for program in self.programs.values() {
            self.require_concept(program.concept)?;
            for workflow in &program.workflows {
                self.require_concept(workflow.concept)?;
                if !workflow_ids.insert(workflow.id) {
                    return Err(FormEntryError::InvalidInput(format!(
                        "workflow id {} is used more than once",
                        workflow.id
                    )));
                }
                for state in &workflow.states {
                    self.require_concept(state.concept)?;
                    if !state_ids.insert(state.id) {
                        return Err(FormEntryError::InvalidInput(format!(
                            "state id {} is used more than once",
                            state.id
                        )));
                    }
                }
            }
        }

        let mut patient_state_ids = BTreeSet::new();
        let mut active = BTreeSet::new();
        for pp in self.patient_programs.values() {
            if pp.is_active() && !active.insert((pp.patient, pp.program)) {
                return Err(FormEntryError::MultipleActiveEnrollments {
                    patient: pp.patient,
                    program: pp.program,
                });
            }
            if !self.patients.contains_key(&pp.patient) {
                return Err(dangling("patient", pp.patient));
            }
            let program = self
                .programs
                .get(&pp.program)
                .ok_or_else(|| dangling("program", pp.program))?;
            if let Some(location) = pp.location {
                if !self.locations.contains_key(&location) {
                    return Err(dangling("location", location));
                }
            }
            for ps in &pp.states {
                if !patient_state_ids.insert(ps.id) {
                    return Err(FormEntryError::InvalidInput(format!(
                        "patient state id {} is used more than once",
                        ps.id
                    )));
                }
                let consistent = program
                    .workflow(ps.workflow)
                    .is_some_and(|w| w.state(ps.state).is_some());
                if !consistent {
                    return Err(FormEntryError::InconsistentPatientState(ps.id));
                }
            }
        }

        for encounter in self.encounters.values() {
            if !self.patients.contains_key(&encounter.patient) {
                return Err(dangling("patient", encounter.patient));
            }
            if let Some(location) = encounter.location {
                if !self.locations.contains_key(&location) {
                    return Err(dangling("location", location));
                }
            }
            if let Some(provider) = encounter.provider {
                if !self.providers.contains_key(&provider) {
                    return Err(dangling("provider", provider));
                }
            }
        }

        Ok(())
    }

    fn require_concept(&self, id: ConceptId) -> FormEntryResult<()> {
        if self.concepts.contains_key(&id) {
            Ok(())
        } else {
            Err(FormEntryError::DanglingReference {
                kind: "concept",
                id: id.to_string(),
            })
        }
    }

    pub fn patient(&self, id: PatientId) -> Option<&Patient> {
        self.patients.get(&id)
    }

    pub fn program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(&id)
    }

    pub fn patient_program(&self, id: PatientProgramId) -> Option<&PatientProgram> {
        self.patient_programs.get(&id)
    }

    pub fn encounter(&self, id: EncounterId) -> Option<&Encounter> {
        self.encounters.get(&id)
    }

    pub fn concept(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.get(&id)
    }

    /// Finds a workflow in any program.
    pub fn workflow(&self, id: WorkflowId) -> Option<(&Program, &ProgramWorkflow)> {
        self.programs
            .values()
            .find_map(|p| p.workflow(id).map(|w| (p, w)))
    }

    /// Finds a state in any program.
    pub fn state(
        &self,
        id: StateId,
    ) -> Option<(&Program, &ProgramWorkflow, &ProgramWorkflowState)> {
        self.programs
            .values()
            .find_map(|p| p.state(id).map(|(w, s)| (p, w, s)))
    }

    /// Non-voided and voided enrollments of `patient`, oldest id first.
    pub fn patient_programs_of(&self, patient: PatientId) -> impl Iterator<Item = &PatientProgram> {
        self.patient_programs
            .values()
            .filter(move |pp| pp.patient == patient)
    }

    pub(crate) fn next_patient_program_id(&self) -> PatientProgramId {
        next_key(&self.patient_programs)
    }

    pub(crate) fn next_encounter_id(&self) -> EncounterId {
        next_key(&self.encounters)
    }

    /// Patient state ids are unique across all enrollments.
    pub(crate) fn next_patient_state_id(&self) -> PatientStateId {
        self.patient_programs
            .values()
            .flat_map(|pp| pp.states.iter().map(|s| s.id))
            .max()
            .map_or(PatientStateId::FIRST, |id| id.successor())
    }

    pub fn entity_counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("concept_sources", self.concept_sources.len()),
            ("concepts", self.concepts.len()),
            ("locations", self.locations.len()),
            ("providers", self.providers.len()),
            ("patients", self.patients.len()),
            ("programs", self.programs.len()),
            ("patient_programs", self.patient_programs.len()),
            ("encounters", self.encounters.len()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
concepts:
  - { id: 1, name: "HIV Program" }
  - { id: 2, name: "Treatment status" }
  - { id: 3, name: "On ARVs" }
patients:
  - { id: 2, given_name: "John", family_name: "Doe" }
programs:
  - id: 1
    name: "HIV Program"
    concept: 1
    workflows:
      - id: 1
        concept: 2
        states:
          - { id: 1, concept: 3, initial: true }
"#;

    #[test]
    fn test_parse_generates_missing_uuids() {
        let dataset = Dataset::parse(MINIMAL).expect("valid dataset");
        let a = dataset.patient(PatientId(2)).expect("patient").uuid;
        let b = dataset.program(ProgramId(1)).expect("program").uuid;
        assert_ne!(a, b);
        assert_eq!(dataset.entity_counts()["concepts"], 3);
    }

    #[test]
    fn test_parse_reports_schema_path() {
        let err = Dataset::parse("patients:\n  - { id: 2, given_name: John, family_name: Doe, age: 4 }\n")
            .expect_err("unknown key");
        match err {
            FormEntryError::DatasetSchema { path, .. } => assert!(path.starts_with("patients[0]"), "{path}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_dangling_concept() {
        let err = Dataset::parse("programs:\n  - { id: 1, name: X, concept: 99 }\n")
            .expect_err("dangling");
        assert!(matches!(err, FormEntryError::DanglingReference { kind: "concept", .. }));
    }

    #[test]
    fn test_parse_rejects_state_outside_program() {
        let text = format!(
            "{MINIMAL}patient_programs:\n  - id: 1\n    patient: 2\n    program: 1\n    date_enrolled: 2008-08-01\n    states:\n      - {{ id: 1, workflow: 1, state: 7, start_date: 2008-08-01 }}\n"
        );
        let err = Dataset::parse(&text).expect_err("inconsistent");
        assert!(matches!(err, FormEntryError::InconsistentPatientState(PatientStateId(1))));
    }

    #[test]
    fn test_merge_replaces_by_id_and_keeps_original_on_error() {
        let mut dataset = Dataset::parse(MINIMAL).expect("valid dataset");
        dataset
            .merge_yaml("patients:\n  - { id: 2, given_name: Jane, family_name: Doe }\n")
            .expect("merge");
        assert_eq!(
            dataset.patient(PatientId(2)).expect("patient").given_name.as_str(),
            "Jane"
        );

        let before = dataset.clone();
        assert!(dataset
            .merge_yaml("encounters:\n  - { id: 1, patient: 99, date: 2010-01-01 }\n")
            .is_err());
        assert_eq!(dataset, before);
    }

    #[test]
    fn test_merge_rejects_second_active_enrollment() {
        let mut dataset = Dataset::parse(&format!(
            "{MINIMAL}patient_programs:\n  - {{ id: 1, patient: 2, program: 1, date_enrolled: 2010-01-01 }}\n"
        ))
        .expect("valid dataset");
        let before = dataset.clone();

        let err = dataset
            .merge_yaml(
                "patient_programs:\n  - { id: 2, patient: 2, program: 1, date_enrolled: 2011-01-01 }\n",
            )
            .expect_err("two active enrollments");
        assert!(matches!(
            err,
            FormEntryError::MultipleActiveEnrollments {
                patient: PatientId(2),
                program: ProgramId(1),
            }
        ));
        assert_eq!(dataset, before);

        dataset
            .merge_yaml(
                "patient_programs:\n  - { id: 2, patient: 2, program: 1, date_enrolled: 2008-01-01, date_completed: 2009-01-01 }\n",
            )
            .expect("completed enrollment alongside the active one");
    }

    #[test]
    fn test_render_parses_back() {
        let dataset = Dataset::parse(MINIMAL).expect("valid dataset");
        let rendered = dataset.render().expect("render");
        assert_eq!(Dataset::parse(&rendered).expect("reparse"), dataset);
    }

    #[test]
    fn test_empty_document_is_empty_dataset() {
        assert_eq!(Dataset::parse("  \n").expect("empty"), Dataset::default());
    }

    #[test]
    fn test_next_ids() {
        let dataset = Dataset::parse(MINIMAL).expect("valid dataset");
        assert_eq!(dataset.next_patient_program_id(), PatientProgramId(1));
        assert_eq!(dataset.next_patient_state_id(), PatientStateId(1));
        assert_eq!(dataset.next_encounter_id(), EncounterId(1));
    }
}
