//! Programs and patient enrollments.

use crate::dataset::Dataset;
use crate::model::{
    EntityId, LocationId, PatientId, PatientProgram, PatientProgramId, Program, ProgramId,
    ProgramWorkflow, ProgramWorkflowState, StateId, WorkflowId,
};
use crate::store::DataStore;
use crate::{FormEntryError, FormEntryResult};
use chrono::NaiveDate;
use formentry_uuid::EntityUuid;

/// Filters for [`ProgramRepository::patient_programs`].
///
/// A minimum completion date keeps enrollments that are still open or completed on or after it;
/// a maximum completion date keeps only enrollments completed on or before it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientProgramQuery {
    pub program: Option<ProgramId>,
    pub min_enrollment_date: Option<NaiveDate>,
    pub max_enrollment_date: Option<NaiveDate>,
    pub min_completion_date: Option<NaiveDate>,
    pub max_completion_date: Option<NaiveDate>,
    pub include_voided: bool,
}

impl PatientProgramQuery {
    pub fn for_program(program: ProgramId) -> Self {
        Self {
            program: Some(program),
            ..Self::default()
        }
    }

    pub fn matches(&self, pp: &PatientProgram) -> bool {
        if pp.voided && !self.include_voided {
            return false;
        }
        if self.program.is_some_and(|p| p != pp.program) {
            return false;
        }
        if self.min_enrollment_date.is_some_and(|d| pp.date_enrolled < d) {
            return false;
        }
        if self.max_enrollment_date.is_some_and(|d| pp.date_enrolled > d) {
            return false;
        }
        if let Some(min) = self.min_completion_date {
            if pp.date_completed.is_some_and(|c| c < min) {
                return false;
            }
        }
        if let Some(max) = self.max_completion_date {
            if !pp.date_completed.is_some_and(|c| c <= max) {
                return false;
            }
        }
        true
    }
}

impl Dataset {
    pub fn program_by_uuid(&self, uuid: EntityUuid) -> Option<&Program> {
        self.programs.values().find(|p| p.uuid == uuid)
    }

    /// Case-insensitive; retired programs only match when no active program does.
    pub fn program_by_name(&self, name: &str) -> Option<&Program> {
        let mut matching = self
            .programs
            .values()
            .filter(|p| p.name.eq_ignore_case(name));
        let first = matching.next()?;
        if !first.retired {
            return Some(first);
        }
        matching.find(|p| !p.retired).or(Some(first))
    }

    pub fn workflow_by_uuid(&self, uuid: EntityUuid) -> Option<(&Program, &ProgramWorkflow)> {
        self.programs
            .values()
            .find_map(|p| p.workflows.iter().find(|w| w.uuid == uuid).map(|w| (p, w)))
    }

    pub fn state_by_uuid(
        &self,
        uuid: EntityUuid,
    ) -> Option<(&Program, &ProgramWorkflow, &ProgramWorkflowState)> {
        self.programs.values().find_map(|p| {
            p.states()
                .find(|(_, s)| s.uuid == uuid)
                .map(|(w, s)| (p, w, s))
        })
    }

    pub fn patient_programs_matching<'a>(
        &'a self,
        patient: PatientId,
        query: &'a PatientProgramQuery,
    ) -> impl Iterator<Item = &'a PatientProgram> {
        self.patient_programs_of(patient)
            .filter(move |pp| query.matches(pp))
    }

    /// The non-voided, uncompleted enrollment of `patient` in `program`, if any.
    pub fn active_enrollment(
        &self,
        patient: PatientId,
        program: ProgramId,
    ) -> Option<&PatientProgram> {
        self.patient_programs_of(patient)
            .filter(|pp| pp.program == program && pp.is_active())
            .max_by_key(|pp| (pp.date_enrolled, pp.id))
    }

    /// Creates an enrollment without states.
    ///
    /// The caller decides what happens when an active enrollment already exists.
    ///
    /// # Errors
    ///
    /// Returns [`FormEntryError::OverlappingEnrollment`] if an earlier enrollment in the same
    /// program completed on or after `date`.
    pub(crate) fn enroll(
        &mut self,
        patient: PatientId,
        program: ProgramId,
        date: NaiveDate,
        location: Option<LocationId>,
    ) -> FormEntryResult<PatientProgramId> {
        if !self.patients.contains_key(&patient) {
            return Err(FormEntryError::UnknownPatient(patient));
        }
        if !self.programs.contains_key(&program) {
            return Err(FormEntryError::UnknownProgram(program.to_string()));
        }
        self.check_overlap(patient, program, date, None, None)?;

        let id = self.next_patient_program_id();
        self.patient_programs.insert(
            id,
            PatientProgram {
                id,
                uuid: EntityUuid::new(),
                patient,
                program,
                date_enrolled: date,
                date_completed: None,
                location,
                voided: false,
                states: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Moves enrollment `id` into `state` on `on`. Returns `false` if it already was there.
    pub(crate) fn transition(
        &mut self,
        id: PatientProgramId,
        state: StateId,
        on: NaiveDate,
    ) -> FormEntryResult<bool> {
        let program = self
            .patient_programs
            .get(&id)
            .map(|pp| pp.program)
            .ok_or(FormEntryError::UnknownPatientProgram(id))?;
        let (workflow, target) = self
            .programs
            .get(&program)
            .and_then(|p| p.state(state))
            .map(|(w, s)| (w.id, s.clone()))
            .ok_or_else(|| FormEntryError::UnknownState {
                program,
                reference: state.to_string(),
            })?;
        let new_id = self.next_patient_state_id();

        let pp = self
            .patient_programs
            .get_mut(&id)
            .ok_or(FormEntryError::UnknownPatientProgram(id))?;
        pp.transition_to_state(workflow, &target, on, new_id)
    }

    /// Rejects an enrollment of `patient` in `program` running from `start` to `end` (open when
    /// `None`) if it would reach back into a completed enrollment other than `exclude`.
    fn check_overlap(
        &self,
        patient: PatientId,
        program: ProgramId,
        start: NaiveDate,
        end: Option<NaiveDate>,
        exclude: Option<PatientProgramId>,
    ) -> FormEntryResult<()> {
        let overlapping = self
            .patient_programs_of(patient)
            .filter(|pp| pp.program == program && !pp.voided && Some(pp.id) != exclude)
            .filter(|pp| end.map_or(true, |end| pp.date_enrolled <= end))
            .filter_map(|pp| pp.date_completed)
            .filter(|completed| *completed >= start)
            .max();
        match overlapping {
            Some(completed) => Err(FormEntryError::OverlappingEnrollment {
                patient,
                program,
                date: start,
                completed,
            }),
            None => Ok(()),
        }
    }

    /// Moves the enrollment date of `id`, cascading to states that started on the old date.
    ///
    /// # Errors
    ///
    /// Returns [`FormEntryError::OverlappingEnrollment`] if the new date reaches back into
    /// another completed enrollment of the same program.
    pub(crate) fn change_enrollment_date(
        &mut self,
        id: PatientProgramId,
        date: NaiveDate,
    ) -> FormEntryResult<usize> {
        let (patient, program, completed) = self
            .patient_programs
            .get(&id)
            .map(|pp| (pp.patient, pp.program, pp.date_completed))
            .ok_or(FormEntryError::UnknownPatientProgram(id))?;
        self.check_overlap(patient, program, date, completed, Some(id))?;

        self.patient_programs
            .get_mut(&id)
            .ok_or(FormEntryError::UnknownPatientProgram(id))?
            .change_enrollment_date(date)
    }

    /// Completes enrollment `id` on `on`.
    pub(crate) fn complete_enrollment(
        &mut self,
        id: PatientProgramId,
        on: NaiveDate,
    ) -> FormEntryResult<()> {
        let pp = self
            .patient_programs
            .get_mut(&id)
            .ok_or(FormEntryError::UnknownPatientProgram(id))?;
        if on < pp.date_enrolled {
            return Err(FormEntryError::InvalidInput(format!(
                "completion date {on} is before the enrollment date {}",
                pp.date_enrolled
            )));
        }
        pp.date_completed = Some(on);
        Ok(())
    }
}

/// Service over programs and patient enrollments.
#[derive(Clone, Debug)]
pub struct ProgramRepository {
    store: DataStore,
}

impl ProgramRepository {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    pub fn get_program(&self, id: ProgramId) -> Option<Program> {
        self.store.read(|d| d.program(id).cloned())
    }

    pub fn get_program_by_uuid(&self, uuid: EntityUuid) -> Option<Program> {
        self.store.read(|d| d.program_by_uuid(uuid).cloned())
    }

    pub fn get_program_by_name(&self, name: &str) -> Option<Program> {
        self.store.read(|d| d.program_by_name(name).cloned())
    }

    pub fn list_programs(&self) -> Vec<Program> {
        self.store.read(|d| d.programs.values().cloned().collect())
    }

    pub fn get_workflow(&self, id: WorkflowId) -> Option<ProgramWorkflow> {
        self.store.read(|d| d.workflow(id).map(|(_, w)| w.clone()))
    }

    pub fn get_workflow_by_uuid(&self, uuid: EntityUuid) -> Option<ProgramWorkflow> {
        self.store
            .read(|d| d.workflow_by_uuid(uuid).map(|(_, w)| w.clone()))
    }

    pub fn get_state(&self, id: StateId) -> Option<ProgramWorkflowState> {
        self.store.read(|d| d.state(id).map(|(_, _, s)| s.clone()))
    }

    pub fn get_state_by_uuid(&self, uuid: EntityUuid) -> Option<ProgramWorkflowState> {
        self.store
            .read(|d| d.state_by_uuid(uuid).map(|(_, _, s)| s.clone()))
    }

    /// Enrollments of `patient` matching `query`, ordered by id.
    pub fn patient_programs(
        &self,
        patient: PatientId,
        query: &PatientProgramQuery,
    ) -> Vec<PatientProgram> {
        self.store.read(|d| {
            d.patient_programs_matching(patient, query)
                .cloned()
                .collect()
        })
    }

    pub fn patient_program(&self, id: PatientProgramId) -> Option<PatientProgram> {
        self.store.read(|d| d.patient_program(id).cloned())
    }

    pub fn active_enrollment(
        &self,
        patient: PatientId,
        program: ProgramId,
    ) -> Option<PatientProgram> {
        self.store
            .read(|d| d.active_enrollment(patient, program).cloned())
    }

    /// Inserts or replaces an enrollment.
    ///
    /// An enrollment id of `0` allocates a new id, as does a patient state id of `0`.
    pub fn save_patient_program(
        &self,
        mut pp: PatientProgram,
    ) -> FormEntryResult<PatientProgramId> {
        self.store.transaction(|d| {
            if pp.id.get() == 0 {
                pp.id = d.next_patient_program_id();
            }
            let mut next_state = d
                .patient_programs
                .iter()
                .filter(|(id, _)| **id != pp.id)
                .flat_map(|(_, other)| other.states.iter().map(|s| s.id))
                .chain(pp.states.iter().map(|s| s.id))
                .max()
                .map_or(crate::model::PatientStateId::FIRST, |id| id.successor());
            for state in pp.states.iter_mut().filter(|s| s.id.get() == 0) {
                state.id = next_state;
                next_state = next_state.successor();
            }

            let id = pp.id;
            d.patient_programs.insert(id, pp);
            d.check_integrity()?;
            tracing::debug!(patient_program = %id, "patient program saved");
            Ok(id)
        })
    }

    /// Changes the enrollment date, moving states that started on the old date with it.
    pub fn change_enrollment_date(
        &self,
        id: PatientProgramId,
        date: NaiveDate,
    ) -> FormEntryResult<usize> {
        self.store
            .transaction(|d| d.change_enrollment_date(id, date))
    }
}
