//! Changes a submission makes to the dataset.
//!
//! Tags record what they want done; [`FormSubmissionActions::apply`] then performs the changes
//! in a fixed order inside one store transaction: the encounter, enrollment date changes, new
//! enrollments, state transitions and finally completions.

use super::context::Mode;
use crate::dataset::Dataset;
use crate::model::{
    Encounter, EncounterId, LocationId, PatientId, PatientProgramId, ProgramId, ProviderId,
    StateId, WorkflowId,
};
use crate::{FormEntryError, FormEntryResult};
use chrono::NaiveDate;
use formentry_uuid::EntityUuid;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EnrollmentRequest {
    pub program: ProgramId,
    pub date: NaiveDate,
    /// False when the date defaulted to today.
    pub date_submitted: bool,
    pub states: Vec<(WorkflowId, StateId)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StateTransition {
    pub program: ProgramId,
    pub workflow: WorkflowId,
    pub state: StateId,
    pub on: NaiveDate,
}

/// Where the actions are applied.
pub(crate) struct ActionTarget<'a> {
    pub patient: PatientId,
    pub mode: Mode,
    pub encounter: Option<EncounterId>,
    pub form_name: Option<&'a str>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Applied {
    pub encounter: Option<EncounterId>,
    pub encounter_created: bool,
    pub enrolled: Vec<PatientProgramId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FormSubmissionActions {
    /// Set when the form has an encounter date; the encounter is only written then.
    pub encounter_date: Option<NaiveDate>,
    pub location: Option<LocationId>,
    pub provider: Option<ProviderId>,
    pub enrollments: Vec<EnrollmentRequest>,
    pub transitions: Vec<StateTransition>,
    pub completions: Vec<(ProgramId, NaiveDate)>,
}

impl FormSubmissionActions {
    pub(crate) fn apply(
        &self,
        d: &mut Dataset,
        target: &ActionTarget<'_>,
    ) -> FormEntryResult<Applied> {
        let patient = target.patient;
        if d.patient(patient).is_none() {
            return Err(FormEntryError::UnknownPatient(patient));
        }
        self.check_one_state_per_workflow()?;

        let mut applied = Applied {
            encounter: target.encounter,
            ..Applied::default()
        };
        self.apply_encounter(d, target, &mut applied)?;

        let mut handled = BTreeSet::new();
        if target.mode == Mode::Edit {
            for (index, request) in self.enrollments.iter().enumerate() {
                if !request.date_submitted {
                    continue;
                }
                let Some(active) = d.active_enrollment(patient, request.program) else {
                    continue;
                };
                let id = active.id;
                if active.date_enrolled != request.date {
                    let moved = d.change_enrollment_date(id, request.date)?;
                    tracing::info!(
                        patient_program = %id,
                        date = %request.date,
                        states_moved = moved,
                        "enrollment date changed"
                    );
                }
                handled.insert(index);
            }
        }

        for (index, request) in self.enrollments.iter().enumerate() {
            if handled.contains(&index) {
                continue;
            }
            if let Some(active) = d.active_enrollment(patient, request.program) {
                tracing::debug!(
                    patient = %patient,
                    program = %request.program,
                    patient_program = %active.id,
                    "already enrolled; enrollment skipped"
                );
                continue;
            }
            let id = enroll_with_states(
                d,
                patient,
                request.program,
                request.date,
                self.location,
                &request.states,
            )?;
            applied.enrolled.push(id);
        }

        for transition in &self.transitions {
            match d
                .active_enrollment(patient, transition.program)
                .map(|pp| pp.id)
            {
                Some(id) => {
                    if d.transition(id, transition.state, transition.on)? {
                        tracing::info!(
                            patient_program = %id,
                            workflow = %transition.workflow,
                            state = %transition.state,
                            "workflow state changed"
                        );
                    } else {
                        tracing::debug!(state = %transition.state, "state already current");
                    }
                }
                None => {
                    let states = [(transition.workflow, transition.state)];
                    let id = enroll_with_states(
                        d,
                        patient,
                        transition.program,
                        transition.on,
                        self.location,
                        &states,
                    )?;
                    applied.enrolled.push(id);
                }
            }
        }

        for (program, on) in &self.completions {
            match d.active_enrollment(patient, *program).map(|pp| pp.id) {
                Some(id) => {
                    d.complete_enrollment(id, *on)?;
                    tracing::info!(patient_program = %id, date = %on, "program completed");
                }
                None => {
                    tracing::warn!(
                        patient = %patient,
                        program = %program,
                        "not enrolled; completion skipped"
                    );
                }
            }
        }

        Ok(applied)
    }

    fn apply_encounter(
        &self,
        d: &mut Dataset,
        target: &ActionTarget<'_>,
        applied: &mut Applied,
    ) -> FormEntryResult<()> {
        let Some(date) = self.encounter_date else {
            return Ok(());
        };

        match target.encounter {
            Some(id) => {
                let encounter = d
                    .encounters
                    .get_mut(&id)
                    .ok_or(FormEntryError::UnknownEncounter(id))?;
                encounter.date = date;
                encounter.location = self.location;
                encounter.provider = self.provider;
                tracing::debug!(encounter = %id, "encounter updated");
            }
            None => {
                let id = d.next_encounter_id();
                d.encounters.insert(
                    id,
                    Encounter {
                        id,
                        uuid: EntityUuid::new(),
                        patient: target.patient,
                        date,
                        location: self.location,
                        provider: self.provider,
                        form: target.form_name.map(str::to_string),
                        voided: false,
                    },
                );
                applied.encounter = Some(id);
                applied.encounter_created = true;
                tracing::info!(encounter = %id, patient = %target.patient, "encounter created");
            }
        }
        Ok(())
    }

    /// Every state the submission sets, from any tag, must be alone in its workflow.
    fn check_one_state_per_workflow(&self) -> FormEntryResult<()> {
        let mut seen: BTreeMap<WorkflowId, StateId> = BTreeMap::new();
        let fixed = self.enrollments.iter().flat_map(|r| r.states.iter().copied());
        let chosen = self.transitions.iter().map(|t| (t.workflow, t.state));
        for (workflow, state) in fixed.chain(chosen) {
            if let Some(previous) = seen.insert(workflow, state) {
                if previous != state {
                    return Err(FormEntryError::MultipleStatesInWorkflow { workflow });
                }
            }
        }
        Ok(())
    }
}

/// Enrolls `patient` and puts the enrollment into `states`, all from `date`.
///
/// Every state must be initial, since the patient is not enrolled yet.
fn enroll_with_states(
    d: &mut Dataset,
    patient: PatientId,
    program: ProgramId,
    date: NaiveDate,
    location: Option<LocationId>,
    states: &[(WorkflowId, StateId)],
) -> FormEntryResult<PatientProgramId> {
    for (_, state) in states {
        let initial = d
            .program(program)
            .and_then(|p| p.state(*state))
            .map(|(_, s)| s.initial)
            .ok_or_else(|| FormEntryError::UnknownState {
                program,
                reference: state.to_string(),
            })?;
        if !initial {
            return Err(FormEntryError::NonInitialState {
                patient,
                program,
                state: *state,
            });
        }
    }

    let id = d.enroll(patient, program, date, location)?;
    for (_, state) in states {
        d.transition(id, *state, date)?;
    }
    tracing::info!(
        patient = %patient,
        program = %program,
        patient_program = %id,
        date = %date,
        "patient enrolled"
    );
    Ok(id)
}
