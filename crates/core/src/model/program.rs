//! Programs, workflows, states and patient enrollments.

use super::ids::{
    ConceptId, LocationId, PatientId, PatientProgramId, PatientStateId, ProgramId, StateId,
    WorkflowId,
};
use super::is_false;
use crate::error::{FormEntryError, FormEntryResult};
use crate::NonEmptyText;
use chrono::NaiveDate;
use formentry_uuid::EntityUuid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramWorkflowState {
    pub id: StateId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub concept: ConceptId,
    /// A patient who is not yet enrolled may only be enrolled directly into an initial state.
    #[serde(default, skip_serializing_if = "is_false")]
    pub initial: bool,
    /// Entering a terminal state completes the enrollment.
    #[serde(default, skip_serializing_if = "is_false")]
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retired: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramWorkflow {
    pub id: WorkflowId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub concept: ConceptId,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retired: bool,
    #[serde(default)]
    pub states: Vec<ProgramWorkflowState>,
}

impl ProgramWorkflow {
    pub fn state(&self, id: StateId) -> Option<&ProgramWorkflowState> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn initial_states(&self) -> impl Iterator<Item = &ProgramWorkflowState> {
        self.states.iter().filter(|s| s.initial && !s.retired)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Program {
    pub id: ProgramId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub name: NonEmptyText,
    pub concept: ConceptId,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retired: bool,
    #[serde(default)]
    pub workflows: Vec<ProgramWorkflow>,
}

impl Program {
    pub fn workflow(&self, id: WorkflowId) -> Option<&ProgramWorkflow> {
        self.workflows.iter().find(|w| w.id == id)
    }

    /// Finds a state anywhere in this program, together with its workflow.
    pub fn state(&self, id: StateId) -> Option<(&ProgramWorkflow, &ProgramWorkflowState)> {
        self.states().find(|(_, s)| s.id == id)
    }

    /// Every state of every workflow, in declaration order.
    pub fn states(&self) -> impl Iterator<Item = (&ProgramWorkflow, &ProgramWorkflowState)> {
        self.workflows
            .iter()
            .flat_map(|w| w.states.iter().map(move |s| (w, s)))
    }
}

/// A (workflow, state, start date) record within an enrollment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatientState {
    pub id: PatientStateId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub workflow: WorkflowId,
    pub state: StateId,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub voided: bool,
}

impl PatientState {
    fn is_open(&self) -> bool {
        !self.voided && self.end_date.is_none()
    }
}

/// A patient's enrollment in a program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatientProgram {
    pub id: PatientProgramId,
    #[serde(default)]
    pub uuid: EntityUuid,
    pub patient: PatientId,
    pub program: ProgramId,
    pub date_enrolled: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_completed: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationId>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub voided: bool,
    #[serde(default)]
    pub states: Vec<PatientState>,
}

impl PatientProgram {
    /// Non-voided and not completed.
    pub fn is_active(&self) -> bool {
        !self.voided && self.date_completed.is_none()
    }

    /// Enrolled on or before `date` and not completed on or before it.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        !self.voided
            && self.date_enrolled <= date
            && self.date_completed.map_or(true, |completed| completed > date)
    }

    /// The open state of `workflow`; if several are open the latest start wins.
    pub fn current_state(&self, workflow: WorkflowId) -> Option<&PatientState> {
        self.current_state_index(workflow).map(|i| &self.states[i])
    }

    /// One current state per workflow that has any, ordered by workflow id.
    pub fn current_states(&self) -> Vec<&PatientState> {
        let mut by_workflow: BTreeMap<WorkflowId, &PatientState> = BTreeMap::new();
        for state in self.states.iter().filter(|s| s.is_open()) {
            by_workflow
                .entry(state.workflow)
                .and_modify(|current| {
                    if (state.start_date, state.id) > (current.start_date, current.id) {
                        *current = state;
                    }
                })
                .or_insert(state);
        }
        by_workflow.into_values().collect()
    }

    /// Moves the enrollment date.
    ///
    /// Every non-voided state whose start date equals the old enrollment date moves with it;
    /// other states keep their dates. Returns the number of states that moved.
    ///
    /// # Errors
    ///
    /// Returns [`FormEntryError::EnrollmentDateAfterCompletion`] if the enrollment is completed
    /// before `new_date`.
    pub fn change_enrollment_date(&mut self, new_date: NaiveDate) -> FormEntryResult<usize> {
        if let Some(completed) = self.date_completed {
            if new_date > completed {
                return Err(FormEntryError::EnrollmentDateAfterCompletion {
                    patient_program: self.id,
                    date: new_date,
                    completed,
                });
            }
        }

        let old_date = self.date_enrolled;
        let mut moved = 0;
        for state in self
            .states
            .iter_mut()
            .filter(|s| !s.voided && s.start_date == old_date)
        {
            state.start_date = new_date;
            moved += 1;
        }
        self.date_enrolled = new_date;
        Ok(moved)
    }

    /// Ends the current state of the state's workflow on `on` and opens `state` from `on`.
    ///
    /// Returns `false` without changes when `state` is already current. Entering a terminal
    /// state completes the enrollment on `on`.
    ///
    /// # Errors
    ///
    /// Returns [`FormEntryError::TransitionBeforeCurrentState`] if `on` precedes the start of
    /// the current state.
    pub(crate) fn transition_to_state(
        &mut self,
        workflow: WorkflowId,
        state: &ProgramWorkflowState,
        on: NaiveDate,
        new_id: PatientStateId,
    ) -> FormEntryResult<bool> {
        if let Some(index) = self.current_state_index(workflow) {
            let current = &mut self.states[index];
            if current.state == state.id {
                return Ok(false);
            }
            if on < current.start_date {
                return Err(FormEntryError::TransitionBeforeCurrentState {
                    workflow,
                    date: on,
                    current_start: current.start_date,
                });
            }
            current.end_date = Some(on);
        }

        self.states.push(PatientState {
            id: new_id,
            uuid: EntityUuid::new(),
            workflow,
            state: state.id,
            start_date: on,
            end_date: None,
            voided: false,
        });

        if state.terminal {
            self.date_completed = Some(on);
        }
        Ok(true)
    }

    fn current_state_index(&self, workflow: WorkflowId) -> Option<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.workflow == workflow && s.is_open())
            .max_by_key(|(_, s)| (s.start_date, s.id))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn state(id: u32, initial: bool, terminal: bool) -> ProgramWorkflowState {
        ProgramWorkflowState {
            id: StateId(id),
            uuid: EntityUuid::new(),
            concept: ConceptId(id),
            initial,
            terminal,
            retired: false,
        }
    }

    fn patient_state(id: u32, workflow: u32, state: u32, start: NaiveDate) -> PatientState {
        PatientState {
            id: PatientStateId(id),
            uuid: EntityUuid::new(),
            workflow: WorkflowId(workflow),
            state: StateId(state),
            start_date: start,
            end_date: None,
            voided: false,
        }
    }

    fn enrollment(date_enrolled: NaiveDate, states: Vec<PatientState>) -> PatientProgram {
        PatientProgram {
            id: PatientProgramId(1),
            uuid: EntityUuid::new(),
            patient: PatientId(2),
            program: ProgramId(1),
            date_enrolled,
            date_completed: None,
            location: None,
            voided: false,
            states,
        }
    }

    #[test]
    fn change_enrollment_date_moves_only_states_started_on_old_date() {
        let enrolled = date(2008, 8, 1);
        let mut pp = enrollment(
            enrolled,
            vec![
                patient_state(10, 1, 1, enrolled),
                patient_state(11, 2, 4, date(2008, 9, 1)),
            ],
        );

        let moved = pp.change_enrollment_date(date(2012, 2, 15)).expect("change");

        assert_eq!(moved, 1);
        assert_eq!(pp.date_enrolled, date(2012, 2, 15));
        assert_eq!(pp.states[0].start_date, date(2012, 2, 15));
        assert_eq!(pp.states[1].start_date, date(2008, 9, 1));
    }

    #[test]
    fn change_enrollment_date_skips_voided_states() {
        let enrolled = date(2010, 1, 1);
        let mut voided = patient_state(10, 1, 1, enrolled);
        voided.voided = true;
        let mut pp = enrollment(enrolled, vec![voided]);

        assert_eq!(pp.change_enrollment_date(date(2010, 2, 1)).expect("change"), 0);
        assert_eq!(pp.states[0].start_date, enrolled);
    }

    #[test]
    fn change_enrollment_date_rejects_date_after_completion() {
        let mut pp = enrollment(date(2010, 1, 1), vec![]);
        pp.date_completed = Some(date(2010, 6, 1));

        let err = pp
            .change_enrollment_date(date(2010, 7, 1))
            .expect_err("after completion");
        assert!(matches!(
            err,
            FormEntryError::EnrollmentDateAfterCompletion { .. }
        ));
        assert_eq!(pp.date_enrolled, date(2010, 1, 1));
    }

    #[test]
    fn current_state_prefers_latest_open_state() {
        let mut ended = patient_state(1, 1, 1, date(2010, 1, 1));
        ended.end_date = Some(date(2010, 3, 1));
        let pp = enrollment(
            date(2010, 1, 1),
            vec![
                ended,
                patient_state(2, 1, 2, date(2010, 3, 1)),
                patient_state(3, 5, 7, date(2010, 1, 1)),
            ],
        );

        assert_eq!(
            pp.current_state(WorkflowId(1)).map(|s| s.state),
            Some(StateId(2))
        );
        let current: Vec<StateId> = pp.current_states().iter().map(|s| s.state).collect();
        assert_eq!(current, vec![StateId(2), StateId(7)]);
        assert!(pp.current_state(WorkflowId(9)).is_none());
    }

    #[test]
    fn transition_ends_current_state_and_completes_on_terminal() {
        let start = date(2011, 1, 1);
        let mut pp = enrollment(start, vec![patient_state(1, 1, 1, start)]);

        let changed = pp
            .transition_to_state(WorkflowId(1), &state(3, false, true), date(2011, 5, 1), PatientStateId(2))
            .expect("transition");

        assert!(changed);
        assert_eq!(pp.states[0].end_date, Some(date(2011, 5, 1)));
        assert_eq!(
            pp.current_state(WorkflowId(1)).map(|s| s.state),
            Some(StateId(3))
        );
        assert_eq!(pp.date_completed, Some(date(2011, 5, 1)));
        assert!(!pp.is_active());
    }

    #[test]
    fn transition_to_current_state_is_noop() {
        let start = date(2011, 1, 1);
        let mut pp = enrollment(start, vec![patient_state(1, 1, 1, start)]);

        let changed = pp
            .transition_to_state(WorkflowId(1), &state(1, true, false), date(2011, 2, 1), PatientStateId(2))
            .expect("noop");

        assert!(!changed);
        assert_eq!(pp.states.len(), 1);
    }

    #[test]
    fn transition_before_current_start_is_rejected() {
        let start = date(2011, 1, 1);
        let mut pp = enrollment(start, vec![patient_state(1, 1, 1, start)]);

        let err = pp
            .transition_to_state(WorkflowId(1), &state(2, false, false), date(2010, 12, 31), PatientStateId(2))
            .expect_err("before start");
        assert!(matches!(
            err,
            FormEntryError::TransitionBeforeCurrentState { .. }
        ));
    }

    #[test]
    fn active_on_respects_enrollment_and_completion() {
        let mut pp = enrollment(date(2010, 1, 1), vec![]);
        assert!(!pp.is_active_on(date(2009, 12, 31)));
        assert!(pp.is_active_on(date(2010, 1, 1)));
        pp.date_completed = Some(date(2010, 6, 1));
        assert!(pp.is_active_on(date(2010, 5, 31)));
        assert!(!pp.is_active_on(date(2010, 6, 1)));
    }
}
