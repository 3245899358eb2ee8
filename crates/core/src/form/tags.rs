//! Domain tags recognised inside a form template.
//!
//! Each tag is resolved against the dataset when the session is built, renders its widgets
//! once, and on submission first validates its posted fields and then records what it wants
//! done into [`FormSubmissionActions`].

use super::actions::{EnrollmentRequest, FormSubmissionActions, StateTransition};
use super::context::{Mode, WidgetRegistry};
use super::resolve::{resolve_program, resolve_state, resolve_workflow};
use super::submission::{FormSubmission, FormSubmissionError};
use super::widget::{Widget, WidgetOption};
use crate::constants::DEFAULT_SUBMIT_LABEL;
use crate::dataset::Dataset;
use crate::model::{
    Encounter, LocationId, PatientId, ProgramId, ProviderId, StateId, WorkflowId,
};
use crate::validation::parse_date;
use crate::{FormEntryError, FormEntryResult};
use chrono::NaiveDate;
use formentry_types::{parse_flag, ReferenceList};
use htmlform::Element;
use std::collections::BTreeMap;
use std::str::FromStr;

const REQUIRED: &str = "Required";
const INVALID_DATE: &str = "Invalid date";
const FUTURE_DATE: &str = "Cannot be in the future";
const INVALID_SELECTION: &str = "Invalid selection";

/// What tags see while the session is being built.
pub(crate) struct BuildContext<'a> {
    pub dataset: &'a Dataset,
    pub mode: Mode,
    pub patient: PatientId,
    pub encounter: Option<&'a Encounter>,
    pub today: NaiveDate,
    pub widgets: WidgetRegistry,
}

impl BuildContext<'_> {
    /// Existing values are shown when an encounter is edited or viewed.
    fn prefill(&self) -> bool {
        self.mode != Mode::Enter
    }
}

/// What tags see while recording actions.
pub(crate) struct SubmitContext {
    pub today: NaiveDate,
    /// Date actions without their own date happen on.
    pub encounter_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum WorkflowStateStyle {
    Dropdown,
    Radio,
    Hidden,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FormElement {
    EncounterDate {
        field: String,
    },
    EncounterLocation {
        field: String,
        choices: Vec<LocationId>,
    },
    EncounterProvider {
        field: String,
        choices: Vec<ProviderId>,
    },
    EnrollInProgram {
        program: ProgramId,
        states: Vec<(WorkflowId, StateId)>,
        date_field: Option<String>,
    },
    CompleteProgram {
        program: ProgramId,
    },
    WorkflowState {
        program: ProgramId,
        workflow: WorkflowId,
        field: String,
        choices: Vec<StateId>,
    },
    Submit,
}

fn required_attribute<'e>(el: &'e Element, attribute: &str) -> FormEntryResult<&'e str> {
    el.attribute(attribute)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FormEntryError::MissingAttribute {
            tag: el.name.clone(),
            attribute: attribute.to_string(),
        })
}

fn invalid_attribute(el: &Element, attribute: &str, value: impl Into<String>) -> FormEntryError {
    FormEntryError::InvalidAttribute {
        tag: el.name.clone(),
        attribute: attribute.to_string(),
        value: value.into(),
    }
}

/// A flag written without a value (`<tag showDate/>`) is on.
fn flag_attribute(el: &Element, attribute: &str, default: bool) -> FormEntryResult<bool> {
    match el.attribute(attribute) {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(true),
        Some(v) => parse_flag(v).map_err(|_| invalid_attribute(el, attribute, v)),
    }
}

fn default_id<T: FromStr>(
    el: &Element,
    exists: impl Fn(&T) -> bool,
) -> FormEntryResult<Option<T>> {
    let Some(raw) = el.attribute("default").map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<T>() {
        Ok(id) if exists(&id) => Ok(Some(id)),
        _ => Err(invalid_attribute(el, "default", raw)),
    }
}

impl FormElement {
    /// Builds the element for a domain tag and renders it.
    ///
    /// Returns `None` for plain HTML elements.
    pub(crate) fn build(
        el: &Element,
        ctx: &mut BuildContext<'_>,
    ) -> FormEntryResult<Option<(Self, String)>> {
        let built = match el.name.as_str() {
            "encounterDate" => Self::build_encounter_date(el, ctx)?,
            "encounterLocation" => Self::build_encounter_location(el, ctx)?,
            "encounterProvider" => Self::build_encounter_provider(el, ctx)?,
            "enrollInProgram" => Self::build_enroll_in_program(el, ctx)?,
            "completeProgram" => {
                let program = resolve_program(ctx.dataset, required_attribute(el, "programId")?)?;
                (
                    Self::CompleteProgram {
                        program: program.id,
                    },
                    String::new(),
                )
            }
            "workflowState" => Self::build_workflow_state(el, ctx)?,
            "submit" => {
                let label = el
                    .attribute("submitLabel")
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .unwrap_or(DEFAULT_SUBMIT_LABEL);
                let html = Widget::Submit {
                    label: label.to_string(),
                }
                .render(ctx.mode);
                (Self::Submit, html)
            }
            _ => return Ok(None),
        };
        Ok(Some(built))
    }

    fn build_encounter_date(
        el: &Element,
        ctx: &mut BuildContext<'_>,
    ) -> FormEntryResult<(Self, String)> {
        let default_today = match el.attribute("default").map(str::trim) {
            None | Some("") => false,
            Some(v) if v.eq_ignore_ascii_case("today") => true,
            Some(v) => return Err(invalid_attribute(el, "default", v)),
        };
        let value = if ctx.prefill() {
            ctx.encounter.map(|e| e.date)
        } else {
            default_today.then_some(ctx.today)
        };

        let field = ctx.widgets.register();
        let html = Widget::Date {
            field: field.clone(),
            value,
        }
        .render(ctx.mode);
        Ok((Self::EncounterDate { field }, html))
    }

    fn build_encounter_location(
        el: &Element,
        ctx: &mut BuildContext<'_>,
    ) -> FormEntryResult<(Self, String)> {
        let locations: Vec<_> = ctx
            .dataset
            .locations
            .values()
            .filter(|l| !l.retired)
            .collect();
        let selected = if ctx.prefill() {
            ctx.encounter.and_then(|e| e.location)
        } else {
            default_id(el, |id: &LocationId| locations.iter().any(|l| l.id == *id))?
        };

        let field = ctx.widgets.register();
        let html = Widget::Select {
            field: field.clone(),
            options: locations
                .iter()
                .map(|l| WidgetOption::new(l.id, l.name.as_str()))
                .collect(),
            selected: selected.map(|id| id.to_string()),
        }
        .render(ctx.mode);
        let choices = locations.iter().map(|l| l.id).collect();
        Ok((Self::EncounterLocation { field, choices }, html))
    }

    fn build_encounter_provider(
        el: &Element,
        ctx: &mut BuildContext<'_>,
    ) -> FormEntryResult<(Self, String)> {
        let providers: Vec<_> = ctx
            .dataset
            .providers
            .values()
            .filter(|p| !p.retired)
            .collect();
        let selected = if ctx.prefill() {
            ctx.encounter.and_then(|e| e.provider)
        } else {
            default_id(el, |id: &ProviderId| providers.iter().any(|p| p.id == *id))?
        };

        let field = ctx.widgets.register();
        let html = Widget::Select {
            field: field.clone(),
            options: providers
                .iter()
                .map(|p| WidgetOption::new(p.id, p.name.as_str()))
                .collect(),
            selected: selected.map(|id| id.to_string()),
        }
        .render(ctx.mode);
        let choices = providers.iter().map(|p| p.id).collect();
        Ok((Self::EncounterProvider { field, choices }, html))
    }

    fn build_enroll_in_program(
        el: &Element,
        ctx: &mut BuildContext<'_>,
    ) -> FormEntryResult<(Self, String)> {
        let program = resolve_program(ctx.dataset, required_attribute(el, "programId")?)?;
        let show_date = flag_attribute(el, "showDate", false)?;
        let references = ReferenceList::parse(el.attribute("stateIds").unwrap_or_default())
            .map_err(|e| invalid_attribute(el, "stateIds", e.to_string()))?;

        let active = ctx.dataset.active_enrollment(ctx.patient, program.id);
        let mut states: Vec<(WorkflowId, StateId)> = Vec::new();
        for reference in &references {
            let (workflow, state) = resolve_state(ctx.dataset, program, reference.as_str())?;
            if states.iter().any(|(w, _)| *w == workflow.id) {
                return Err(FormEntryError::MultipleStatesInWorkflow {
                    workflow: workflow.id,
                });
            }
            if active.is_none() && !state.initial {
                return Err(FormEntryError::NonInitialState {
                    patient: ctx.patient,
                    program: program.id,
                    state: state.id,
                });
            }
            states.push((workflow.id, state.id));
        }

        let (date_field, html) = if show_date {
            let field = ctx.widgets.register();
            let value = if ctx.prefill() {
                active.map(|pp| pp.date_enrolled)
            } else {
                None
            };
            let html = Widget::Date {
                field: field.clone(),
                value,
            }
            .render(ctx.mode);
            (Some(field), html)
        } else {
            (None, String::new())
        };

        Ok((
            Self::EnrollInProgram {
                program: program.id,
                states,
                date_field,
            },
            html,
        ))
    }

    fn build_workflow_state(
        el: &Element,
        ctx: &mut BuildContext<'_>,
    ) -> FormEntryResult<(Self, String)> {
        let (program, workflow) =
            resolve_workflow(ctx.dataset, required_attribute(el, "workflowId")?)?;

        let style = match el.attribute("type").map(str::trim) {
            None | Some("") => WorkflowStateStyle::Dropdown,
            Some(v) if v.eq_ignore_ascii_case("dropdown") => WorkflowStateStyle::Dropdown,
            Some(v) if v.eq_ignore_ascii_case("radio") => WorkflowStateStyle::Radio,
            Some(v) if v.eq_ignore_ascii_case("hidden") => WorkflowStateStyle::Hidden,
            Some(v) => return Err(invalid_attribute(el, "type", v)),
        };

        let references = ReferenceList::parse(el.attribute("stateIds").unwrap_or_default())
            .map_err(|e| invalid_attribute(el, "stateIds", e.to_string()))?;
        let states: Vec<_> = if references.is_empty() {
            workflow.states.iter().filter(|s| !s.retired).collect()
        } else {
            let mut chosen = Vec::with_capacity(references.len());
            for reference in &references {
                let (owner, state) = resolve_state(ctx.dataset, program, reference.as_str())?;
                if owner.id != workflow.id {
                    return Err(invalid_attribute(
                        el,
                        "stateIds",
                        format!("state {} is not in workflow {}", state.id, workflow.id),
                    ));
                }
                chosen.push(state);
            }
            chosen
        };
        if states.is_empty() {
            return Err(invalid_attribute(el, "stateIds", "no selectable states"));
        }
        if style == WorkflowStateStyle::Hidden && states.len() != 1 {
            return Err(invalid_attribute(
                el,
                "stateIds",
                "a hidden workflow state needs exactly one state",
            ));
        }

        let current = ctx
            .dataset
            .active_enrollment(ctx.patient, program.id)
            .and_then(|pp| pp.current_state(workflow.id))
            .map(|ps| ps.state);
        let selected = match (&style, ctx.prefill()) {
            (_, true) => current,
            (WorkflowStateStyle::Hidden, false) => Some(states[0].id),
            _ => None,
        };

        let field = ctx.widgets.register();
        let options: Vec<WidgetOption> = states
            .iter()
            .map(|s| {
                let label = ctx
                    .dataset
                    .concept(s.concept)
                    .map(|c| c.name.to_string())
                    .unwrap_or_else(|| s.id.to_string());
                WidgetOption::new(s.id, label)
            })
            .collect();
        let selected = selected.map(|id| id.to_string());
        let widget = match style {
            WorkflowStateStyle::Dropdown => Widget::Select {
                field: field.clone(),
                options,
                selected,
            },
            WorkflowStateStyle::Radio => Widget::Radio {
                field: field.clone(),
                options,
                selected,
            },
            WorkflowStateStyle::Hidden => Widget::Hidden {
                field: field.clone(),
                value: states[0].id.to_string(),
            },
        };
        let html = widget.render(ctx.mode);

        Ok((
            Self::WorkflowState {
                program: program.id,
                workflow: workflow.id,
                field,
                choices: states.iter().map(|s| s.id).collect(),
            },
            html,
        ))
    }

    /// States this element always sets, whatever is posted.
    pub(crate) fn fixed_states(&self) -> &[(WorkflowId, StateId)] {
        match self {
            Self::EnrollInProgram { states, .. } => states.as_slice(),
            _ => &[],
        }
    }

    /// The encounter date field, if this is the encounter date tag.
    pub(crate) fn encounter_date_field(&self) -> Option<&str> {
        match self {
            Self::EncounterDate { field } => Some(field),
            _ => None,
        }
    }

    /// Checks posted fields and appends a [`FormSubmissionError`] per problem.
    pub(crate) fn validate(
        &self,
        submission: &FormSubmission,
        today: NaiveDate,
        errors: &mut Vec<FormSubmissionError>,
    ) {
        match self {
            Self::EncounterDate { field } => match submission.value(field) {
                None => errors.push(FormSubmissionError::new(field, REQUIRED)),
                Some(value) => validate_date(field, value, today, errors),
            },
            Self::EncounterLocation { field, choices } => {
                validate_choice(submission, field, choices, true, errors)
            }
            Self::EncounterProvider { field, choices } => {
                validate_choice(submission, field, choices, true, errors)
            }
            Self::EnrollInProgram {
                date_field: Some(field),
                ..
            } => {
                if let Some(value) = submission.value(field) {
                    validate_date(field, value, today, errors);
                }
            }
            Self::WorkflowState { field, choices, .. } => {
                validate_choice(submission, field, choices, false, errors)
            }
            Self::EnrollInProgram { .. } | Self::CompleteProgram { .. } | Self::Submit => {}
        }
    }

    /// Records the actions for validated fields.
    pub(crate) fn record(
        &self,
        submission: &FormSubmission,
        ctx: &SubmitContext,
        actions: &mut FormSubmissionActions,
    ) {
        match self {
            Self::EncounterDate { field } => {
                actions.encounter_date = submission.value(field).and_then(parse_date);
            }
            Self::EncounterLocation { field, .. } => {
                actions.location = submission.value(field).and_then(|v| v.parse().ok());
            }
            Self::EncounterProvider { field, .. } => {
                actions.provider = submission.value(field).and_then(|v| v.parse().ok());
            }
            Self::EnrollInProgram {
                program,
                states,
                date_field,
            } => {
                let submitted = date_field
                    .as_deref()
                    .and_then(|f| submission.value(f))
                    .and_then(parse_date);
                actions.enrollments.push(EnrollmentRequest {
                    program: *program,
                    date: submitted.unwrap_or(ctx.today),
                    date_submitted: submitted.is_some(),
                    states: states.clone(),
                });
            }
            Self::CompleteProgram { program } => {
                actions.completions.push((*program, ctx.encounter_date));
            }
            Self::WorkflowState {
                program,
                workflow,
                field,
                ..
            } => {
                if let Some(state) = submission.value(field).and_then(|v| v.parse().ok()) {
                    actions.transitions.push(StateTransition {
                        program: *program,
                        workflow: *workflow,
                        state,
                        on: ctx.encounter_date,
                    });
                }
            }
            Self::Submit => {}
        }
    }
}

fn validate_date(
    field: &str,
    value: &str,
    today: NaiveDate,
    errors: &mut Vec<FormSubmissionError>,
) {
    match parse_date(value) {
        None => errors.push(FormSubmissionError::new(field, INVALID_DATE)),
        Some(date) if date > today => errors.push(FormSubmissionError::new(field, FUTURE_DATE)),
        Some(_) => {}
    }
}

fn validate_choice<T: FromStr + PartialEq>(
    submission: &FormSubmission,
    field: &str,
    choices: &[T],
    required: bool,
    errors: &mut Vec<FormSubmissionError>,
) {
    match submission.value(field) {
        None if required => errors.push(FormSubmissionError::new(field, REQUIRED)),
        None => {}
        Some(value) => {
            let valid = value
                .parse::<T>()
                .is_ok_and(|choice| choices.contains(&choice));
            if !valid {
                errors.push(FormSubmissionError::new(field, INVALID_SELECTION));
            }
        }
    }
}

/// Rejects forms whose tags set two different states of one workflow between them.
pub(crate) fn check_fixed_states(elements: &[FormElement]) -> FormEntryResult<()> {
    let mut seen: BTreeMap<WorkflowId, StateId> = BTreeMap::new();
    for (workflow, state) in elements.iter().flat_map(FormElement::fixed_states) {
        if let Some(previous) = seen.insert(*workflow, *state) {
            if previous != *state {
                return Err(FormEntryError::MultipleStatesInWorkflow {
                    workflow: *workflow,
                });
            }
        }
    }
    Ok(())
}
