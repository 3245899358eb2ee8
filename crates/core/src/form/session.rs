//! A form opened for one patient.

use super::actions::{ActionTarget, FormSubmissionActions};
use super::context::{Mode, WidgetRegistry};
use super::submission::{FormSubmission, SubmissionResults};
use super::tags::{check_fixed_states, BuildContext, FormElement, SubmitContext};
use crate::dataset::Dataset;
use crate::model::{EncounterId, PatientId};
use crate::store::DataStore;
use crate::validation::parse_date;
use crate::{FormEntryError, FormEntryResult};
use chrono::{NaiveDate, Utc};
use htmlform::{decode_entities, FormTemplate, Node};
use std::collections::BTreeMap;

/// Settings that do not come from the template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    today: NaiveDate,
    form_name: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            today: Utc::now().date_naive(),
            form_name: None,
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the current date, which bounds posted dates and fills in missing ones.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Name recorded on encounters created through the session.
    pub fn with_form_name(mut self, name: impl Into<String>) -> Self {
        self.form_name = Some(name.into());
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn form_name(&self) -> Option<&str> {
        self.form_name.as_deref()
    }
}

/// A form template bound to a patient, ready to render and accept submissions.
///
/// Tags are resolved and checked against the store when the session is built, so a template
/// naming an unknown program, two states of one workflow, or a non-initial state for a patient
/// who is not enrolled fails here rather than on submission.
#[derive(Clone, Debug)]
pub struct FormEntrySession {
    store: DataStore,
    mode: Mode,
    patient: PatientId,
    encounter: Option<EncounterId>,
    encounter_date: Option<NaiveDate>,
    options: SessionOptions,
    elements: Vec<FormElement>,
    html: String,
    widgets: BTreeMap<String, String>,
}

impl FormEntrySession {
    /// Opens `template` to enter a new encounter for `patient`.
    pub fn new(
        store: DataStore,
        patient: PatientId,
        template: &FormTemplate,
        options: SessionOptions,
    ) -> FormEntryResult<Self> {
        Self::build(store, Mode::Enter, patient, None, template, options)
    }

    /// Parses `text` and opens it to enter a new encounter for `patient`.
    pub fn from_text(
        store: DataStore,
        patient: PatientId,
        text: &str,
        options: SessionOptions,
    ) -> FormEntryResult<Self> {
        let template = FormTemplate::parse(text)?;
        Self::new(store, patient, &template, options)
    }

    /// Opens `template` on an existing encounter, for editing or viewing.
    pub fn for_encounter(
        store: DataStore,
        encounter: EncounterId,
        mode: Mode,
        template: &FormTemplate,
        options: SessionOptions,
    ) -> FormEntryResult<Self> {
        if mode == Mode::Enter {
            return Err(FormEntryError::InvalidInput(
                "an existing encounter is opened in edit or view mode".into(),
            ));
        }
        let patient = store
            .read(|d| d.encounter(encounter).filter(|e| !e.voided).map(|e| e.patient))
            .ok_or(FormEntryError::UnknownEncounter(encounter))?;
        Self::build(store, mode, patient, Some(encounter), template, options)
    }

    fn build(
        store: DataStore,
        mode: Mode,
        patient: PatientId,
        encounter: Option<EncounterId>,
        template: &FormTemplate,
        options: SessionOptions,
    ) -> FormEntryResult<Self> {
        let (elements, html, widgets, encounter_date) = store.read(|dataset| {
            build_form(dataset, mode, patient, encounter, template, options.today)
        })?;
        tracing::debug!(
            patient = %patient,
            mode = %mode,
            widgets = widgets.len(),
            "form session built"
        );

        Ok(Self {
            store,
            mode,
            patient,
            encounter,
            encounter_date,
            options,
            elements,
            html,
            widgets,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn patient(&self) -> PatientId {
        self.patient
    }

    pub fn encounter(&self) -> Option<EncounterId> {
        self.encounter
    }

    pub fn html_to_display(&self) -> &str {
        &self.html
    }

    /// Field name of the widget rendered after `label`.
    pub fn widget_field(&self, label: &str) -> Option<&str> {
        self.widgets.get(label.trim()).map(String::as_str)
    }

    /// Every labelled widget, label to field name.
    pub fn widget_fields(&self) -> &BTreeMap<String, String> {
        &self.widgets
    }

    /// Validates and applies a submission.
    ///
    /// Field problems come back as errors in [`SubmissionResults`] and nothing is saved. Any
    /// [`FormEntryError`] raised while applying the changes rolls the whole submission back.
    ///
    /// # Errors
    ///
    /// Returns [`FormEntryError::ViewModeSubmission`] for a session opened in view mode, or the
    /// error that aborted the transaction.
    pub fn submit(&self, submission: &FormSubmission) -> FormEntryResult<SubmissionResults> {
        if self.mode == Mode::View {
            return Err(FormEntryError::ViewModeSubmission);
        }

        let today = self.options.today;
        let mut errors = Vec::new();
        for element in &self.elements {
            element.validate(submission, today, &mut errors);
        }
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "submission has field errors");
            return Ok(SubmissionResults::rejected(errors));
        }

        let posted_encounter_date = self
            .elements
            .iter()
            .find_map(FormElement::encounter_date_field)
            .and_then(|field| submission.value(field))
            .and_then(parse_date);
        let ctx = SubmitContext {
            today,
            encounter_date: posted_encounter_date
                .or(self.encounter_date)
                .unwrap_or(today),
        };

        let mut actions = FormSubmissionActions::default();
        for element in &self.elements {
            element.record(submission, &ctx, &mut actions);
        }

        let target = ActionTarget {
            patient: self.patient,
            mode: self.mode,
            encounter: self.encounter,
            form_name: self.options.form_name(),
        };
        let applied = self
            .store
            .transaction(|dataset| actions.apply(dataset, &target))?;

        Ok(SubmissionResults::applied(
            applied.encounter,
            applied.encounter_created,
            applied.enrolled,
        ))
    }
}

type BuiltForm = (
    Vec<FormElement>,
    String,
    BTreeMap<String, String>,
    Option<NaiveDate>,
);

fn build_form(
    dataset: &Dataset,
    mode: Mode,
    patient: PatientId,
    encounter: Option<EncounterId>,
    template: &FormTemplate,
    today: NaiveDate,
) -> FormEntryResult<BuiltForm> {
    if dataset.patient(patient).is_none() {
        return Err(FormEntryError::UnknownPatient(patient));
    }
    let encounter = encounter
        .map(|id| dataset.encounter(id).ok_or(FormEntryError::UnknownEncounter(id)))
        .transpose()?;

    let mut ctx = BuildContext {
        dataset,
        mode,
        patient,
        encounter,
        today,
        widgets: WidgetRegistry::default(),
    };
    let mut html = String::new();
    let mut elements = Vec::new();
    render_nodes(template.children(), &mut ctx, &mut html, &mut elements)?;
    check_fixed_states(&elements)?;

    Ok((
        elements,
        html,
        ctx.widgets.into_labels(),
        encounter.map(|e| e.date),
    ))
}

fn render_nodes(
    nodes: &[Node],
    ctx: &mut BuildContext<'_>,
    html: &mut String,
    elements: &mut Vec<FormElement>,
) -> FormEntryResult<()> {
    for node in nodes {
        match node {
            Node::Text(raw) => {
                ctx.widgets.observe_text(&decode_entities(raw));
                html.push_str(raw);
            }
            Node::Comment(_) => {}
            Node::Element(el) => match FormElement::build(el, ctx)? {
                Some((element, rendered)) => {
                    html.push_str(&rendered);
                    elements.push(element);
                }
                None => {
                    html.push_str(&el.start_tag());
                    if is_raw_text(&el.name) {
                        html.push_str(&el.text_content());
                    } else {
                        render_nodes(&el.children, ctx, html, elements)?;
                    }
                    html.push_str(&el.end_tag());
                }
            },
        }
    }
    Ok(())
}

/// Script and style bodies are copied through and never label a widget.
fn is_raw_text(name: &str) -> bool {
    name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style")
}
