//! Test harness for running forms against the regression dataset.

use crate::config::{resolve_form_dir, CoreConfig};
use crate::form::{FormEntrySession, FormSubmission, Mode, SessionOptions};
use crate::model::{EncounterId, PatientId};
use crate::repositories::forms::FormRepository;
use crate::repositories::programs::ProgramRepository;
use crate::store::DataStore;
use crate::FormEntryResult;
use chrono::NaiveDate;
use std::sync::Arc;

pub(crate) const REGRESSION_DATASET: &str = include_str!("../fixtures/regression-dataset.yaml");
pub(crate) const OTHER_PATIENT_STATES: &str =
    include_str!("../fixtures/other-patient-states.yaml");

/// Date every harness session treats as today.
pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2012, 2, 15).expect("valid date")
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(crate) struct RegressionHarness {
    pub store: DataStore,
    forms: FormRepository,
}

impl RegressionHarness {
    pub(crate) fn new() -> Self {
        let store = DataStore::from_yaml(REGRESSION_DATASET).expect("regression dataset");
        let form_dir = resolve_form_dir(None).expect("forms directory");
        let cfg = CoreConfig::new(form_dir, None, false).expect("config");
        Self {
            store,
            forms: FormRepository::new(Arc::new(cfg)),
        }
    }

    /// Loads an additional fixture on top of the regression dataset.
    pub(crate) fn with_dataset(self, text: &str) -> Self {
        self.store.execute_dataset(text).expect("fixture");
        self
    }

    pub(crate) fn programs(&self) -> ProgramRepository {
        ProgramRepository::new(self.store.clone())
    }

    fn options(form: &str) -> SessionOptions {
        SessionOptions::new()
            .with_today(today())
            .with_form_name(form)
    }

    pub(crate) fn enter(&self, form: &str, patient: u32) -> FormEntryResult<FormEntrySession> {
        let template = self.forms.load(form)?;
        FormEntrySession::new(
            self.store.clone(),
            PatientId(patient),
            &template,
            Self::options(form),
        )
    }

    pub(crate) fn open_encounter(
        &self,
        form: &str,
        encounter: u32,
        mode: Mode,
    ) -> FormEntryResult<FormEntrySession> {
        let template = self.forms.load(form)?;
        FormEntrySession::for_encounter(
            self.store.clone(),
            EncounterId(encounter),
            mode,
            &template,
            Self::options(form),
        )
    }

    pub(crate) fn from_text(&self, text: &str, patient: u32) -> FormEntryResult<FormEntrySession> {
        FormEntrySession::from_text(
            self.store.clone(),
            PatientId(patient),
            text,
            SessionOptions::new().with_today(today()),
        )
    }
}

/// Builds a submission from `(label, value)` pairs, as a user filling in the rendered form would.
pub(crate) fn fill(session: &FormEntrySession, values: &[(&str, &str)]) -> FormSubmission {
    let mut submission = FormSubmission::new();
    for (label, value) in values {
        let field = session
            .widget_field(label)
            .unwrap_or_else(|| panic!("no widget labelled {label:?}"));
        submission.set_parameter(field, *value);
    }
    submission
}

/// The encounter fields every regression form carries.
pub(crate) fn encounter_fields(encounter_date: &str) -> Vec<(&str, &str)> {
    vec![
        ("Encounter Date:", encounter_date),
        ("Encounter Location:", "2"),
        ("Encounter Provider:", "502"),
    ]
}
