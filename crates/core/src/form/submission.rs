//! Posted form values and the outcome of a submission.

use crate::model::{EncounterId, PatientProgramId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters posted with a form, keyed by widget field name.
///
/// A field may carry several values, as a browser posts for repeated inputs. Widgets read the
/// first non-blank one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSubmission {
    parameters: BTreeMap<String, Vec<String>>,
}

impl FormSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to `name`.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Replaces every value of `name`.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(name.into(), vec![value.into()]);
    }

    pub fn parameter_values(&self, name: &str) -> &[String] {
        self.parameters.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First non-blank value of `name`, trimmed.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.parameter_values(name)
            .iter()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }
}

impl From<BTreeMap<String, Vec<String>>> for FormSubmission {
    fn from(parameters: BTreeMap<String, Vec<String>>) -> Self {
        Self { parameters }
    }
}

/// A problem with one posted field. Field errors stop the submission before anything is saved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormSubmissionError {
    pub field: String,
    pub message: String,
}

impl FormSubmissionError {
    pub(crate) fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionResults {
    errors: Vec<FormSubmissionError>,
    encounter: Option<EncounterId>,
    encounter_created: bool,
    enrolled: Vec<PatientProgramId>,
}

impl SubmissionResults {
    pub(crate) fn rejected(errors: Vec<FormSubmissionError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    pub(crate) fn applied(
        encounter: Option<EncounterId>,
        encounter_created: bool,
        enrolled: Vec<PatientProgramId>,
    ) -> Self {
        Self {
            errors: Vec::new(),
            encounter,
            encounter_created,
            enrolled,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FormSubmissionError] {
        &self.errors
    }

    /// The encounter created or updated by the submission.
    pub fn encounter_id(&self) -> Option<EncounterId> {
        self.encounter
    }

    pub fn encounter_created(&self) -> bool {
        self.encounter_created
    }

    /// Enrollments created by the submission.
    pub fn enrolled(&self) -> &[PatientProgramId] {
        &self.enrolled
    }
}
