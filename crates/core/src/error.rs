use crate::model::{
    EncounterId, PatientId, PatientProgramId, PatientStateId, ProgramId, StateId, WorkflowId,
};
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum FormEntryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid form template: {0}")]
    Template(#[from] htmlform::MarkupError),
    #[error("invalid text: {0}")]
    Text(#[from] formentry_types::TextError),
    #[error("invalid uuid: {0}")]
    Uuid(#[from] formentry_uuid::UuidError),

    #[error("<{tag}> requires the '{attribute}' attribute")]
    MissingAttribute { tag: String, attribute: String },
    #[error("<{tag}> has an invalid '{attribute}' value: {value}")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        value: String,
    },

    #[error("patient {0} not found")]
    UnknownPatient(PatientId),
    #[error("encounter {0} not found")]
    UnknownEncounter(EncounterId),
    #[error("patient program {0} not found")]
    UnknownPatientProgram(PatientProgramId),
    #[error("form '{0}' not found")]
    UnknownForm(String),
    #[error("invalid form name: {0}")]
    InvalidFormName(String),
    #[error("cannot find program '{0}'")]
    UnknownProgram(String),
    #[error("cannot find workflow '{0}'")]
    UnknownWorkflow(String),
    #[error("cannot find state '{reference}' in program {program}")]
    UnknownState {
        program: ProgramId,
        reference: String,
    },

    #[error("more than one state selected for workflow {workflow}")]
    MultipleStatesInWorkflow { workflow: WorkflowId },
    #[error(
        "patient {patient} is not enrolled in program {program} and state {state} is not an initial state"
    )]
    NonInitialState {
        patient: PatientId,
        program: ProgramId,
        state: StateId,
    },
    #[error(
        "patient {patient} was enrolled in program {program} until {completed}; a new enrollment cannot start on {date}"
    )]
    OverlappingEnrollment {
        patient: PatientId,
        program: ProgramId,
        date: NaiveDate,
        completed: NaiveDate,
    },
    #[error(
        "enrollment date {date} is after the completion date {completed} of patient program {patient_program}"
    )]
    EnrollmentDateAfterCompletion {
        patient_program: PatientProgramId,
        date: NaiveDate,
        completed: NaiveDate,
    },
    #[error(
        "cannot change workflow {workflow} on {date}: the current state started on {current_start}"
    )]
    TransitionBeforeCurrentState {
        workflow: WorkflowId,
        date: NaiveDate,
        current_start: NaiveDate,
    },
    #[error("patient {patient} has more than one active enrollment in program {program}")]
    MultipleActiveEnrollments {
        patient: PatientId,
        program: ProgramId,
    },
    #[error("patient state {0} refers to a workflow or state outside its program")]
    InconsistentPatientState(PatientStateId),
    #[error("forms opened in view mode cannot be submitted")]
    ViewModeSubmission,

    #[error("dataset schema mismatch at {path}: {message}")]
    DatasetSchema { path: String, message: String },
    #[error("dataset references missing {kind} {id}")]
    DanglingReference { kind: &'static str, id: String },
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
}

pub type FormEntryResult<T> = std::result::Result<T, FormEntryError>;
