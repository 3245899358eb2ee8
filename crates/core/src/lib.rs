//! # Form Entry Core
//!
//! Core business logic for program enrollment through HTML forms.
//!
//! This crate contains pure data operations:
//! - the domain model (patients, programs, workflows, states, enrollments, encounters)
//! - YAML dataset fixtures and a transactional in-memory store
//! - repository services over the store
//! - the form engine: template tags, widgets, sessions and submissions
//!
//! **No API concerns**: HTTP servers and command line handling belong in `api-rest` and
//! `formentry-cli`.

pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod form;
pub mod model;
pub mod repositories;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CoreConfig;
pub use dataset::Dataset;
pub use error::{FormEntryError, FormEntryResult};
pub use form::{
    FormEntrySession, FormSubmission, FormSubmissionError, Mode, SessionOptions,
    SubmissionResults,
};
pub use formentry_types::NonEmptyText;
pub use formentry_uuid::EntityUuid;
pub use repositories::concepts::ConceptRepository;
pub use repositories::encounters::EncounterRepository;
pub use repositories::forms::FormRepository;
pub use repositories::patients::PatientRepository;
pub use repositories::programs::{PatientProgramQuery, ProgramRepository};
pub use store::DataStore;
