//! Entity UUID utilities.
//!
//! Every entity in the form entry store (patients, programs, workflows, states, enrollments)
//! carries a UUID alongside its integer id. Form templates may reference programs, workflows and
//! states by either.
//!
//! The store uses a *canonical* UUID representation: **36 lowercase characters in the hyphenated
//! `8-4-4-4-12` layout**, for example `72a90efc-5140-11e1-a3e3-00248140a5eb`.
//!
//! Notes:
//! - This is the same value you get from `Uuid::new_v4().hyphenated().to_string()`.
//! - Externally supplied identifiers (template attributes, fixture files, CLI/API inputs) must
//!   already be canonical. Use [`EntityUuid::parse`] to validate them.
//! - Uppercase, simple (unhyphenated) and braced forms are rejected rather than normalised, so a
//!   reference in a template either matches a stored UUID byte-for-byte or fails loudly.

mod entity;

pub use entity::{EntityUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
