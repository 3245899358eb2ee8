//! The form engine: sessions, tags, widgets and submission handling.

mod actions;
mod context;
mod resolve;
mod session;
mod submission;
mod tags;
mod widget;


pub use context::Mode;
pub use session::{FormEntrySession, SessionOptions};
pub use submission::{FormSubmission, FormSubmissionError, SubmissionResults};
