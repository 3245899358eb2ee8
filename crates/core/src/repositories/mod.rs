//! Repository services over the shared store.
//!
//! Each repository is a cheap handle onto the [`DataStore`](crate::store::DataStore) and returns
//! owned copies, so callers never hold a lock. Lookups that also run inside submission
//! transactions live on [`Dataset`](crate::dataset::Dataset) and are shared by both paths.

pub mod concepts;
pub mod encounters;
pub mod forms;
pub mod patients;
pub mod programs;
