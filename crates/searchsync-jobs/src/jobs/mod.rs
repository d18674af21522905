//! Job implementations.
//!
//! - `index`: add or remove an explicit list of documents
//! - `remove`: delete one record's document and refresh its dependents
//! - `reindex`: full sweep over every searchable class
//! - `clear`: bounded removal of every document in one index

pub mod clear;
pub mod index;
pub mod reindex;
pub mod remove;

pub use clear::ClearIndexJob;
pub use index::IndexJob;
pub use reindex::{
    LoggingProgressCallback, NoOpProgressCallback, ProgressCallback, ReindexJob, ReindexProgress,
};
pub use remove::RemoveRecordJob;
