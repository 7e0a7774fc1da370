use thiserror::Error;

/// Structural failures that abort a run. Per-record data problems are not
/// errors; they are collected as [`crate::models::DataWarning`] values and
/// reported alongside results.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("record at row {row} has no identity key; it cannot be matched across snapshots")]
    MissingIdentityKey { row: usize },

    #[error("duplicate identity key `{id}` in snapshot `{label}`")]
    DuplicateIdentityKey { id: String, label: String },

    #[error("current snapshot is empty; there is nothing to analyze")]
    EmptyCurrentSnapshot,
}
