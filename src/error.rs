//! Error type shared by the feature space, the optimizer and the I/O collaborators.

use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BornAgainError>;

#[derive(Debug, thiserror::Error)]
pub enum BornAgainError {
    /// The objective id is not one of the supported variants (0, 1, 2, 4, 5).
    #[error("non recognized objective: {0}")]
    UnknownObjective(i32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid random forest: {0}")]
    InvalidForest(String),

    /// The reconstruction (or the heuristic) could not find a split consistent with
    /// the values it computed. Never expected for well-formed inputs.
    #[error("internal inconsistency while {stage}: {detail}")]
    InternalInconsistency { stage: &'static str, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
