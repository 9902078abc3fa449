//! Analysis error types

/// Analysis result type
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Analysis error types
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("No {0} data found")]
    EmptyProjection(&'static str),

    #[error("Not enough data for {what}: need {needed}, have {have}")]
    InsufficientData {
        what: String,
        needed: usize,
        have: usize,
    },

    #[error("Matrix decomposition failed: {0}")]
    Decomposition(String),

    #[error("Invalid {what} threshold: {months} months")]
    InvalidThreshold { what: &'static str, months: i64 },

    #[error("Distribution error: {0}")]
    Distribution(String),
}
