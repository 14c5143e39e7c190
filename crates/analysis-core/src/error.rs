use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The raw price table breaks a structural invariant (empty, unordered,
    /// duplicated dates, too few rows). Fatal to the request.
    #[error("Invalid input data: {0}")]
    InvalidInputData(String),

    #[error("Insufficient history: {0}")]
    InsufficientHistory(String),

    /// The price source returned nothing for the requested symbols/range.
    #[error("No data available: {0}")]
    NoDataAvailable(String),

    #[error("Numeric degenerate: {0}")]
    NumericDegenerate(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl AnalysisError {
    /// True for errors caused by the caller's input rather than by upstream
    /// services or numeric edge cases.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidInputData(_) | AnalysisError::InsufficientHistory(_)
        )
    }
}
