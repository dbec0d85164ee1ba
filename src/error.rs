use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Whether a retry or fallback can reasonably be attempted.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AnalysisError::BackendUnavailable(_) | AnalysisError::BackendError(_)
        )
    }

    /// Stable kind tag used in API responses and failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "invalid_input",
            AnalysisError::BackendUnavailable(_) => "backend_unavailable",
            AnalysisError::BackendError(_) => "backend_error",
            AnalysisError::Persistence(_) => "persistence",
            AnalysisError::Config(_) => "config",
        }
    }
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::BackendError(err.to_string())
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AnalysisError::BackendUnavailable(err.to_string())
        } else {
            AnalysisError::BackendError(err.to_string())
        }
    }
}
