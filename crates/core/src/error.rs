use thiserror::Error;

/// Failures that abort an admission run.
///
/// Per-candidate problems never surface here; they become rejection reasons.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for AdmissionError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T, E = AdmissionError> = std::result::Result<T, E>;
