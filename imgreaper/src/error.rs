use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaperError {
    /// Bad or missing settings. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A registry or cluster listing failed. Aborts the current pass only.
    #[error("{service} unavailable: {reason}")]
    CollaboratorUnavailable {
        service: &'static str,
        reason: String,
    },

    /// One manifest could not be deleted. The pass continues.
    #[error("Failed to delete {repository}@{digest}: {reason}")]
    DeleteFailed {
        repository: String,
        digest: String,
        reason: String,
    },

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ReaperError {
    pub fn unavailable(service: &'static str, reason: impl ToString) -> Self {
        ReaperError::CollaboratorUnavailable {
            service,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaperError>;

impl From<ConfigError> for ReaperError {
    fn from(err: ConfigError) -> Self {
        ReaperError::Config(err.to_string())
    }
}
