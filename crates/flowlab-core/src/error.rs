use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Rejected at `configure` time; the source must not be started.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SourceError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SourceError::InvalidConfiguration(reason.into())
    }
}
