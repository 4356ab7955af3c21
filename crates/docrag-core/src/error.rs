use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An external collaborator (embedding, search, rerank, cache) failed.
    #[error("Collaborator '{name}' failed: {reason}")]
    Collaborator { name: String, reason: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn collaborator(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Collaborator { name: name.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
