use thiserror::Error;

/// Failure reported by one of the backend collaborators (auth provider,
/// document store, blob store).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("sign-in rejected: {0}")]
    SignInRejected(String),

    #[error("document {0} not found")]
    NotFound(String),

    #[error("invalid blob path '{0}'")]
    InvalidPath(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;
