use thiserror::Error;

/// Failure to read an imported document. Structurally valid JSON never
/// produces one: the normalizer repairs every field shape.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("payload is empty")]
    Empty,
    #[error("payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a transform session did not start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionRejected {
    #[error("another transform session is already active")]
    AlreadyActive,
    #[error("token {0} is locked")]
    TokenLocked(String),
    #[error("token {0} does not exist")]
    UnknownToken(String),
    #[error("map image size is not known yet")]
    NoMapSize,
}
