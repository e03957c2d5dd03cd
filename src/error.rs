use thiserror::Error;

/// Errors that can cross the task boundary. The daemon logs these and
/// continues to the next poll rather than propagating them further, except
/// where noted.
#[derive(Debug, Error)]
pub enum BunnyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("schema validation error: {0}")]
    SchemaValidation(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("SQL execution error: {0}")]
    SqlExecution(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BunnyError {
    fn from(e: std::io::Error) -> Self {
        BunnyError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BunnyError {
    fn from(e: serde_json::Error) -> Self {
        BunnyError::SchemaValidation(e.to_string())
    }
}

impl From<reqwest::Error> for BunnyError {
    fn from(e: reqwest::Error) -> Self {
        BunnyError::Transport(e.to_string())
    }
}

pub type BunnyResult<T> = Result<T, BunnyError>;
