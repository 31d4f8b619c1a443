use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage failures. Probe failures are never reported through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open metrics database: {0}")]
    Open(String),

    #[error("failed to write probe result: {0}")]
    Write(String),

    #[error("failed to read probe results: {0}")]
    Read(String),

    #[error("corrupt probe row: {0}")]
    Corrupt(String),

    #[error("storage task failed: {0}")]
    Task(String),
}
