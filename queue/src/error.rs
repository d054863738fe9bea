use thiserror::Error;

/// Errors raised by the job runtime. Store errors bubble up through
/// [`Error::Storage`] and keep their own transience classification; everything
/// else here is a runtime-level failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] stoker_storage::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("no activator registered for target type {0:?}")]
    UnknownTargetType(String),

    #[error("no invoker registered for {0:?}::{1:?}")]
    UnknownMethod(String, String),

    #[error("job failed: {0}")]
    JobFailed(String),
}

impl Error {
    /// Mirrors [`stoker_storage::Error::is_transient`] for the one variant that
    /// wraps a store error; every other variant here is a logical error and is
    /// never worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}
