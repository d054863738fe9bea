use thiserror::Error;

/// Errors raised while talking to the backing store.
///
/// The [`Error::is_transient`] classification is what lets the retrying gateway in
/// `stoker-queue` distinguish "try again with backoff" from "fail fast to the caller".
#[derive(Debug, Error)]
pub enum Error {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis connection pool error: {0}")]
    Pool(#[from] deadpool::managed::PoolError<redis::RedisError>),

    #[error("redis pool configuration error: {0}")]
    PoolCreation(#[from] deadpool_redis::CreatePoolError),

    #[error("malformed store data: {0}")]
    Malformed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Transient errors (connection loss, timeouts) are worth retrying with backoff.
    /// Logical errors (malformed data, bad configuration) are not: retrying a parse
    /// failure just wastes the backoff budget on an error that can't resolve itself.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Redis(e) => e.is_connection_dropped() || e.is_timeout() || e.is_io_error(),
            Error::Pool(_) => true,
            Error::PoolCreation(_) | Error::Malformed(_) | Error::Config(_) => false,
        }
    }
}
