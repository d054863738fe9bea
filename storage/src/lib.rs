//! Thin wrapper around [`deadpool_redis::Pool`] plus the error type the rest of the
//! workspace shares. Kept as its own crate so the connection pool can be constructed
//! once and handed to both the blocking and non-blocking gateways a server owns.

pub mod error;

pub use error::Error;

use std::{env, ops::Deref, sync::Arc};

/// A cheaply-clonable handle to a Redis connection pool.
#[derive(Clone)]
pub struct RedisPool(Arc<RedisPoolInner>);

struct RedisPoolInner {
    pool: deadpool_redis::Pool,
}

impl Deref for RedisPool {
    type Target = deadpool_redis::Pool;

    fn deref(&self) -> &Self::Target {
        &self.0.pool
    }
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool").finish_non_exhaustive()
    }
}

impl RedisPool {
    /// Build a pool from an explicit connection string, falling back to `REDIS_URL`.
    pub fn new(connection: Option<String>) -> Result<RedisPool, Error> {
        let redis_url = connection
            .or_else(|| env::var("REDIS_URL").ok())
            .ok_or_else(|| Error::Config("REDIS_URL is required".to_string()))?;

        let pool = deadpool_redis::Config {
            url: Some(redis_url),
            connection: None,
            pool: None,
        }
        .create_pool()?;

        Ok(RedisPool(Arc::new(RedisPoolInner { pool })))
    }

    pub fn pool(&self) -> &deadpool_redis::Pool {
        &self.0.pool
    }

    pub async fn get(&self) -> Result<deadpool_redis::Connection, Error> {
        self.0.pool.get().await.map_err(Error::from)
    }
}
