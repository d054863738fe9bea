use std::time::Duration;

use crate::error::Error;

/// Construction-time options for a [`crate::manager::Manager`]. Validated once,
/// at construction, so a misconfigured server fails fast instead of misbehaving
/// at runtime (error taxonomy class 1).
#[derive(Debug, Clone)]
pub struct Config {
    pub server_name: String,
    pub queue_name: String,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub dequeue_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Config {
    pub fn new(server_name: impl Into<String>) -> Config {
        Config {
            server_name: server_name.into(),
            queue_name: "default".to_string(),
            concurrency: num_cpus::get() * 2,
            poll_interval: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(30),
            dequeue_timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_backoff: Duration::from_secs(30),
        }
    }

    /// Load options from the environment, falling back to the defaults above.
    /// `server_name` has no environment default: it is cluster-unique identity
    /// and must be supplied by the caller.
    pub fn from_env(server_name: impl Into<String>) -> Result<Config, Error> {
        let mut config = Config::new(server_name);

        config.queue_name = envoption::with_default("QUEUE_NAME", config.queue_name)
            .map_err(|e| Error::Validation(e.to_string()))?;
        config.concurrency = envoption::with_default("CONCURRENCY", config.concurrency)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let poll_interval_secs: u64 = envoption::with_default(
            "POLL_INTERVAL_SECS",
            config.poll_interval.as_secs(),
        )
        .map_err(|e| Error::Validation(e.to_string()))?;
        config.poll_interval = Duration::from_secs(poll_interval_secs);

        let heartbeat_interval_secs: u64 = envoption::with_default(
            "HEARTBEAT_INTERVAL_SECS",
            config.heartbeat_interval.as_secs(),
        )
        .map_err(|e| Error::Validation(e.to_string()))?;
        config.heartbeat_interval = Duration::from_secs(heartbeat_interval_secs);

        let dequeue_timeout_secs: u64 = envoption::with_default(
            "DEQUEUE_TIMEOUT_SECS",
            config.dequeue_timeout.as_secs(),
        )
        .map_err(|e| Error::Validation(e.to_string()))?;
        config.dequeue_timeout = Duration::from_secs(dequeue_timeout_secs);

        config.max_retries = envoption::with_default("MAX_RETRIES", config.max_retries)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let retry_backoff_secs: u64 = envoption::with_default(
            "RETRY_BACKOFF_SECS",
            config.retry_backoff.as_secs(),
        )
        .map_err(|e| Error::Validation(e.to_string()))?;
        config.retry_backoff = Duration::from_secs(retry_backoff_secs);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.server_name.is_empty() {
            return Err(Error::Validation("server_name must not be empty".into()));
        }
        if self.queue_name.is_empty() {
            return Err(Error::Validation("queue_name must not be empty".into()));
        }
        if self.concurrency < 1 {
            return Err(Error::Validation("concurrency must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Validation("poll_interval must be positive".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Validation(
                "heartbeat_interval must be positive".into(),
            ));
        }
        if self.dequeue_timeout.is_zero() {
            return Err(Error::Validation("dequeue_timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::new("s1").validate().unwrap();
    }

    #[test]
    fn rejects_empty_server_name() {
        let config = Config::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = Config::new("s1");
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut config = Config::new("s1");
        config.poll_interval = Duration::from_secs(0);
        assert!(config.validate().is_err());
    }
}
