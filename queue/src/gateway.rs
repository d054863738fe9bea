//! Typed, retrying facade over the backing store (component A).
//!
//! A server owns two of these: one used only for the blocking dequeue call,
//! one for everything else, so a long `BRPOPLPUSH` wait can never stall
//! completions or recovery (see the ownership note in the data model).

use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;

use stoker_shutdown::ShutdownConsumer;
use stoker_storage::RedisPool;

use crate::error::Error;
use crate::job::{Job, JobDescriptor, JobState};
use crate::keys;
use crate::lua::{FailureOutcome, PromoteScheduledScript, RecordFailedScript};
use crate::redis_job_data::{hmget_descriptor_cmd, RedisJobSetCmd};

#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn announce_server(
        &self,
        server: &str,
        concurrency: usize,
        queue: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error>;

    async fn hide_server(&self, server: &str, cancel: &mut ShutdownConsumer) -> Result<(), Error>;

    async fn heartbeat(&self, server: &str, cancel: &mut ShutdownConsumer) -> Result<(), Error>;

    async fn requeue_processing_jobs(
        &self,
        server: &str,
        queue: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<usize, Error>;

    /// Blocks up to `timeout` waiting for a job. Does not take a cancellation
    /// token: the caller (the manager loop) is responsible for racing this
    /// against cancellation between calls, per the liveness-timeout design.
    async fn dequeue_job_id(
        &self,
        server: &str,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, Error>;

    async fn remove_processing_job(
        &self,
        server: &str,
        queue: &str,
        job_id: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error>;

    async fn promote_scheduled_jobs(&self, cancel: &mut ShutdownConsumer) -> Result<usize, Error>;

    async fn get_job_descriptor(
        &self,
        job_id: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<JobDescriptor, Error>;

    async fn record_processing(
        &self,
        job_id: &str,
        server: &str,
        queue: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error>;

    async fn record_succeeded(
        &self,
        job_id: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error>;

    async fn record_failed(
        &self,
        job_id: &str,
        message: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error>;

    async fn enqueue_job(&self, job: &Job<'_>, cancel: &mut ShutdownConsumer) -> Result<(), Error>;

    async fn schedule_job(&self, job: &Job<'_>, cancel: &mut ShutdownConsumer)
        -> Result<(), Error>;
}

/// Retry transient store errors with capped exponential backoff, forever,
/// checking cancellation between attempts. Logical errors fail fast.
async fn retry_with_backoff<T, F, Fut>(cancel: &mut ShutdownConsumer, mut f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut backoff = ExponentialBackoff {
        current_interval: Duration::from_millis(100),
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_secs(5),
        max_elapsed_time: None,
        ..Default::default()
    };

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let delay = match backoff.next_backoff() {
                    Some(delay) => delay,
                    None => return Err(e),
                };
                tokio::select! {
                    biased;
                    _ = cancel.wait_for_shutdown() => return Err(e),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Clone)]
pub struct RedisGateway {
    pool: RedisPool,
    default_max_retries: u32,
    default_retry_backoff: Duration,
}

impl RedisGateway {
    /// `default_max_retries`/`default_retry_backoff` are the server's
    /// configured retry policy (§6); they apply to any job enqueued or
    /// scheduled without an explicit `Job::with_retries` override.
    pub fn new(pool: RedisPool, default_max_retries: u32, default_retry_backoff: Duration) -> Self {
        RedisGateway {
            pool,
            default_max_retries,
            default_retry_backoff,
        }
    }
}

#[async_trait]
impl StorageGateway for RedisGateway {
    async fn announce_server(
        &self,
        server: &str,
        concurrency: usize,
        queue: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now().timestamp_millis();
            redis::pipe()
                .atomic()
                .cmd("ZADD")
                .arg(keys::SERVERS_SET)
                .arg(now)
                .arg(server)
                .ignore()
                .cmd("HSET")
                .arg(keys::server_meta(server))
                .arg("queue")
                .arg(queue)
                .arg("concurrency")
                .arg(concurrency as u64)
                .ignore()
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }

    async fn hide_server(&self, server: &str, cancel: &mut ShutdownConsumer) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            redis::pipe()
                .atomic()
                .cmd("ZREM")
                .arg(keys::SERVERS_SET)
                .arg(server)
                .ignore()
                .cmd("DEL")
                .arg(keys::server_meta(server))
                .ignore()
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }

    async fn heartbeat(&self, server: &str, cancel: &mut ShutdownConsumer) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now().timestamp_millis();
            redis::cmd("ZADD")
                .arg(keys::SERVERS_SET)
                .arg(now)
                .arg(server)
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }

    async fn requeue_processing_jobs(
        &self,
        server: &str,
        queue: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<usize, Error> {
        let processing_list = keys::processing_list(server, queue);
        let queue_list = keys::queue_list(queue);

        let mut moved = 0usize;
        loop {
            if cancel.shutting_down() {
                return Ok(moved);
            }

            let item: Option<String> = retry_with_backoff(cancel, || async {
                let mut conn = self.pool.get().await?;
                let item: Option<String> = redis::cmd("RPOPLPUSH")
                    .arg(&processing_list)
                    .arg(&queue_list)
                    .query_async(&mut *conn)
                    .await
                    .map_err(stoker_storage::Error::from)?;
                Ok(item)
            })
            .await?;

            match item {
                Some(_) => moved += 1,
                None => return Ok(moved),
            }
        }
    }

    async fn dequeue_job_id(
        &self,
        server: &str,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, Error> {
        let mut conn = self.pool.get().await?;
        let job_id: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(keys::queue_list(queue))
            .arg(keys::processing_list(server, queue))
            .arg(timeout.as_secs_f64())
            .query_async(&mut *conn)
            .await
            .map_err(stoker_storage::Error::from)?;
        Ok(job_id)
    }

    async fn remove_processing_job(
        &self,
        server: &str,
        queue: &str,
        job_id: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            redis::cmd("LREM")
                .arg(keys::processing_list(server, queue))
                .arg(0)
                .arg(job_id)
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }

    async fn promote_scheduled_jobs(&self, cancel: &mut ShutdownConsumer) -> Result<usize, Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now();
            PromoteScheduledScript::run(&mut *conn, &now).await
        })
        .await
    }

    async fn get_job_descriptor(
        &self,
        job_id: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<JobDescriptor, Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let job_key = keys::job_hash(job_id);
            let (target_type, method, payload, current_retries, max_retries): (
                Option<String>,
                Option<String>,
                Option<Vec<u8>>,
                Option<u32>,
                Option<u32>,
            ) = hmget_descriptor_cmd(&job_key)
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;

            let target_type = target_type.ok_or_else(|| {
                stoker_storage::Error::Malformed(format!("job {} has no descriptor", job_id))
            })?;
            let method = method.unwrap_or_default();
            let payload = payload.unwrap_or_default();

            Ok(JobDescriptor {
                id: job_id.to_string(),
                target_type,
                method,
                payload,
                current_retries: current_retries.unwrap_or(0),
                max_retries: max_retries.unwrap_or(0),
            })
        })
        .await
    }

    async fn record_processing(
        &self,
        job_id: &str,
        server: &str,
        queue: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now();
            RedisJobSetCmd::new(&keys::job_hash(job_id))
                .state(JobState::Processing)
                .server(server)
                .queue_name(queue)
                .started_at(&now)
                .build()
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }

    async fn record_succeeded(
        &self,
        job_id: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now();
            RedisJobSetCmd::new(&keys::job_hash(job_id))
                .state(JobState::Succeeded)
                .succeeded(true)
                .ended_at(&now)
                .build()
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }

    async fn record_failed(
        &self,
        job_id: &str,
        message: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now();
            match RecordFailedScript::run(&mut *conn, job_id, &now, message).await? {
                FailureOutcome::WillRetry { .. } => {}
                FailureOutcome::Exhausted { .. } => {}
            }
            Ok(())
        })
        .await
    }

    async fn enqueue_job(&self, job: &Job<'_>, cancel: &mut ShutdownConsumer) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now();
            let job_key = keys::job_hash(&job.id);
            let mut set_cmd = RedisJobSetCmd::new(&job_key)
                .target_type(&job.target_type)
                .method(&job.method)
                .payload(&job.payload)
                .current_retries(0)
                .max_retries(job.max_retries.unwrap_or(self.default_max_retries))
                .retry_backoff(job.retry_backoff.unwrap_or(self.default_retry_backoff))
                .queue_name(&job.queue_name)
                .state(JobState::Enqueued)
                .enqueued_at(&now);
            if let Some(timeout) = job.timeout {
                set_cmd = set_cmd.timeout(timeout);
            }

            redis::pipe()
                .atomic()
                .add_command(set_cmd.build())
                .ignore()
                .cmd("LPUSH")
                .arg(keys::queue_list(&job.queue_name))
                .arg(&job.id)
                .ignore()
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }

    async fn schedule_job(
        &self,
        job: &Job<'_>,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), Error> {
        retry_with_backoff(cancel, || async {
            let mut conn = self.pool.get().await?;
            let now = Utc::now();
            let run_at = job.run_at.unwrap_or(now);
            let job_key = keys::job_hash(&job.id);
            let mut set_cmd = RedisJobSetCmd::new(&job_key)
                .target_type(&job.target_type)
                .method(&job.method)
                .payload(&job.payload)
                .current_retries(0)
                .max_retries(job.max_retries.unwrap_or(self.default_max_retries))
                .retry_backoff(job.retry_backoff.unwrap_or(self.default_retry_backoff))
                .queue_name(&job.queue_name)
                .state(JobState::Scheduled)
                .run_at(&run_at)
                .enqueued_at(&now);
            if let Some(timeout) = job.timeout {
                set_cmd = set_cmd.timeout(timeout);
            }

            redis::pipe()
                .atomic()
                .add_command(set_cmd.build())
                .ignore()
                .cmd("ZADD")
                .arg(keys::SCHEDULE_SET)
                .arg(run_at.timestamp_millis())
                .arg(&job.id)
                .ignore()
                .query_async(&mut *conn)
                .await
                .map_err(stoker_storage::Error::from)?;
            Ok(())
        })
        .await
    }
}
