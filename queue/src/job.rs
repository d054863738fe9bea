use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{borrow::Cow, time::Duration};

/// A job as an external producer submits it: target type and method to invoke,
/// plus serialized arguments. Identity is immutable once created; everything
/// else the runtime tracks about a job lives in the store, not here.
#[derive(Default)]
pub struct Job<'a> {
    pub id: String,
    pub target_type: String,
    pub method: String,
    pub payload: Cow<'a, [u8]>,
    pub queue_name: String,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub retry_backoff: Option<Duration>,
    pub run_at: Option<DateTime<Utc>>,
}

impl<'a> std::fmt::Debug for Job<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("target_type", &self.target_type)
            .field("method", &self.method)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .field("queue_name", &self.queue_name)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("run_at", &self.run_at)
            .finish()
    }
}

/// Determines how to generate a job ID.
pub enum JobId<'a> {
    /// Autogenerate a v4 UUID.
    Auto,
    /// Concatenate the given prefix with a v4 UUID.
    Prefix(&'a str),
    /// Use this value as the job ID. It's up to you to make sure that the ID
    /// is unique.
    Value(&'a str),
}

impl<'a> JobId<'a> {
    pub fn make_id(&self) -> String {
        match self {
            JobId::Auto => uuid::Uuid::new_v4().to_string(),
            JobId::Prefix(prefix) => format!("{}:{}", prefix, uuid::Uuid::new_v4()),
            JobId::Value(s) => s.to_string(),
        }
    }
}

impl<'a> Job<'a> {
    pub fn new(
        id: JobId<'_>,
        queue_name: impl Into<String>,
        target_type: impl Into<String>,
        method: impl Into<String>,
        payload: Cow<'a, [u8]>,
    ) -> Job<'a> {
        Job {
            id: id.make_id(),
            target_type: target_type.into(),
            method: method.into(),
            payload,
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    pub fn from_json_payload<T: Serialize>(
        id: JobId<'_>,
        queue_name: impl Into<String>,
        target_type: impl Into<String>,
        method: impl Into<String>,
        payload: &T,
    ) -> Result<Job<'static>, serde_json::Error> {
        let data = serde_json::to_vec(&payload)?;
        Ok(Job {
            id: id.make_id(),
            target_type: target_type.into(),
            method: method.into(),
            payload: Cow::Owned(data),
            queue_name: queue_name.into(),
            ..Default::default()
        })
    }

    pub fn scheduled_for(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = Some(max_retries);
        self.retry_backoff = Some(backoff);
        self
    }
}

/// What the worker reads back from the store before activating and invoking a job.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub id: String,
    pub target_type: String,
    pub method: String,
    pub payload: Vec<u8>,
    pub current_retries: u32,
    pub max_retries: u32,
}

/// Set-at-most-once job lifecycle state, persisted as the `stt` hash field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Enqueued,
    Scheduled,
    Processing,
    Succeeded,
    Failed,
}

impl JobState {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Enqueued => "enqueued",
            JobState::Scheduled => "scheduled",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl redis::ToRedisArgs for JobState {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + redis::RedisWrite,
    {
        out.write_arg(self.as_str().as_bytes())
    }
}
