//! The job server runtime: announce, recover, dequeue, dispatch, and
//! shutdown, backed by a Redis-like store.
//!
//! This crate is the "hard part" described by the runtime's design: the
//! concurrency, cancellation, crash-recovery, and store-coordination core.
//! Dashboards, job producers, and concrete job activators/invokers are
//! external collaborators this crate only specifies trait boundaries for.

pub mod activator;
pub mod config;
pub mod drain;
pub mod error;
pub mod gateway;
pub mod heartbeat;
pub mod job;
pub mod keys;
pub mod manager;
pub mod pool;
pub mod poller;
mod lua;
mod redis_job_data;
pub mod worker;

pub use config::Config;
pub use error::Error;
pub use gateway::{RedisGateway, StorageGateway};
pub use job::{Job, JobDescriptor, JobId, JobState};
pub use manager::{Manager, State};
