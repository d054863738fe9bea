//! Server loop (component F): announce, recover, dequeue, dispatch, shutdown.
//!
//! State machine: `Init -> Announced -> Recovering -> Dispatching -> Stopping -> Stopped`.
//! Grounded on the teacher's `cmd/server.rs` construction/wiring order, with
//! the actix-web-specific plumbing stripped out and the dequeue loop replaced
//! per the blocking-BRPOPLPUSH decision documented in the design ledger.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use stoker_shutdown::{Shutdown, ShutdownConsumer};
use stoker_storage::RedisPool;

use crate::activator::{JobActivator, JobInvoker};
use crate::config::Config;
use crate::error::Error;
use crate::gateway::{RedisGateway, StorageGateway};
use crate::pool::WorkerPool;
use crate::worker::Worker;
use crate::{drain, heartbeat, poller};

/// A point in the §4.F state machine. Exposed via [`Manager::state`] for
/// observability and tests; every transition is also logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Announced,
    Recovering,
    Dispatching,
    Stopping,
    Stopped,
}

/// Owns the full server runtime for one `(serverName, queueName)` pair.
pub struct Manager {
    config: Config,
    shutdown: Shutdown,
    blocking_gateway: Arc<dyn StorageGateway>,
    gateway: Arc<dyn StorageGateway>,
    activator: Arc<dyn JobActivator>,
    invoker: Arc<dyn JobInvoker>,
    state: State,
}

impl Manager {
    /// INIT: validate arguments and construct components. Two gateway
    /// instances share the same connection pool but are logically distinct
    /// so a blocking `DequeueJobId` can never stall the completion drain.
    pub fn new(
        config: Config,
        pool: RedisPool,
        activator: Arc<dyn JobActivator>,
        invoker: Arc<dyn JobInvoker>,
    ) -> Result<Manager, Error> {
        config.validate()?;

        let blocking_gateway = Arc::new(RedisGateway::new(
            pool.clone(),
            config.max_retries,
            config.retry_backoff,
        ));
        let gateway = Arc::new(RedisGateway::new(
            pool,
            config.max_retries,
            config.retry_backoff,
        ));

        Ok(Manager {
            config,
            shutdown: Shutdown::new(),
            blocking_gateway,
            gateway,
            activator,
            invoker,
            state: State::Init,
        })
    }

    /// A consumer that observes this manager's shared cancellation source.
    /// Exposed so an embedder can trigger shutdown externally (e.g. from a
    /// signal handler shared with other subsystems).
    pub fn shutdown_consumer(&self) -> ShutdownConsumer {
        self.shutdown.consumer()
    }

    /// The manager's current point in the §4.F state machine.
    pub fn state(&self) -> State {
        self.state
    }

    fn set_state(&mut self, state: State) {
        debug!(server = %self.config.server_name, ?state, "manager state transition");
        self.state = state;
    }

    pub async fn run(mut self) -> Result<(), Error> {
        self.set_state(State::Announced);
        let server = self.config.server_name.clone();
        let queue = self.config.queue_name.clone();
        let mut cancel = self.shutdown.consumer();

        info!(server = %server, queue = %queue, concurrency = self.config.concurrency, "manager starting");

        self.gateway
            .announce_server(&server, self.config.concurrency, &queue, &mut cancel)
            .await?;

        self.set_state(State::Recovering);
        if !cancel.shutting_down() {
            match self
                .gateway
                .requeue_processing_jobs(&server, &queue, &mut cancel)
                .await
            {
                Ok(n) if n > 0 => info!(count = n, "requeued abandoned jobs on recovery"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "failed to requeue abandoned jobs"),
            }
        }

        let poller_handle = poller::spawn(
            self.gateway.clone(),
            self.config.poll_interval,
            self.shutdown.consumer(),
        );
        let heartbeat_handle = heartbeat::spawn(
            self.gateway.clone(),
            server.clone(),
            self.config.heartbeat_interval,
            self.shutdown.consumer(),
        );

        let worker = Worker::new(
            server.clone(),
            queue.clone(),
            self.shutdown.consumer(),
            self.gateway.clone(),
            self.activator.clone(),
            self.invoker.clone(),
        );
        let (pool, completions) = WorkerPool::new(self.config.concurrency, worker);

        let drain_handle = drain::spawn(
            self.gateway.clone(),
            server.clone(),
            queue.clone(),
            completions,
            self.shutdown.consumer(),
        );

        self.set_state(State::Dispatching);
        self.dispatch_loop(&pool, &mut cancel).await;

        self.set_state(State::Stopping);
        info!("shutdown requested, stopping manager loop");

        poller_handle.abort();
        heartbeat_handle.abort();

        pool.dispose().await;
        // Drop the pool (and with it, the worker pool's completion sender)
        // so the drain task's channel closes and it can exit.
        drop(pool);

        if let Err(e) = drain_handle.await {
            warn!(error = %e, "completion drain task panicked");
        }

        let mut cancel = self.shutdown.consumer();
        if let Err(e) = self.gateway.hide_server(&server, &mut cancel).await {
            error!(error = %e, "failed to hide server on shutdown");
        }

        self.set_state(State::Stopped);
        info!(server = %server, "server hidden, manager stopped");

        Ok(())
    }

    /// RECOVERING -> DISPATCHING main loop: take a free worker, dequeue a job
    /// id with a liveness timeout, dispatch, repeat.
    async fn dispatch_loop(&self, pool: &WorkerPool, cancel: &mut ShutdownConsumer) {
        loop {
            let worker = match pool.take_free(cancel).await {
                Some(worker) => worker,
                None => return,
            };

            let job_id = match self.dequeue_with_retry(cancel).await {
                Some(id) => id,
                None => return,
            };

            worker.process(job_id);
        }
    }

    /// Calls `DequeueJobId` in a loop until either a job id is obtained or
    /// cancellation fires. The configured `dequeue_timeout` is a liveness
    /// device: it bounds how long any one blocking call can run before this
    /// loop gets a chance to observe cancellation again.
    async fn dequeue_with_retry(&self, cancel: &mut ShutdownConsumer) -> Option<String> {
        loop {
            if cancel.shutting_down() {
                return None;
            }

            let result = self
                .blocking_gateway
                .dequeue_job_id(
                    &self.config.server_name,
                    &self.config.queue_name,
                    self.config.dequeue_timeout,
                )
                .await;

            match result {
                Ok(Some(job_id)) => return Some(job_id),
                Ok(None) => continue,
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "transient error dequeueing job, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.wait_for_shutdown() => return None,
                        _ = tokio::time::sleep(self.config.dequeue_timeout) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "fatal error dequeueing job, stopping manager loop");
                    return None;
                }
            }
        }
    }
}
