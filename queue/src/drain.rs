//! Completion drain (component E): the single consumer of the completion
//! channel crossing the worker/pool boundary. Finalizes processing-set state
//! through the non-blocking gateway.
//!
//! The drain doesn't race its `recv()` against the shared shutdown signal:
//! doing so could drop a completion a worker is still in the middle of
//! sending during the manager's STOPPING sequence. Instead it relies on the
//! channel closing naturally once the worker pool (the last sender) is
//! dropped, which only happens after `WorkerPool::dispose` has already
//! joined every in-flight worker. The shutdown consumer is still threaded
//! through so the gateway's own retry backoff can be cut short.

use std::sync::Arc;

use stoker_shutdown::ShutdownConsumer;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::gateway::StorageGateway;
use crate::pool::CompletionReceiver;

pub fn spawn(
    gateway: Arc<dyn StorageGateway>,
    server_name: String,
    queue_name: String,
    mut completions: CompletionReceiver,
    mut shutdown: ShutdownConsumer,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job_id) = completions.recv().await {
            if let Err(e) = gateway
                .remove_processing_job(&server_name, &queue_name, &job_id, &mut shutdown)
                .await
            {
                error!(job_id = %job_id, error = %e, "failed to clear processing record");
            }
        }

        info!("completion drain exiting");
    })
}
