//! Executes a single job end-to-end (component B). A worker holds no
//! persistent state between jobs; everything it needs comes from the store
//! and the arguments to [`Worker::run`].

use std::sync::Arc;

use stoker_shutdown::ShutdownConsumer;
use tracing::{error, info};

use crate::activator::{JobActivator, JobInvoker};
use crate::gateway::StorageGateway;

pub struct Worker {
    server_name: String,
    queue_name: String,
    shutdown: ShutdownConsumer,
    gateway: Arc<dyn StorageGateway>,
    activator: Arc<dyn JobActivator>,
    invoker: Arc<dyn JobInvoker>,
}

impl Worker {
    pub fn new(
        server_name: impl Into<String>,
        queue_name: impl Into<String>,
        shutdown: ShutdownConsumer,
        gateway: Arc<dyn StorageGateway>,
        activator: Arc<dyn JobActivator>,
        invoker: Arc<dyn JobInvoker>,
    ) -> Worker {
        Worker {
            server_name: server_name.into(),
            queue_name: queue_name.into(),
            shutdown,
            gateway,
            activator,
            invoker,
        }
    }

    /// Runs one job to completion. Never panics or propagates an error out of
    /// this function: every failure is captured and converted into a `Failed`
    /// record, per the worker contract. Once dispatched, a job runs to
    /// completion even if shutdown is signalled mid-flight; only the
    /// gateway's own backoff sleeps are cancellation-aware.
    pub async fn run(&self, job_id: &str) {
        let mut cancel = self.shutdown.clone();

        if let Err(e) = self.run_inner(job_id, &mut cancel).await {
            error!(job_id, server = %self.server_name, queue = %self.queue_name, error = %e, "job failed");
        }
    }

    async fn run_inner(
        &self,
        job_id: &str,
        cancel: &mut ShutdownConsumer,
    ) -> Result<(), crate::error::Error> {
        let descriptor = self.gateway.get_job_descriptor(job_id, cancel).await?;

        self.gateway
            .record_processing(job_id, &self.server_name, &self.queue_name, cancel)
            .await?;

        info!(job_id, target_type = %descriptor.target_type, method = %descriptor.method, "processing job");

        let outcome = self.invoke(&descriptor).await;

        match outcome {
            Ok(()) => {
                self.gateway.record_succeeded(job_id, cancel).await?;
            }
            Err(e) => {
                self.gateway
                    .record_failed(job_id, &e.to_string(), cancel)
                    .await?;
            }
        }

        Ok(())
    }

    async fn invoke(
        &self,
        descriptor: &crate::job::JobDescriptor,
    ) -> Result<(), crate::error::Error> {
        let instance = self.activator.activate(&descriptor.target_type).await?;
        self.invoker
            .invoke(
                &instance,
                &descriptor.target_type,
                &descriptor.method,
                &descriptor.payload,
            )
            .await
    }
}
