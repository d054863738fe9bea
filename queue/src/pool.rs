//! Bounded worker pool (component C). Capacity is enforced with a
//! [`tokio::sync::Semaphore`] rather than the teacher's `FuturesUnordered`
//! length check: the spec's `TakeFree`/`Worker` handout shape is an explicit
//! object, and a semaphore permit is the natural Rust object for "one slot of
//! bounded capacity, checked back in on drop".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};

use stoker_shutdown::ShutdownConsumer;

use crate::worker::Worker as JobWorker;

/// Fires once per job dispatched through the pool, regardless of outcome.
pub type CompletionSender = mpsc::UnboundedSender<String>;
pub type CompletionReceiver = mpsc::UnboundedReceiver<String>;

pub struct WorkerPool {
    capacity: u32,
    semaphore: Arc<Semaphore>,
    completions: CompletionSender,
    worker: Arc<JobWorker>,
    stopped: AtomicBool,
    disposed: Mutex<bool>,
}

/// A checked-out slot in the pool. Consuming it with [`Worker::process`]
/// spawns the job; dropping it without processing releases the slot back.
pub struct Worker {
    permit: tokio::sync::OwnedSemaphorePermit,
    completions: CompletionSender,
    worker: Arc<JobWorker>,
}

impl WorkerPool {
    pub fn new(concurrency: usize, worker: JobWorker) -> (WorkerPool, CompletionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = WorkerPool {
            capacity: concurrency as u32,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            completions: tx,
            worker: Arc::new(worker),
            stopped: AtomicBool::new(false),
            disposed: Mutex::new(false),
        };
        (pool, rx)
    }

    /// Blocks until a slot is free or `cancel` fires. Returns `None` once
    /// [`WorkerPool::dispose`] has started, even if permits remain free.
    pub async fn take_free(&self, cancel: &mut ShutdownConsumer) -> Option<Worker> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }

        tokio::select! {
            biased;
            _ = cancel.wait_for_shutdown() => None,
            permit = self.semaphore.clone().acquire_owned() => {
                let permit = permit.expect("pool semaphore is never closed");
                Some(Worker {
                    permit,
                    completions: self.completions.clone(),
                    worker: self.worker.clone(),
                })
            }
        }
    }

    /// Stops accepting new work, waits for all in-flight workers to finish,
    /// then releases resources. Idempotent: a second call returns immediately.
    pub async fn dispose(&self) {
        let mut disposed = self.disposed.lock().await;
        if *disposed {
            return;
        }

        self.stopped.store(true, Ordering::SeqCst);
        // Once stopped, no further take_free call can hand out a permit, so
        // acquiring every permit back only has to wait on workers already in
        // flight.
        let _guard = self
            .semaphore
            .acquire_many(self.capacity)
            .await
            .expect("pool semaphore is never closed");
        *disposed = true;
    }
}

impl Worker {
    /// Fire-and-forget: spawns the job on its own task and returns immediately.
    pub fn process(self, job_id: String) {
        let worker = self.worker;
        let completions = self.completions;
        let permit = self.permit;
        tokio::spawn(async move {
            worker.run(&job_id).await;
            // JobCompleted fires regardless of outcome; completion here means
            // "no longer in flight", not "succeeded".
            let _ = completions.send(job_id);
            drop(permit);
        });
    }
}
