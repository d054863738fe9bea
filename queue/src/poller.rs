//! Schedule poller (component D): promotes due scheduled jobs into their
//! target queues on a fixed tick. Grounded on the teacher's
//! `start_scheduled_jobs_enqueuer` loop shape, generalized from a single
//! per-queue scheduled list to the global, per-job-target-queue schedule this
//! runtime uses (see the data model's Schedule section).

use std::sync::Arc;
use std::time::Duration;

use stoker_shutdown::ShutdownConsumer;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::gateway::StorageGateway;

pub fn spawn(
    gateway: Arc<dyn StorageGateway>,
    poll_interval: Duration,
    mut shutdown: ShutdownConsumer,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        // Missed ticks are coalesced, not replayed: Burst catch-up after a
        // slow iteration would multiply work the spec explicitly says not to.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for_shutdown() => {
                    info!("schedule poller exiting");
                    return;
                }
                _ = interval.tick() => {}
            }

            match gateway.promote_scheduled_jobs(&mut shutdown).await {
                Ok(0) => {}
                Ok(n) => info!(promoted = n, "promoted scheduled jobs"),
                Err(e) => error!(error = %e, "error promoting scheduled jobs"),
            }
        }
    })
}
