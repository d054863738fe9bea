//! Periodic server heartbeat refresh (supplemental; see Design Note (b) in
//! the expanded spec). The source this runtime is built from didn't show a
//! heartbeat refresh loop at all, so this module has no direct teacher
//! analogue; it is modeled on the schedule poller's own tick/select shape for
//! consistency.

use std::sync::Arc;
use std::time::Duration;

use stoker_shutdown::ShutdownConsumer;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::gateway::StorageGateway;

pub fn spawn(
    gateway: Arc<dyn StorageGateway>,
    server_name: String,
    heartbeat_interval: Duration,
    mut shutdown: ShutdownConsumer,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for_shutdown() => return,
                _ = interval.tick() => {}
            }

            if let Err(e) = gateway.heartbeat(&server_name, &mut shutdown).await {
                warn!(server = %server_name, error = %e, "heartbeat failed");
            }
        }
    })
}
