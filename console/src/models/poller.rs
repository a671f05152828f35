use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::registry::ModelRegistry;

/// Keep the registry's running-model list fresh until `shutdown` fires.
///
/// The first poll happens immediately. A slow host delays the next tick
/// instead of triggering a burst of catch-up polls.
pub fn spawn_running_poller(
    registry: ModelRegistry,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Polling running models every {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Running-model poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    registry.refresh_running().await;
                }
            }
        }
    })
}
