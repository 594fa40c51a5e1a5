//! Periodic liveness beacon.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::world::WorldModel;

use super::publisher::HeartbeatPublisher;

/// Publish a heartbeat every `interval_seconds` until shutdown.
///
/// Each tick snapshots the robot's state from the world model at publish
/// time. Publish errors are logged and the loop keeps going; a flaky
/// broker must not kill the beacon.
pub async fn run_heartbeat(
    world: Arc<WorldModel>,
    publisher: HeartbeatPublisher,
    robot_id: String,
    interval_seconds: f64,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(Duration::from_secs_f64(interval_seconds.max(0.001)));

    // Skip missed ticks to prevent backlog under load
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_seconds, "heartbeat started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("heartbeat stopped");
                break;
            }
            _ = ticker.tick() => {
                let state = world.snapshot_robot_state(&robot_id);
                match publisher.publish_heartbeat(state).await {
                    Ok(()) => debug!(state = %state, "heartbeat published"),
                    Err(e) => warn!(error = %e, "failed to publish heartbeat"),
                }
            }
        }
    }
}
