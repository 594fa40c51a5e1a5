//! Outgoing message publishers.
//!
//! [`WirePublisher`] is the only surface the core needs from the broker:
//! `publish(routing_key, body)`. The typed wrappers own envelope
//! construction and routing keys so simulators and the dispatcher never
//! touch wire details.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::generators::wire_timestamp;
use crate::protocol::{EntityUpdate, Heartbeat, LogEnvelope, RobotState, TaskResult};

/// Minimal publishing seam over the topic exchange. Implemented by the AMQP
/// bus in production and by in-memory fakes in tests.
#[async_trait]
pub trait WirePublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<()>;
}

/// Publishes final task results to `{robot_id}.result`.
#[derive(Clone)]
pub struct ResultPublisher {
    wire: Arc<dyn WirePublisher>,
    routing_key: String,
}

impl ResultPublisher {
    pub fn new(wire: Arc<dyn WirePublisher>, robot_id: &str) -> Self {
        Self {
            wire,
            routing_key: format!("{}.result", robot_id),
        }
    }

    /// Serialize and publish a result. A broker error is retried once; the
    /// second failure propagates to the caller, which logs it. Every
    /// command except a vanished one yields exactly one of these.
    pub async fn publish_result(&self, result: &TaskResult) -> Result<()> {
        let body = serde_json::to_vec(result).context("failed to serialize task result")?;
        if let Err(e) = self.wire.publish(&self.routing_key, body.clone()).await {
            warn!(
                task_id = %result.task_id,
                error = %e,
                "result publish failed, retrying once"
            );
            self.wire
                .publish(&self.routing_key, body)
                .await
                .with_context(|| {
                    format!("result publish retry failed for task {}", result.task_id)
                })?;
        }
        debug!(
            task_id = %result.task_id,
            code = result.code,
            routing_key = %self.routing_key,
            "published result"
        );
        Ok(())
    }
}

/// Publishes intermediate state updates to `{robot_id}.log`.
#[derive(Clone)]
pub struct LogPublisher {
    wire: Arc<dyn WirePublisher>,
    routing_key: String,
}

impl LogPublisher {
    pub fn new(wire: Arc<dyn WirePublisher>, robot_id: &str) -> Self {
        Self {
            wire,
            routing_key: format!("{}.log", robot_id),
        }
    }

    pub async fn publish_log(
        &self,
        task_id: &str,
        updates: &[EntityUpdate],
        msg: &str,
    ) -> Result<()> {
        let envelope = LogEnvelope {
            code: TaskResult::SUCCESS,
            msg: msg.to_string(),
            task_id: task_id.to_string(),
            updates: updates.to_vec(),
            timestamp: wire_timestamp(),
        };
        let body = serde_json::to_vec(&envelope).context("failed to serialize log envelope")?;
        self.wire.publish(&self.routing_key, body).await?;
        debug!(task_id = %task_id, routing_key = %self.routing_key, "published log entry");
        Ok(())
    }
}

/// Publishes liveness beacons to `{robot_id}.hb`.
#[derive(Clone)]
pub struct HeartbeatPublisher {
    wire: Arc<dyn WirePublisher>,
    robot_id: String,
    routing_key: String,
}

impl HeartbeatPublisher {
    pub fn new(wire: Arc<dyn WirePublisher>, robot_id: &str) -> Self {
        Self {
            wire,
            robot_id: robot_id.to_string(),
            routing_key: format!("{}.hb", robot_id),
        }
    }

    pub async fn publish_heartbeat(&self, state: RobotState) -> Result<()> {
        let beat = Heartbeat {
            robot_id: self.robot_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            state,
        };
        let body = serde_json::to_vec(&beat).context("failed to serialize heartbeat")?;
        self.wire.publish(&self.routing_key, body).await
    }
}
