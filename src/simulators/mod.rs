//! Task simulators.
//!
//! One simulator per task family. Each encapsulates the sequence of
//! intermediate updates, the delay schedule, and the final result for its
//! tasks, behind a deliberately small [`SimContext`] surface: publish a log
//! entry, apply updates to the world, sleep, look an entity up by location.
//!
//! Every entity change a simulator produces must also appear in its final
//! result's `updates`, so a consumer that missed the log channel still
//! receives the terminal state on the result channel.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::amqp::LogPublisher;
use crate::config::BehaviorConfig;
use crate::generators::timing;
use crate::protocol::{EntityKind, EntityUpdate, TaskParams, TaskResult};
use crate::world::WorldModel;

mod cc;
mod consolidation;
mod evaporation;
mod photo;
mod setup;

#[cfg(test)]
mod tests;

pub use cc::CcSimulator;
pub use consolidation::ConsolidationSimulator;
pub use evaporation::EvaporationSimulator;
pub use photo::PhotoSimulator;
pub use setup::SetupSimulator;

/// A task simulator. Errors bubble to the dispatcher, which translates them
/// into a 1002 failure result without touching the world model.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(
        &self,
        task_id: &str,
        params: &TaskParams,
        ctx: &SimContext,
    ) -> Result<TaskResult>;
}

/// The API surface simulators see: behavior settings plus the log channel,
/// the world model, and pacing helpers.
pub struct SimContext {
    robot_id: String,
    behavior: BehaviorConfig,
    world: Arc<WorldModel>,
    log: LogPublisher,
}

impl SimContext {
    pub fn new(
        robot_id: String,
        behavior: BehaviorConfig,
        world: Arc<WorldModel>,
        log: LogPublisher,
    ) -> Self {
        Self {
            robot_id,
            behavior,
            world,
            log,
        }
    }

    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    pub fn multiplier(&self) -> f64 {
        self.behavior.base_delay_multiplier
    }

    pub fn min_delay(&self) -> f64 {
        self.behavior.min_delay_seconds
    }

    pub fn image_base_url(&self) -> &str {
        &self.behavior.image_base_url
    }

    pub fn cc_intermediate_interval(&self) -> f64 {
        timing::intermediate_interval(
            self.behavior.cc_intermediate_interval_seconds,
            self.multiplier(),
            self.min_delay(),
        )
    }

    pub fn re_intermediate_interval(&self) -> f64 {
        timing::intermediate_interval(
            self.behavior.re_intermediate_interval_seconds,
            self.multiplier(),
            self.min_delay(),
        )
    }

    /// Publish an intermediate update on the log channel. Best-effort: a
    /// broker error is logged and swallowed, the simulation continues and
    /// the final result still carries the terminal state.
    pub async fn publish_log(&self, task_id: &str, updates: &[EntityUpdate], msg: &str) {
        if let Err(e) = self.log.publish_log(task_id, updates, msg).await {
            warn!(task_id = %task_id, error = %e, "log publish failed, continuing");
        }
    }

    /// Merge updates into the world model immediately. Long-running
    /// simulators use this for their phase-one updates so concurrent
    /// commands (terminate, photo) observe the in-progress state.
    pub fn apply_updates(&self, updates: &[EntityUpdate]) {
        self.world.apply_updates(updates);
    }

    pub async fn sleep(&self, seconds: f64) {
        tokio::time::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0))).await;
    }

    /// Sleep for `uniform(base_min, base_max) * multiplier`, floored.
    pub async fn scaled_delay(&self, base_min: f64, base_max: f64) {
        let delay = {
            let mut rng = rand::thread_rng();
            timing::scaled_delay(
                &mut rng,
                base_min,
                base_max,
                self.multiplier(),
                self.min_delay(),
            )
        };
        self.sleep(delay).await;
    }

    /// Id of the first entity of `kind` located at `workstation`, if any.
    pub fn find_entity_at(&self, kind: EntityKind, workstation: &str) -> Option<String> {
        self.world.find_by_location(kind, workstation).map(|(id, _)| id)
    }

    /// Resolve a material id by location, falling back to `fallback` when
    /// the world has not tracked it. Lets result messages carry correct ids
    /// even when the command params omit the material's identity.
    pub fn resolve_entity_id(&self, kind: EntityKind, workstation: &str, fallback: &str) -> String {
        self.find_entity_at(kind, workstation)
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Copy of an entity's current properties.
    pub fn entity(&self, kind: EntityKind, id: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.world.get(kind, id)
    }
}
