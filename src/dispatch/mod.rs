//! Command dispatch pipeline.
//!
//! The single place that sequences a command's life: parse, reset bypass,
//! scenario injection, parameter validation, simulator lookup,
//! precondition gate, then the run itself (inline for short tasks,
//! detached for long-running ones). Also the single place that constructs
//! failure results: simulators raise, the pipeline translates.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::amqp::ResultPublisher;
use crate::protocol::{
    codes, CommandEnvelope, CommandParseError, TaskParams, TaskResult, TaskType, RESET_STATE,
};
use crate::scenario::{random_failure, Scenario, ScenarioSelector};
use crate::simulators::{SimContext, Simulator};
use crate::world::{preconditions, WorldModel};


/// Routes incoming command bodies through scenario injection, validation,
/// and simulation. The world model is mutated only on success paths.
pub struct Dispatcher {
    world: Arc<WorldModel>,
    scenario: ScenarioSelector,
    results: ResultPublisher,
    ctx: Arc<SimContext>,
    simulators: HashMap<TaskType, Arc<dyn Simulator>>,
    long_tasks: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(
        world: Arc<WorldModel>,
        scenario: ScenarioSelector,
        results: ResultPublisher,
        ctx: Arc<SimContext>,
    ) -> Self {
        Self {
            world,
            scenario,
            results,
            ctx,
            simulators: HashMap::new(),
            long_tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Register the simulator handling a task type.
    pub fn register_simulator(&mut self, task_type: TaskType, simulator: Arc<dyn Simulator>) {
        self.simulators.insert(task_type, simulator);
    }

    /// Process one raw command body. Never panics, never returns an error:
    /// every outcome is either a published result or a deliberate silence.
    /// Returning means the delivery can be acknowledged; a long-running
    /// simulation keeps going on its own task.
    pub async fn handle_command(&self, body: &[u8]) {
        let raw: Value = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                let err = CommandParseError::InvalidEnvelope(e.to_string());
                error!(error = %err, "command body is not valid JSON");
                self.publish_failure(err.code(), err.to_string(), "").await;
                return;
            }
        };
        // Keep whatever task_id is salvageable so even a broken envelope
        // gets a correlated reply.
        let task_id = raw
            .get("task_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let envelope: CommandEnvelope = match serde_json::from_value(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                let err = CommandParseError::InvalidEnvelope(e.to_string());
                error!(task_id = %task_id, error = %err, "invalid command envelope");
                self.publish_failure(err.code(), err.to_string(), &task_id).await;
                return;
            }
        };

        if envelope.task_type == RESET_STATE {
            self.world.reset();
            info!(task_id = %envelope.task_id, "world state reset");
            self.publish(TaskResult::ok(&envelope.task_id, "world state reset", Vec::new()))
                .await;
            return;
        }

        let Some(task_type) = TaskType::parse(&envelope.task_type) else {
            let err = CommandParseError::UnknownTaskType(envelope.task_type.clone());
            warn!(task_id = %envelope.task_id, error = %err, "rejecting command");
            self.publish_failure(err.code(), err.to_string(), &envelope.task_id).await;
            return;
        };

        info!(task_id = %envelope.task_id, task_type = %task_type, "received command");

        let scenario = {
            let mut rng = rand::thread_rng();
            self.scenario.pick(&mut rng, task_type)
        };
        match scenario {
            Scenario::Vanish => {
                warn!(task_id = %envelope.task_id, "command vanishes, publishing nothing");
                return;
            }
            Scenario::Fail => {
                let (code, msg) = {
                    let mut rng = rand::thread_rng();
                    random_failure(&mut rng, task_type)
                };
                warn!(task_id = %envelope.task_id, code, "injected failure");
                self.publish_failure(code, msg, &envelope.task_id).await;
                return;
            }
            Scenario::Success => {}
        }

        let params = match TaskParams::parse(task_type, &envelope.params) {
            Ok(params) => params,
            Err(e) => {
                error!(task_id = %envelope.task_id, error = %e, "parameter validation failed");
                self.publish_failure(e.code(), e.to_string(), &envelope.task_id).await;
                return;
            }
        };

        let Some(simulator) = self.simulators.get(&task_type).cloned() else {
            error!(task_type = %task_type, "no simulator registered");
            self.publish_failure(
                codes::UNKNOWN_TASK,
                format!("no simulator registered for {}", task_type),
                &envelope.task_id,
            )
            .await;
            return;
        };

        if let Err(refusal) = preconditions::check(&self.world, &params) {
            self.publish_failure(refusal.code, refusal.msg, &envelope.task_id).await;
            return;
        }

        if task_type.is_long_running() {
            let mut long_tasks = self.long_tasks.lock().await;
            // Reap anything already finished so the set does not grow
            // unbounded across a long session.
            while long_tasks.try_join_next().is_some() {}
            long_tasks.spawn(run_simulation(
                envelope.task_id,
                params,
                simulator,
                Arc::clone(&self.ctx),
                Arc::clone(&self.world),
                self.results.clone(),
            ));
        } else {
            run_simulation(
                envelope.task_id,
                params,
                simulator,
                Arc::clone(&self.ctx),
                Arc::clone(&self.world),
                self.results.clone(),
            )
            .await;
        }
    }

    /// Cancel outstanding long-running simulations and wait for them to
    /// wind down, bounded by `deadline`.
    pub async fn shutdown(&self, deadline: Duration) {
        let mut long_tasks = self.long_tasks.lock().await;
        if long_tasks.is_empty() {
            return;
        }
        info!(remaining = long_tasks.len(), "cancelling long-running simulations");
        long_tasks.abort_all();
        let drained = tokio::time::timeout(deadline, async {
            while long_tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("long-running simulations did not terminate before the shutdown deadline");
        }
    }

    async fn publish_failure(&self, code: i32, msg: impl Into<String>, task_id: &str) {
        self.publish(TaskResult::failure(code, msg, task_id)).await;
    }

    async fn publish(&self, result: TaskResult) {
        if let Err(e) = self.results.publish_result(&result).await {
            error!(task_id = %result.task_id, error = %e, "failed to publish result");
        }
    }
}

/// Run one simulation to completion and publish its result. Final updates
/// reach the world model before the result goes out, so a controller that
/// reads the result can immediately query consistent state.
async fn run_simulation(
    task_id: String,
    params: TaskParams,
    simulator: Arc<dyn Simulator>,
    ctx: Arc<SimContext>,
    world: Arc<WorldModel>,
    results: ResultPublisher,
) {
    let result = match simulator.simulate(&task_id, &params, &ctx).await {
        Ok(result) => {
            if result.is_success() {
                world.apply_updates(&result.updates);
            }
            result
        }
        Err(e) => {
            error!(task_id = %task_id, error = %e, "simulator failed");
            TaskResult::failure(codes::SIMULATOR_ERROR, e.to_string(), task_id.clone())
        }
    };
    if let Err(e) = results.publish_result(&result).await {
        error!(task_id = %result.task_id, error = %e, "failed to publish result");
    }
}
