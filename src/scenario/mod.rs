//! Fault injection: decides per command whether the simulation succeeds,
//! fails with a task-appropriate error, or vanishes without a trace.

use rand::Rng;
use tracing::info;

use crate::config::{BehaviorConfig, DefaultScenario};
use crate::protocol::TaskType;

mod failures;


pub use failures::random_failure;

/// Outcome injected for one command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// Run the simulator normally.
    Success,
    /// Publish a failure from the task's band, touch nothing.
    Fail,
    /// Acknowledge the command and publish nothing at all.
    Vanish,
}

/// Per-command scenario selection.
///
/// Timeout is drawn before failure, so `timeout_rate = 1.0` is truly silent
/// regardless of the failure rate.
pub struct ScenarioSelector {
    default_scenario: DefaultScenario,
    failure_rate: f64,
    timeout_rate: f64,
}

impl ScenarioSelector {
    pub fn new(behavior: &BehaviorConfig) -> Self {
        Self {
            default_scenario: behavior.default_scenario,
            failure_rate: behavior.failure_rate,
            timeout_rate: behavior.timeout_rate,
        }
    }

    pub fn pick(&self, rng: &mut impl Rng, task_type: TaskType) -> Scenario {
        if self.timeout_rate > 0.0 && rng.gen::<f64>() < self.timeout_rate {
            info!(task_type = %task_type, "scenario: timeout injected");
            return Scenario::Vanish;
        }
        if self.failure_rate > 0.0 && rng.gen::<f64>() < self.failure_rate {
            info!(task_type = %task_type, "scenario: failure injected");
            return Scenario::Fail;
        }
        match self.default_scenario {
            DefaultScenario::Success => Scenario::Success,
            DefaultScenario::Failure => Scenario::Fail,
            DefaultScenario::Timeout => Scenario::Vanish,
        }
    }
}
