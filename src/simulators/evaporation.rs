//! Simulator for `start_evaporation`.
//!
//! Long-running. Intermediate updates carry sensor readings linearly
//! interpolated from ambient conditions toward the start profile's targets
//! over the computed duration.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::generators::{evaporator_update, robot_update, round_bottom_flask_update, timing};
use crate::protocol::{
    posture, ContainerState, DeviceState, EntityKind, RobotState, StartEvaporationParams,
    TaskParams, TaskResult,
};

use super::{SimContext, Simulator};

const DEFAULT_FLASK_ID: &str = "rbf_001";

/// Ambient conditions before the water bath and vacuum pump engage.
const AMBIENT_TEMPERATURE: f64 = 25.0;
const AMBIENT_PRESSURE: f64 = 1013.0;

/// Handles `start_evaporation` (long-running with sensor ramp).
pub struct EvaporationSimulator;

#[async_trait]
impl Simulator for EvaporationSimulator {
    async fn simulate(
        &self,
        task_id: &str,
        params: &TaskParams,
        ctx: &SimContext,
    ) -> Result<TaskResult> {
        let TaskParams::StartEvaporation(params) = params else {
            bail!(
                "EvaporationSimulator cannot handle task: {}",
                params.task_type()
            );
        };
        simulate_start_evaporation(task_id, params, ctx).await
    }
}

async fn simulate_start_evaporation(
    task_id: &str,
    params: &StartEvaporationParams,
    ctx: &SimContext,
) -> Result<TaskResult> {
    let start = &params.profiles.start;
    info!(
        task_id = %task_id,
        target_temperature = start.target_temperature,
        target_pressure = start.target_pressure,
        "simulating start_evaporation"
    );

    let ws = params.work_station.as_str();

    ctx.publish_log(
        task_id,
        &[robot_update(ctx.robot_id(), ws, RobotState::Working, "")],
        "robot moving to evaporation station",
    )
    .await;

    ctx.scaled_delay(3.0, 5.0).await;

    let flask_id = ctx.resolve_entity_id(EntityKind::RoundBottomFlask, ws, DEFAULT_FLASK_ID);

    // Phase 1: flask mounted, pump and bath starting from ambient.
    let initial_updates = vec![
        robot_update(ctx.robot_id(), ws, RobotState::Working, posture::OBSERVE_EVAPORATION),
        evaporator_update(
            &params.device_id,
            DeviceState::Using,
            start.lower_height,
            start.rpm,
            start.target_temperature,
            AMBIENT_TEMPERATURE,
            start.target_pressure,
            AMBIENT_PRESSURE,
        ),
        round_bottom_flask_update(&flask_id, ws, ContainerState::filled(), "evaporating"),
    ];
    ctx.publish_log(task_id, &initial_updates, "evaporation started").await;
    ctx.apply_updates(&initial_updates);

    // Phase 2: ramp temperature and pressure toward the targets.
    let total_duration = timing::evaporation_duration(&params.profiles, ctx.multiplier());
    let interval = ctx.re_intermediate_interval();
    let mut elapsed = 0.0;

    while elapsed < total_duration {
        let step = interval.min(total_duration - elapsed);
        if step <= 0.0 {
            break;
        }
        ctx.sleep(step).await;
        elapsed += step;

        if elapsed < total_duration {
            let progress = (elapsed / total_duration).min(1.0);
            let current_temperature =
                AMBIENT_TEMPERATURE + (start.target_temperature - AMBIENT_TEMPERATURE) * progress;
            let current_pressure =
                AMBIENT_PRESSURE + (start.target_pressure - AMBIENT_PRESSURE) * progress;

            ctx.publish_log(
                task_id,
                &[evaporator_update(
                    &params.device_id,
                    DeviceState::Using,
                    start.lower_height,
                    start.rpm,
                    start.target_temperature,
                    round1(current_temperature),
                    start.target_pressure,
                    round1(current_pressure),
                )],
                "evaporation ramp in progress",
            )
            .await;
            debug!(
                task_id = %task_id,
                elapsed,
                total_duration,
                current_temperature,
                current_pressure,
                "evaporation progress"
            );
        }
    }

    // Phase 3: readings settled at the targets, evaporation keeps running.
    let final_updates = vec![
        robot_update(ctx.robot_id(), ws, RobotState::Working, posture::OBSERVE_EVAPORATION),
        evaporator_update(
            &params.device_id,
            DeviceState::Using,
            start.lower_height,
            start.rpm,
            start.target_temperature,
            start.target_temperature,
            start.target_pressure,
            start.target_pressure,
        ),
        round_bottom_flask_update(&flask_id, ws, ContainerState::filled(), "evaporating"),
    ];
    info!(task_id = %task_id, total_duration, "evaporation simulation complete");
    Ok(TaskResult::ok(task_id, "success", final_updates))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
