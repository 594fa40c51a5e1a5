//! Simulators for column chromatography.
//!
//! `start_column_chromatography` is long-running: it publishes its initial
//! state, then re-publishes the machine update at the intermediate interval
//! so the log stream shows liveness until the run duration elapses.
//! `terminate_column_chromatography` is a quick task that stops the machine
//! and captures its result screen.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::generators::{
    captured_images, cc_machine_update, ccs_ext_module_update, robot_update,
    sample_cartridge_update, silica_cartridge_update, timing, tube_rack_update, wire_timestamp,
};
use crate::protocol::{
    posture, ConsumableState, DeviceState, EntityKind, EntityUpdate, RobotState, StartCcParams,
    TaskParams, TaskResult, TerminateCcParams, ToolState,
};

use super::{SimContext, Simulator};

/// Handles `start_column_chromatography` (long-running) and
/// `terminate_column_chromatography` (quick).
pub struct CcSimulator;

#[async_trait]
impl Simulator for CcSimulator {
    async fn simulate(
        &self,
        task_id: &str,
        params: &TaskParams,
        ctx: &SimContext,
    ) -> Result<TaskResult> {
        match params {
            TaskParams::StartCc(p) => simulate_start_cc(task_id, p, ctx).await,
            TaskParams::TerminateCc(p) => simulate_terminate_cc(task_id, p, ctx).await,
            other => bail!("CcSimulator cannot handle task: {}", other.task_type()),
        }
    }
}

async fn simulate_start_cc(
    task_id: &str,
    params: &StartCcParams,
    ctx: &SimContext,
) -> Result<TaskResult> {
    info!(
        task_id = %task_id,
        run_minutes = params.experiment_params.run_minutes,
        "simulating start_cc"
    );

    let ws = params.work_station.as_str();

    // Phase 1: robot walks over, sets parameters on the touch screen.
    ctx.publish_log(
        task_id,
        &[robot_update(ctx.robot_id(), ws, RobotState::Working, "")],
        "robot moving to CC station",
    )
    .await;

    ctx.scaled_delay(3.0, 5.0).await;

    let start_timestamp = wire_timestamp();
    let silica_id = ctx.resolve_entity_id(EntityKind::SilicaCartridge, ws, ws);
    let sample_id = ctx.resolve_entity_id(EntityKind::SampleCartridge, ws, ws);
    let rack_id = ctx.resolve_entity_id(EntityKind::TubeRack, ws, ws);

    let running_state = vec![
        robot_update(ctx.robot_id(), ws, RobotState::Working, posture::WATCH_CC_SCREEN),
        cc_machine_update(
            &params.device_id,
            DeviceState::Using,
            Some(params.experiment_params.clone()),
            Some(start_timestamp.clone()),
        ),
        silica_cartridge_update(&silica_id, ws, ConsumableState::Inuse),
        sample_cartridge_update(&sample_id, ws, ConsumableState::Inuse),
        tube_rack_update(&rack_id, ws, ToolState::Inuse, ""),
    ];
    ctx.publish_log(task_id, &running_state, "CC process started").await;
    // Visible immediately so terminate/photo commands arriving mid-run see
    // the machine in use.
    ctx.apply_updates(&running_state);

    // Phase 2: periodic liveness updates until the run elapses.
    let total_duration = timing::cc_duration(&params.experiment_params, ctx.multiplier());
    let interval = ctx.cc_intermediate_interval();
    let mut elapsed = 0.0;

    while elapsed < total_duration {
        let step = interval.min(total_duration - elapsed);
        if step <= 0.0 {
            break;
        }
        ctx.sleep(step).await;
        elapsed += step;

        if elapsed < total_duration {
            ctx.publish_log(
                task_id,
                &[cc_machine_update(&params.device_id, DeviceState::Using, None, None)],
                "CC in progress",
            )
            .await;
            debug!(task_id = %task_id, elapsed, total_duration, "CC progress");
        }
    }

    // Phase 3: the run keeps going on the machine; the robot keeps watching.
    // Materials stay in use until termination.
    info!(task_id = %task_id, total_duration, "CC simulation complete");
    Ok(TaskResult::ok(task_id, "success", running_state))
}

async fn simulate_terminate_cc(
    task_id: &str,
    params: &TerminateCcParams,
    ctx: &SimContext,
) -> Result<TaskResult> {
    info!(task_id = %task_id, device_id = %params.device_id, "simulating terminate_cc");

    let ws = params.work_station.as_str();

    // Preserve the experiment context start_cc left on the machine.
    let machine = ctx.entity(EntityKind::ColumnChromatographyMachine, &params.device_id);
    let experiment_params = machine
        .as_ref()
        .and_then(|props| props.get("experiment_params"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .or_else(|| Some(params.experiment_params.clone()));
    let start_timestamp = machine
        .as_ref()
        .and_then(|props| props.get("start_timestamp"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let silica_id = ctx.resolve_entity_id(EntityKind::SilicaCartridge, ws, ws);
    let sample_id = ctx.resolve_entity_id(EntityKind::SampleCartridge, ws, ws);
    let rack_id = ctx.resolve_entity_id(EntityKind::TubeRack, ws, ws);

    let updates: Vec<EntityUpdate> = vec![
        robot_update(ctx.robot_id(), ws, RobotState::Idle, ""),
        cc_machine_update(&params.device_id, DeviceState::Idle, experiment_params, start_timestamp),
        silica_cartridge_update(&silica_id, ws, ConsumableState::Used),
        sample_cartridge_update(&sample_id, ws, ConsumableState::Used),
        tube_rack_update(&rack_id, ws, ToolState::Contaminated, "used"),
        ccs_ext_module_update(ws, DeviceState::Using, "cartridges still mounted"),
    ];

    let images = captured_images(
        ctx.image_base_url(),
        ws,
        &params.device_id,
        &params.device_type,
        &["screen".to_string()],
    );

    ctx.publish_log(task_id, &updates, "robot terminating CC").await;

    ctx.scaled_delay(10.0, 15.0).await;

    Ok(TaskResult::ok(task_id, "success", updates).with_images(images))
}
