//! Simulator for the setup tasks: mounting cartridges and the tube rack.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

use crate::generators::{
    ccs_ext_module_update, robot_update, sample_cartridge_update, silica_cartridge_update,
    tube_rack_update,
};
use crate::protocol::{
    posture, ConsumableState, DeviceState, EntityKind, RobotState, SetupCartridgesParams,
    SetupTubeRackParams, TaskParams, TaskResult, ToolState,
};

use super::{SimContext, Simulator};

/// Tube rack id used when no rack has been tracked at the workstation yet.
const DEFAULT_TUBE_RACK_ID: &str = "tube_rack_001";

/// Handles `setup_tubes_to_column_machine` and `setup_tube_rack`.
pub struct SetupSimulator;

#[async_trait]
impl Simulator for SetupSimulator {
    async fn simulate(
        &self,
        task_id: &str,
        params: &TaskParams,
        ctx: &SimContext,
    ) -> Result<TaskResult> {
        match params {
            TaskParams::SetupCartridges(p) => simulate_setup_cartridges(task_id, p, ctx).await,
            TaskParams::SetupTubeRack(p) => simulate_setup_tube_rack(task_id, p, ctx).await,
            other => bail!("SetupSimulator cannot handle task: {}", other.task_type()),
        }
    }
}

/// Mount silica and sample cartridges onto the ext module: 15-30s base.
async fn simulate_setup_cartridges(
    task_id: &str,
    params: &SetupCartridgesParams,
    ctx: &SimContext,
) -> Result<TaskResult> {
    info!(task_id = %task_id, work_station = %params.work_station, "simulating setup_cartridges");

    let ws = params.work_station.as_str();
    ctx.publish_log(
        task_id,
        &[robot_update(ctx.robot_id(), ws, RobotState::Working, posture::WAIT_FOR_SCREEN)],
        "robot moving to work station",
    )
    .await;

    ctx.scaled_delay(15.0, 30.0).await;

    // The command carries no silica cartridge id; the type string is the
    // identity the rest of the workflow resolves by location anyway.
    let silica_id = params.silica_cartridge_type.as_str();
    let sample_id = params.sample_cartridge_id.as_str();

    let mounted = [
        silica_cartridge_update(silica_id, ws, ConsumableState::Inuse),
        sample_cartridge_update(sample_id, ws, ConsumableState::Inuse),
        ccs_ext_module_update(ws, DeviceState::Using, ""),
    ];
    ctx.publish_log(task_id, &mounted, "cartridges mounted").await;

    let updates = vec![
        robot_update(ctx.robot_id(), ws, RobotState::Idle, ""),
        silica_cartridge_update(silica_id, ws, ConsumableState::Inuse),
        sample_cartridge_update(sample_id, ws, ConsumableState::Inuse),
        ccs_ext_module_update(ws, DeviceState::Using, ""),
    ];
    Ok(TaskResult::ok(task_id, "setup_tubes_to_column_machine completed", updates))
}

/// Mount a tube rack at the workstation: 10-20s base.
async fn simulate_setup_tube_rack(
    task_id: &str,
    params: &SetupTubeRackParams,
    ctx: &SimContext,
) -> Result<TaskResult> {
    info!(task_id = %task_id, work_station = %params.work_station, "simulating setup_tube_rack");

    let ws = params.work_station.as_str();
    let rack_id = ctx.resolve_entity_id(EntityKind::TubeRack, ws, DEFAULT_TUBE_RACK_ID);

    ctx.publish_log(
        task_id,
        &[robot_update(ctx.robot_id(), ws, RobotState::Working, posture::WAIT_FOR_SCREEN)],
        "robot moving to work station",
    )
    .await;

    ctx.scaled_delay(10.0, 20.0).await;

    ctx.publish_log(
        task_id,
        &[tube_rack_update(&rack_id, ws, ToolState::Inuse, "mounted")],
        "tube_rack mounted",
    )
    .await;

    let updates = vec![
        robot_update(ctx.robot_id(), ws, RobotState::Idle, ""),
        tube_rack_update(&rack_id, ws, ToolState::Inuse, "mounted"),
    ];
    Ok(TaskResult::ok(task_id, "setup_tube_rack completed", updates))
}
