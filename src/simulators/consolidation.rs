//! Simulator for `collect_column_chromatography_fractions`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

use crate::generators::{
    pcc_left_chute_update, pcc_right_chute_update, robot_update, round_bottom_flask_update,
    tube_rack_update,
};
use crate::protocol::{
    posture, CollectFractionsParams, ContainerState, DeviceState, EntityKind, RobotState,
    TaskParams, TaskResult, ToolState,
};

use super::{SimContext, Simulator};

const DEFAULT_FLASK_ID: &str = "rbf_001";
const LEFT_CHUTE_ID: &str = "pcc_left_chute_001";
const RIGHT_CHUTE_ID: &str = "pcc_right_chute_001";

/// Handles `collect_column_chromatography_fractions`. The duration scales
/// with the number of tubes marked for collection: 3s per tube plus a 10s
/// fixed cost, before the multiplier.
pub struct ConsolidationSimulator;

#[async_trait]
impl Simulator for ConsolidationSimulator {
    async fn simulate(
        &self,
        task_id: &str,
        params: &TaskParams,
        ctx: &SimContext,
    ) -> Result<TaskResult> {
        let TaskParams::CollectFractions(params) = params else {
            bail!(
                "ConsolidationSimulator cannot handle task: {}",
                params.task_type()
            );
        };
        simulate_collect_fractions(task_id, params, ctx).await
    }
}

async fn simulate_collect_fractions(
    task_id: &str,
    params: &CollectFractionsParams,
    ctx: &SimContext,
) -> Result<TaskResult> {
    let tubes = params.tubes_to_collect();
    let base_delay = tubes as f64 * 3.0 + 10.0;
    info!(task_id = %task_id, tubes, "simulating collect_cc_fractions");

    let ws = params.work_station.as_str();
    let rack_id = ctx.resolve_entity_id(EntityKind::TubeRack, ws, ws);
    let flask_id = ctx.resolve_entity_id(EntityKind::RoundBottomFlask, ws, DEFAULT_FLASK_ID);

    ctx.publish_log(
        task_id,
        &[
            robot_update(ctx.robot_id(), ws, RobotState::Working, ""),
            tube_rack_update(&rack_id, ws, ToolState::Contaminated, "pulled_out"),
        ],
        "robot pulling out tube rack",
    )
    .await;

    ctx.scaled_delay(base_delay * 0.8, base_delay * 1.2).await;

    let updates = vec![
        robot_update(ctx.robot_id(), ws, RobotState::Working, posture::MOVING_WITH_FLASK),
        tube_rack_update(
            &rack_id,
            ws,
            ToolState::Contaminated,
            "pulled_out, ready_for_recovery",
        ),
        round_bottom_flask_update(&flask_id, ws, ContainerState::filled(), ""),
        pcc_left_chute_update(LEFT_CHUTE_ID, DeviceState::Using),
        pcc_right_chute_update(RIGHT_CHUTE_ID, DeviceState::Using),
    ];

    Ok(TaskResult::ok(task_id, "success", updates))
}
