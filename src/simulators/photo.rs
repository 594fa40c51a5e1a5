//! Simulator for `take_photo`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::generators::{captured_images, cc_machine_update, evaporator_update, robot_update};
use crate::protocol::{
    device_entity_kind, DeviceState, EntityKind, EntityUpdate, RobotState, TakePhotoParams,
    TaskParams, TaskResult,
};

use super::{SimContext, Simulator};

/// Handles `take_photo`. The delay scales with the number of components;
/// each component yields one fabricated image descriptor.
pub struct PhotoSimulator;

#[async_trait]
impl Simulator for PhotoSimulator {
    async fn simulate(
        &self,
        task_id: &str,
        params: &TaskParams,
        ctx: &SimContext,
    ) -> Result<TaskResult> {
        let TaskParams::TakePhoto(params) = params else {
            bail!("PhotoSimulator cannot handle task: {}", params.task_type());
        };
        simulate_take_photo(task_id, params, ctx).await
    }
}

async fn simulate_take_photo(
    task_id: &str,
    params: &TakePhotoParams,
    ctx: &SimContext,
) -> Result<TaskResult> {
    let components = params.components.to_vec();
    info!(
        task_id = %task_id,
        device_id = %params.device_id,
        components = components.len(),
        "simulating take_photo"
    );

    let ws = params.work_station.as_str();

    // Photographing does not change what the robot is doing; carry its
    // current state through the intermediate updates.
    let (state, description) = current_robot_state(ctx);
    ctx.publish_log(
        task_id,
        &[robot_update(ctx.robot_id(), ws, state, &description)],
        "robot arrived at station",
    )
    .await;

    let count = components.len() as f64;
    ctx.scaled_delay(2.0 * count, 5.0 * count).await;

    let device_kind = device_entity_kind(&params.device_type);
    if let Some(kind) = device_kind {
        if let Some(update) = device_update(ctx, kind, &params.device_id, DeviceState::Using) {
            ctx.publish_log(task_id, &[update], "device in use for capture").await;
        }
    }

    for component in &components {
        ctx.publish_log(
            task_id,
            &[robot_update(ctx.robot_id(), ws, state, &description)],
            &format!("photo taken for {}", component),
        )
        .await;
    }

    let mut updates: Vec<EntityUpdate> = vec![robot_update(ctx.robot_id(), ws, RobotState::Idle, "")];
    if let Some(kind) = device_kind {
        if let Some(update) = device_update(ctx, kind, &params.device_id, DeviceState::Idle) {
            updates.push(update);
        }
    }

    let images = captured_images(
        ctx.image_base_url(),
        ws,
        &params.device_id,
        &params.device_type,
        &components,
    );

    Ok(TaskResult::ok(task_id, "success", updates).with_images(images))
}

fn current_robot_state(ctx: &SimContext) -> (RobotState, String) {
    let props = ctx.entity(EntityKind::Robot, ctx.robot_id());
    let state = props
        .as_ref()
        .and_then(|p| p.get("state"))
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .unwrap_or(RobotState::Idle);
    let description = props
        .as_ref()
        .and_then(|p| p.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    (state, description)
}

/// Build a state-only update for the photographed device, preserving the
/// rest of its tracked properties.
fn device_update(
    ctx: &SimContext,
    kind: EntityKind,
    device_id: &str,
    state: DeviceState,
) -> Option<EntityUpdate> {
    let props = ctx.entity(kind, device_id)?;
    match kind {
        EntityKind::ColumnChromatographyMachine => {
            let experiment_params = props
                .get("experiment_params")
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            let start_timestamp = props
                .get("start_timestamp")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(cc_machine_update(device_id, state, experiment_params, start_timestamp))
        }
        EntityKind::Evaporator => Some(evaporator_update(
            device_id,
            state,
            prop_f64(&props, "lower_height"),
            prop_f64(&props, "rpm") as u32,
            prop_f64(&props, "target_temperature"),
            prop_f64(&props, "current_temperature"),
            prop_f64(&props, "target_pressure"),
            prop_f64(&props, "current_pressure"),
        )),
        _ => None,
    }
}

fn prop_f64(props: &serde_json::Map<String, Value>, key: &str) -> f64 {
    props.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}
