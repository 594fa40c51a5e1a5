//! Task preconditions.
//!
//! Read-only checks of the world model gating a task before its simulator
//! runs. A failed check yields a structured refusal in the 2000-2099 code
//! band; the world is never mutated on that path.

use serde_json::Value;
use tracing::warn;

use crate::protocol::{device_entity_kind, EntityKind, TaskParams};
use crate::world::WorldModel;

/// Structured precondition refusal.
#[derive(Clone, Debug, PartialEq)]
pub struct Refusal {
    pub code: i32,
    pub msg: String,
}

impl Refusal {
    fn new(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

/// Check the preconditions for a parsed command against current world state.
pub fn check(world: &WorldModel, params: &TaskParams) -> Result<(), Refusal> {
    let result = match params {
        TaskParams::SetupCartridges(p) => check_setup_cartridges(world, &p.work_station),
        TaskParams::SetupTubeRack(p) => check_setup_tube_rack(world, &p.work_station),
        TaskParams::TakePhoto(p) => check_take_photo(world, &p.device_type, &p.device_id),
        TaskParams::StartCc(p) => check_start_cc(world, &p.device_id, &p.work_station),
        TaskParams::TerminateCc(p) => check_terminate_cc(world, &p.device_id),
        TaskParams::CollectFractions(p) => {
            check_collect_fractions(world, &p.device_id, &p.work_station)
        }
        TaskParams::StartEvaporation(p) => check_start_evaporation(world, &p.work_station),
    };
    if let Err(refusal) = &result {
        warn!(
            task_type = %params.task_type(),
            code = refusal.code,
            msg = %refusal.msg,
            "precondition failed"
        );
    }
    result
}

/// The ext module must not already hold cartridges at this workstation.
fn check_setup_cartridges(world: &WorldModel, work_station: &str) -> Result<(), Refusal> {
    if let Some(module) = world.get(EntityKind::CcsExtModule, work_station) {
        if state_str(&module) == Some("using") {
            return Err(Refusal::new(
                2001,
                format!(
                    "external module at {} already has cartridges mounted",
                    work_station
                ),
            ));
        }
    }
    Ok(())
}

/// No tube rack may already be mounted at the target workstation.
fn check_setup_tube_rack(world: &WorldModel, work_station: &str) -> Result<(), Refusal> {
    if let Some((rack_id, _)) = world.find_by_location(EntityKind::TubeRack, work_station) {
        return Err(Refusal::new(
            2002,
            format!("tube rack {} already mounted at {}", rack_id, work_station),
        ));
    }
    Ok(())
}

/// The machine must be idle and all materials mounted and in use.
fn check_start_cc(world: &WorldModel, device_id: &str, work_station: &str) -> Result<(), Refusal> {
    if let Some(machine) = world.get(EntityKind::ColumnChromatographyMachine, device_id) {
        if state_str(&machine) != Some("idle") {
            return Err(Refusal::new(
                2020,
                format!("column chromatography machine {} is not idle", device_id),
            ));
        }
    }
    material_inuse(world, EntityKind::SilicaCartridge, work_station)
        .map_err(|detail| Refusal::new(2021, detail))?;
    material_inuse(world, EntityKind::SampleCartridge, work_station)
        .map_err(|detail| Refusal::new(2022, detail))?;
    material_inuse(world, EntityKind::TubeRack, work_station)
        .map_err(|detail| Refusal::new(2023, detail))?;
    Ok(())
}

/// The machine must exist and be running an experiment.
fn check_terminate_cc(world: &WorldModel, device_id: &str) -> Result<(), Refusal> {
    let machine = world
        .get(EntityKind::ColumnChromatographyMachine, device_id)
        .ok_or_else(|| {
            Refusal::new(
                2030,
                format!("column chromatography machine {} is not tracked", device_id),
            )
        })?;
    if state_str(&machine) != Some("using") {
        return Err(Refusal::new(
            2031,
            format!("column chromatography machine {} is not running", device_id),
        ));
    }
    Ok(())
}

/// The experiment must be terminated (machine idle) and the tube rack
/// contaminated by a finished run.
fn check_collect_fractions(
    world: &WorldModel,
    device_id: &str,
    work_station: &str,
) -> Result<(), Refusal> {
    let machine_idle = world
        .get(EntityKind::ColumnChromatographyMachine, device_id)
        .map(|machine| state_str(&machine) == Some("idle"))
        .unwrap_or(false);
    if !machine_idle {
        return Err(Refusal::new(
            2040,
            format!(
                "column chromatography machine {} has not been terminated",
                device_id
            ),
        ));
    }
    let contaminated = world
        .find_by_location(EntityKind::TubeRack, work_station)
        .map(|(_, rack)| state_str(&rack) == Some("contaminated"))
        .unwrap_or(false);
    if !contaminated {
        return Err(Refusal::new(
            2041,
            format!("no contaminated tube rack at {}", work_station),
        ));
    }
    Ok(())
}

/// The robot must be holding a filled flask at the evaporation workstation.
fn check_start_evaporation(world: &WorldModel, work_station: &str) -> Result<(), Refusal> {
    let filled = world
        .find_by_location(EntityKind::RoundBottomFlask, work_station)
        .map(|(_, flask)| {
            flask
                .get("state")
                .and_then(|state| state.get("content_state"))
                .and_then(Value::as_str)
                == Some("fill")
        })
        .unwrap_or(false);
    if !filled {
        return Err(Refusal::new(
            2050,
            format!("no filled round bottom flask at {}", work_station),
        ));
    }
    Ok(())
}

/// The device to photograph must be tracked in the world model.
fn check_take_photo(world: &WorldModel, device_type: &str, device_id: &str) -> Result<(), Refusal> {
    let exists = device_entity_kind(device_type)
        .map(|kind| world.get(kind, device_id).is_some())
        .unwrap_or(false);
    if !exists {
        return Err(Refusal::new(
            2060,
            format!("device {} ({}) is not tracked", device_id, device_type),
        ));
    }
    Ok(())
}

fn state_str(props: &serde_json::Map<String, Value>) -> Option<&str> {
    props.get("state").and_then(Value::as_str)
}

fn material_inuse(
    world: &WorldModel,
    kind: EntityKind,
    work_station: &str,
) -> Result<(), String> {
    match world.find_by_location(kind, work_station) {
        Some((_, props)) if state_str(&props) == Some("inuse") => Ok(()),
        Some((id, _)) => Err(format!("{} {} at {} is not in use", kind, id, work_station)),
        None => Err(format!("no {} at {}", kind, work_station)),
    }
}
