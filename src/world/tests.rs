use super::preconditions;
use super::*;
use crate::protocol::{
    CcExperimentParams, CollectFractionsParams, Components, ConsumableState, ContainerState,
    DeviceState, RobotState, SetupCartridgesParams, SetupTubeRackParams, StartCcParams,
    StartEvaporationParams, TakePhotoParams, TaskParams, TerminateCcParams, ToolState,
};
use crate::generators::{
    cc_machine_update, ccs_ext_module_update, evaporator_update, robot_update,
    round_bottom_flask_update, sample_cartridge_update, silica_cartridge_update, tube_rack_update,
};
use serde_json::json;
use std::sync::Arc;
use std::thread;

const WS: &str = "ws_bic_09_fh_001";
const RE_WS: &str = "ws_bic_09_fh_002";

#[test]
fn test_apply_updates_creates_entities() {
    let world = WorldModel::new();
    assert!(world.is_empty());

    world.apply_updates(&[robot_update("talos.001", WS, RobotState::Working, "")]);

    let robot = world.get(EntityKind::Robot, "talos.001").unwrap();
    assert_eq!(robot.get("state").and_then(|v| v.as_str()), Some("working"));
    assert_eq!(robot.get("location").and_then(|v| v.as_str()), Some(WS));
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn test_merge_never_deletes_properties() {
    let world = WorldModel::new();
    // First update carries experiment params.
    world.apply_updates(&[cc_machine_update(
        "cc-isco-300p_001",
        DeviceState::Using,
        Some(CcExperimentParams::default()),
        Some("2025-01-15_10-30-45.123".to_string()),
    )]);
    // Second update carries only the state.
    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Idle, None, None)]);

    let machine = world
        .get(EntityKind::ColumnChromatographyMachine, "cc-isco-300p_001")
        .unwrap();
    assert_eq!(machine.get("state").and_then(|v| v.as_str()), Some("idle"));
    // Prior fields survived the merge.
    assert!(machine.contains_key("experiment_params"));
    assert_eq!(
        machine.get("start_timestamp").and_then(|v| v.as_str()),
        Some("2025-01-15_10-30-45.123")
    );
}

#[test]
fn test_upsert_merges_raw_properties() {
    let world = WorldModel::new();
    let mut first = serde_json::Map::new();
    first.insert("state".to_string(), json!("idle"));
    first.insert("location".to_string(), json!(WS));
    world.upsert(EntityKind::Robot, "talos.001", first);

    let mut second = serde_json::Map::new();
    second.insert("state".to_string(), json!("charging"));
    world.upsert(EntityKind::Robot, "talos.001", second);

    let robot = world.get(EntityKind::Robot, "talos.001").unwrap();
    assert_eq!(robot.get("state").and_then(|v| v.as_str()), Some("charging"));
    assert_eq!(robot.get("location").and_then(|v| v.as_str()), Some(WS));
}

#[test]
fn test_get_returns_copies() {
    let world = WorldModel::new();
    world.apply_updates(&[robot_update("talos.001", WS, RobotState::Idle, "")]);

    let mut copy = world.get(EntityKind::Robot, "talos.001").unwrap();
    copy.insert("state".to_string(), json!("charging"));

    // Mutating the copy must not touch the stored record.
    let stored = world.get(EntityKind::Robot, "talos.001").unwrap();
    assert_eq!(stored.get("state").and_then(|v| v.as_str()), Some("idle"));
}

#[test]
fn test_find_by_location_scans_kind_slice_only() {
    let world = WorldModel::new();
    world.apply_updates(&[
        tube_rack_update("tube_rack_001", WS, ToolState::Inuse, "mounted"),
        silica_cartridge_update("silica_40g", WS, ConsumableState::Inuse),
    ]);

    let (id, props) = world.find_by_location(EntityKind::TubeRack, WS).unwrap();
    assert_eq!(id, "tube_rack_001");
    assert_eq!(props.get("state").and_then(|v| v.as_str()), Some("inuse"));

    assert!(world.find_by_location(EntityKind::TubeRack, RE_WS).is_none());
    assert!(world
        .find_by_location(EntityKind::SampleCartridge, WS)
        .is_none());
}

#[test]
fn test_snapshot_robot_state() {
    let world = WorldModel::new();
    // Untracked robot reads as disconnected.
    assert_eq!(world.snapshot_robot_state("talos.001"), RobotState::Disconnected);

    world.apply_updates(&[robot_update("talos.001", WS, RobotState::Working, "")]);
    assert_eq!(world.snapshot_robot_state("talos.001"), RobotState::Working);

    world.reset();
    assert_eq!(world.snapshot_robot_state("talos.001"), RobotState::Disconnected);
}

#[test]
fn test_reset_clears_everything() {
    let world = WorldModel::new();
    world.apply_updates(&[
        robot_update("talos.001", WS, RobotState::Idle, ""),
        tube_rack_update("tube_rack_001", WS, ToolState::Inuse, "mounted"),
    ]);
    assert_eq!(world.entity_count(), 2);

    world.reset();
    assert!(world.is_empty());
    assert!(world.get(EntityKind::TubeRack, "tube_rack_001").is_none());
}

#[test]
fn test_apply_then_read_round_trips_properties() {
    let world = WorldModel::new();
    let update = evaporator_update("re-buchi-r180_001", DeviceState::Using, 50.0, 120, 45.0, 25.0, 120.0, 1013.0);
    world.apply_updates(&[update.clone()]);

    // The stored record serializes to exactly the JSON shape the update
    // carried.
    let stored = world.get(EntityKind::Evaporator, "re-buchi-r180_001").unwrap();
    assert_eq!(
        serde_json::Value::Object(stored),
        serde_json::Value::Object(update.properties_object())
    );
}

#[test]
fn test_concurrent_updates() {
    let world = Arc::new(WorldModel::new());
    let mut handles = vec![];

    for i in 0..10 {
        let world_clone = Arc::clone(&world);
        let handle = thread::spawn(move || {
            let id = format!("tube_rack_{:03}", i);
            world_clone.apply_updates(&[tube_rack_update(&id, WS, ToolState::Available, "")]);
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(world.entity_count(), 10);
}

// --- Preconditions ---

fn setup_cartridges_params() -> TaskParams {
    TaskParams::SetupCartridges(SetupCartridgesParams {
        silica_cartridge_type: "silica_40g".to_string(),
        sample_cartridge_location: "bic_09B_l3_002".to_string(),
        sample_cartridge_type: "sample_40g".to_string(),
        sample_cartridge_id: "sample_40g_001".to_string(),
        work_station: WS.to_string(),
    })
}

fn start_cc_params() -> TaskParams {
    TaskParams::StartCc(StartCcParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        experiment_params: CcExperimentParams::default(),
    })
}

fn mounted_materials() -> Vec<crate::protocol::EntityUpdate> {
    vec![
        silica_cartridge_update("silica_40g", WS, ConsumableState::Inuse),
        sample_cartridge_update("sample_40g_001", WS, ConsumableState::Inuse),
        tube_rack_update("tube_rack_001", WS, ToolState::Inuse, "mounted"),
        ccs_ext_module_update(WS, DeviceState::Using, ""),
    ]
}

#[test]
fn test_setup_cartridges_refused_when_module_in_use() {
    let world = WorldModel::new();
    assert!(preconditions::check(&world, &setup_cartridges_params()).is_ok());

    world.apply_updates(&[ccs_ext_module_update(WS, DeviceState::Using, "")]);
    let refusal = preconditions::check(&world, &setup_cartridges_params()).unwrap_err();
    assert_eq!(refusal.code, 2001);
}

#[test]
fn test_setup_tube_rack_refused_when_rack_present() {
    let world = WorldModel::new();
    let params = TaskParams::SetupTubeRack(SetupTubeRackParams {
        work_station: WS.to_string(),
    });
    assert!(preconditions::check(&world, &params).is_ok());

    world.apply_updates(&[tube_rack_update("tube_rack_001", WS, ToolState::Inuse, "mounted")]);
    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2002);
}

#[test]
fn test_start_cc_requires_materials() {
    let world = WorldModel::new();

    // Nothing mounted: silica missing first.
    let refusal = preconditions::check(&world, &start_cc_params()).unwrap_err();
    assert_eq!(refusal.code, 2021);

    world.apply_updates(&[silica_cartridge_update("silica_40g", WS, ConsumableState::Inuse)]);
    let refusal = preconditions::check(&world, &start_cc_params()).unwrap_err();
    assert_eq!(refusal.code, 2022);

    world.apply_updates(&[sample_cartridge_update("sample_40g_001", WS, ConsumableState::Inuse)]);
    let refusal = preconditions::check(&world, &start_cc_params()).unwrap_err();
    assert_eq!(refusal.code, 2023);

    world.apply_updates(&[tube_rack_update("tube_rack_001", WS, ToolState::Inuse, "mounted")]);
    assert!(preconditions::check(&world, &start_cc_params()).is_ok());
}

#[test]
fn test_start_cc_refused_when_machine_busy() {
    let world = WorldModel::new();
    world.apply_updates(&mounted_materials());
    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Using, None, None)]);

    let refusal = preconditions::check(&world, &start_cc_params()).unwrap_err();
    assert_eq!(refusal.code, 2020);
}

#[test]
fn test_terminate_cc_requires_running_machine() {
    let world = WorldModel::new();
    let params = TaskParams::TerminateCc(TerminateCcParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        experiment_params: CcExperimentParams::default(),
    });

    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2030);

    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Idle, None, None)]);
    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2031);

    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Using, None, None)]);
    assert!(preconditions::check(&world, &params).is_ok());
}

#[test]
fn test_collect_fractions_preconditions() {
    let world = WorldModel::new();
    let params = TaskParams::CollectFractions(CollectFractionsParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        collect_config: vec![1, 0, 1],
    });

    // Machine never terminated.
    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2040);

    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Idle, None, None)]);
    // Rack not contaminated yet.
    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2041);

    world.apply_updates(&[tube_rack_update("tube_rack_001", WS, ToolState::Contaminated, "used")]);
    assert!(preconditions::check(&world, &params).is_ok());
}

#[test]
fn test_start_evaporation_requires_filled_flask() {
    let world = WorldModel::new();
    let params = TaskParams::StartEvaporation(StartEvaporationParams {
        work_station: RE_WS.to_string(),
        device_id: "re-buchi-r180_001".to_string(),
        device_type: "re-buchi-r180".to_string(),
        profiles: serde_json::from_value(json!({
            "start": {
                "lower_height": 50.0,
                "rpm": 120,
                "target_temperature": 45.0,
                "target_pressure": 120.0
            }
        }))
        .unwrap(),
    });

    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2050);

    // An empty flask at the station does not count.
    world.apply_updates(&[round_bottom_flask_update(
        "rbf_001",
        RE_WS,
        ContainerState::default(),
        "",
    )]);
    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2050);

    world.apply_updates(&[round_bottom_flask_update(
        "rbf_001",
        RE_WS,
        ContainerState::filled(),
        "",
    )]);
    assert!(preconditions::check(&world, &params).is_ok());
}

#[test]
fn test_take_photo_requires_tracked_device() {
    let world = WorldModel::new();
    let params = TaskParams::TakePhoto(TakePhotoParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        components: Components::One("screen".to_string()),
    });

    let refusal = preconditions::check(&world, &params).unwrap_err();
    assert_eq!(refusal.code, 2060);

    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Idle, None, None)]);
    assert!(preconditions::check(&world, &params).is_ok());
}
