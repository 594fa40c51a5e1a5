use super::*;
use crate::amqp::{LogPublisher, WirePublisher};
use crate::generators::{
    cc_machine_update, sample_cartridge_update, silica_cartridge_update, tube_rack_update,
};
use crate::protocol::{
    posture, CcExperimentParams, CollectFractionsParams, Components, ConsumableState, DeviceState,
    EntityUpdate, LogEnvelope, RobotState, SetupCartridgesParams, SetupTubeRackParams,
    StartCcParams, StartEvaporationParams, TakePhotoParams, TerminateCcParams, ToolState,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

const ROBOT_ID: &str = "talos.001";
const WS: &str = "ws_bic_09_fh_001";
const RE_WS: &str = "ws_bic_09_fh_002";

struct MemoryBus {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryBus {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
        })
    }

    fn logs(&self) -> Vec<LogEnvelope> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.ends_with(".log"))
            .map(|(_, body)| serde_json::from_slice(body).unwrap())
            .collect()
    }
}

#[async_trait]
impl WirePublisher for MemoryBus {
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> anyhow::Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((routing_key.to_string(), body));
        Ok(())
    }
}

fn test_ctx(
    world: &Arc<WorldModel>,
    bus: &Arc<MemoryBus>,
    behavior: BehaviorConfig,
) -> SimContext {
    let wire: Arc<dyn WirePublisher> = Arc::clone(bus) as Arc<dyn WirePublisher>;
    SimContext::new(
        ROBOT_ID.to_string(),
        behavior,
        Arc::clone(world),
        LogPublisher::new(wire, ROBOT_ID),
    )
}

/// Zero delays: every scaled delay collapses to nothing.
fn instant() -> BehaviorConfig {
    BehaviorConfig {
        base_delay_multiplier: 0.0,
        min_delay_seconds: 0.0,
        ..BehaviorConfig::default()
    }
}

fn find_update<'a>(
    updates: &'a [EntityUpdate],
    pred: impl Fn(&EntityUpdate) -> bool,
) -> &'a EntityUpdate {
    updates.iter().find(|u| pred(u)).expect("update not found")
}

#[tokio::test]
async fn test_setup_cartridges() {
    let world = Arc::new(WorldModel::new());
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());

    let params = TaskParams::SetupCartridges(SetupCartridgesParams {
        silica_cartridge_type: "silica_40g".to_string(),
        sample_cartridge_location: "bic_09B_l3_002".to_string(),
        sample_cartridge_type: "sample_40g".to_string(),
        sample_cartridge_id: "sample_40g_001".to_string(),
        work_station: WS.to_string(),
    });
    let result = SetupSimulator.simulate("t1", &params, &ctx).await.unwrap();

    assert_eq!(result.code, 200);
    assert_eq!(result.task_id, "t1");

    let module = find_update(&result.updates, |u| matches!(u, EntityUpdate::CcsExtModule { .. }));
    let EntityUpdate::CcsExtModule { id, properties } = module else {
        unreachable!()
    };
    assert_eq!(id, WS);
    assert_eq!(properties.state, DeviceState::Using);

    for update in &result.updates {
        if let EntityUpdate::SilicaCartridge { properties, .. }
        | EntityUpdate::SampleCartridge { properties, .. } = update
        {
            assert_eq!(properties.state, ConsumableState::Inuse);
            assert_eq!(properties.location, WS);
        }
    }

    let logs = bus.logs();
    assert!(logs.len() >= 2);
    assert!(logs.iter().all(|log| log.task_id == "t1"));
    // The robot announces the work before the cartridges land.
    let EntityUpdate::Robot { properties, .. } = &logs[0].updates[0] else {
        panic!("first log should carry the robot update");
    };
    assert_eq!(properties.state, RobotState::Working);
    assert_eq!(properties.description, posture::WAIT_FOR_SCREEN);
}

#[tokio::test]
async fn test_setup_tube_rack_resolves_tracked_rack() {
    let world = Arc::new(WorldModel::new());
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());
    let params = TaskParams::SetupTubeRack(SetupTubeRackParams {
        work_station: WS.to_string(),
    });

    // Fresh world: the default id is used.
    let result = SetupSimulator.simulate("t1", &params, &ctx).await.unwrap();
    let rack = find_update(&result.updates, |u| matches!(u, EntityUpdate::TubeRack { .. }));
    let EntityUpdate::TubeRack { id, properties } = rack else {
        unreachable!()
    };
    assert_eq!(id, "tube_rack_001");
    assert_eq!(properties.state, ToolState::Inuse);
    assert_eq!(properties.description, "mounted");

    // A rack already tracked at the station wins over the default.
    world.apply_updates(&[tube_rack_update("rack_42", WS, ToolState::Available, "")]);
    let result = SetupSimulator.simulate("t2", &params, &ctx).await.unwrap();
    let rack = find_update(&result.updates, |u| matches!(u, EntityUpdate::TubeRack { .. }));
    assert_eq!(rack.id(), "rack_42");
}

#[tokio::test]
async fn test_take_photo_generates_images() {
    let world = Arc::new(WorldModel::new());
    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Idle, None, None)]);
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());

    let params = TaskParams::TakePhoto(TakePhotoParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        components: Components::Many(vec!["screen".to_string()]),
    });
    let result = PhotoSimulator.simulate("t1", &params, &ctx).await.unwrap();

    assert_eq!(result.code, 200);
    let images = result.images.as_ref().unwrap();
    assert_eq!(images.len(), 1);
    assert!(images[0].url.contains("cc-isco-300p_001"));
    assert!(images[0].url.contains("screen"));
    assert_eq!(images[0].component, "screen");

    // Device touched to using in the log stream, idle in the final result.
    let device_states: Vec<DeviceState> = bus
        .logs()
        .iter()
        .flat_map(|log| log.updates.clone())
        .filter_map(|u| match u {
            EntityUpdate::CcMachine { properties, .. } => Some(properties.state),
            _ => None,
        })
        .collect();
    assert!(device_states.contains(&DeviceState::Using));
    let final_device = find_update(&result.updates, |u| matches!(u, EntityUpdate::CcMachine { .. }));
    let EntityUpdate::CcMachine { properties, .. } = final_device else {
        unreachable!()
    };
    assert_eq!(properties.state, DeviceState::Idle);
}

#[tokio::test]
async fn test_take_photo_empty_components() {
    let world = Arc::new(WorldModel::new());
    world.apply_updates(&[cc_machine_update("cc-isco-300p_001", DeviceState::Idle, None, None)]);
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());

    let params = TaskParams::TakePhoto(TakePhotoParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        components: Components::Many(vec![]),
    });
    let result = PhotoSimulator.simulate("t1", &params, &ctx).await.unwrap();

    assert_eq!(result.code, 200);
    assert!(result.images.as_ref().unwrap().is_empty());
}

fn start_cc_params(run_minutes: u32, air_purge_minutes: f64) -> TaskParams {
    TaskParams::StartCc(StartCcParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        experiment_params: CcExperimentParams {
            run_minutes,
            air_purge_minutes,
            ..CcExperimentParams::default()
        },
    })
}

#[tokio::test]
async fn test_start_cc_zero_duration_skips_progress_phase() {
    let world = Arc::new(WorldModel::new());
    world.apply_updates(&[
        silica_cartridge_update("silica_40g", WS, ConsumableState::Inuse),
        sample_cartridge_update("sample_40g_001", WS, ConsumableState::Inuse),
        tube_rack_update("tube_rack_001", WS, ToolState::Inuse, "mounted"),
    ]);
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());

    let result = CcSimulator
        .simulate("t1", &start_cc_params(0, 0.0), &ctx)
        .await
        .unwrap();

    assert_eq!(result.code, 200);
    let logs = bus.logs();
    assert!(logs.iter().all(|log| log.msg != "CC in progress"));
    assert_eq!(logs.last().unwrap().msg, "CC process started");

    // Machine stays in use; robot keeps watching the screen; resolved
    // material ids flow into the result.
    let machine = find_update(&result.updates, |u| matches!(u, EntityUpdate::CcMachine { .. }));
    let EntityUpdate::CcMachine { properties, .. } = machine else {
        unreachable!()
    };
    assert_eq!(properties.state, DeviceState::Using);
    assert!(properties.experiment_params.is_some());
    assert!(properties.start_timestamp.is_some());

    let robot = find_update(&result.updates, |u| matches!(u, EntityUpdate::Robot { .. }));
    let EntityUpdate::Robot { properties, .. } = robot else {
        unreachable!()
    };
    assert_eq!(properties.state, RobotState::Working);
    assert_eq!(properties.description, posture::WATCH_CC_SCREEN);

    let rack = find_update(&result.updates, |u| matches!(u, EntityUpdate::TubeRack { .. }));
    assert_eq!(rack.id(), "tube_rack_001");

    // Phase-one updates were applied immediately, before the final result.
    let tracked = world
        .get(crate::protocol::EntityKind::ColumnChromatographyMachine, "cc-isco-300p_001")
        .unwrap();
    assert_eq!(tracked.get("state").and_then(|v| v.as_str()), Some("using"));
}

#[tokio::test(start_paused = true)]
async fn test_start_cc_emits_periodic_progress() {
    let world = Arc::new(WorldModel::new());
    let bus = MemoryBus::new();
    let behavior = BehaviorConfig {
        base_delay_multiplier: 1.0,
        min_delay_seconds: 0.0,
        cc_intermediate_interval_seconds: 60.0,
        ..BehaviorConfig::default()
    };
    let ctx = test_ctx(&world, &bus, behavior);

    // 3 minutes of run, one-minute interval: progress at 60s and 120s.
    let result = CcSimulator
        .simulate("t1", &start_cc_params(3, 0.0), &ctx)
        .await
        .unwrap();

    assert_eq!(result.code, 200);
    let progress = bus
        .logs()
        .iter()
        .filter(|log| log.msg == "CC in progress")
        .count();
    assert_eq!(progress, 2);
}

#[tokio::test]
async fn test_terminate_cc_preserves_experiment_context() {
    let world = Arc::new(WorldModel::new());
    world.apply_updates(&[
        cc_machine_update(
            "cc-isco-300p_001",
            DeviceState::Using,
            Some(CcExperimentParams::default()),
            Some("2025-01-15_10-30-45.123".to_string()),
        ),
        silica_cartridge_update("silica_40g", WS, ConsumableState::Inuse),
        sample_cartridge_update("sample_40g_001", WS, ConsumableState::Inuse),
        tube_rack_update("tube_rack_001", WS, ToolState::Inuse, "mounted"),
    ]);
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());

    let params = TaskParams::TerminateCc(TerminateCcParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        experiment_params: CcExperimentParams::default(),
    });
    let result = CcSimulator.simulate("t1", &params, &ctx).await.unwrap();

    assert_eq!(result.code, 200);
    let machine = find_update(&result.updates, |u| matches!(u, EntityUpdate::CcMachine { .. }));
    let EntityUpdate::CcMachine { properties, .. } = machine else {
        unreachable!()
    };
    assert_eq!(properties.state, DeviceState::Idle);
    assert_eq!(
        properties.start_timestamp.as_deref(),
        Some("2025-01-15_10-30-45.123")
    );

    let rack = find_update(&result.updates, |u| matches!(u, EntityUpdate::TubeRack { .. }));
    let EntityUpdate::TubeRack { properties, .. } = rack else {
        unreachable!()
    };
    assert_eq!(properties.state, ToolState::Contaminated);
    assert_eq!(properties.description, "used");

    let module = find_update(&result.updates, |u| matches!(u, EntityUpdate::CcsExtModule { .. }));
    let EntityUpdate::CcsExtModule { properties, .. } = module else {
        unreachable!()
    };
    assert_eq!(properties.description, "cartridges still mounted");

    let images = result.images.as_ref().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].component, "screen");
}

#[tokio::test]
async fn test_collect_fractions_all_zero_config() {
    let world = Arc::new(WorldModel::new());
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());

    let params = TaskParams::CollectFractions(CollectFractionsParams {
        work_station: WS.to_string(),
        device_id: "cc-isco-300p_001".to_string(),
        device_type: "cc-isco-300p".to_string(),
        collect_config: vec![0, 0, 0, 0],
    });
    let result = ConsolidationSimulator.simulate("t1", &params, &ctx).await.unwrap();

    assert_eq!(result.code, 200);
    // Chutes and flask still appear even when nothing is collected.
    assert!(result
        .updates
        .iter()
        .any(|u| matches!(u, EntityUpdate::PccLeftChute { .. })));
    assert!(result
        .updates
        .iter()
        .any(|u| matches!(u, EntityUpdate::PccRightChute { .. })));

    let flask = find_update(&result.updates, |u| {
        matches!(u, EntityUpdate::RoundBottomFlask { .. })
    });
    let EntityUpdate::RoundBottomFlask { properties, .. } = flask else {
        unreachable!()
    };
    assert_eq!(
        properties.state.content_state,
        crate::protocol::ContainerContentState::Fill
    );

    let robot = find_update(&result.updates, |u| matches!(u, EntityUpdate::Robot { .. }));
    let EntityUpdate::Robot { properties, .. } = robot else {
        unreachable!()
    };
    assert_eq!(properties.state, RobotState::Working);
    assert_eq!(properties.description, posture::MOVING_WITH_FLASK);
}

#[tokio::test(start_paused = true)]
async fn test_evaporation_ramps_toward_targets() {
    let world = Arc::new(WorldModel::new());
    let bus = MemoryBus::new();
    let behavior = BehaviorConfig {
        base_delay_multiplier: 1.0,
        min_delay_seconds: 0.0,
        re_intermediate_interval_seconds: 4.0,
        ..BehaviorConfig::default()
    };
    let ctx = test_ctx(&world, &bus, behavior);

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
            },
            "updates": [{
                "lower_height": 50.0,
                "rpm": 120,
                "target_temperature": 45.0,
                "target_pressure": 120.0,
                "trigger": {"type": "time_from_start", "time_in_sec": 10}
            }]
        }))
        .unwrap(),
    });
    let result = EvaporationSimulator.simulate("t1", &params, &ctx).await.unwrap();

    assert_eq!(result.code, 200);

    // Ramp readings sit strictly between ambient and target.
    let ramp_readings: Vec<(f64, f64)> = bus
        .logs()
        .iter()
        .filter(|log| log.msg == "evaporation ramp in progress")
        .flat_map(|log| log.updates.clone())
        .filter_map(|u| match u {
            EntityUpdate::Evaporator { properties, .. } => {
                Some((properties.current_temperature, properties.current_pressure))
            }
            _ => None,
        })
        .collect();
    assert_eq!(ramp_readings.len(), 2);
    for (temperature, pressure) in &ramp_readings {
        assert!(*temperature > 25.0 && *temperature < 45.0);
        assert!(*pressure < 1013.0 && *pressure > 120.0);
    }

    // Final readings equal the targets; the robot keeps observing.
    let evaporator = find_update(&result.updates, |u| matches!(u, EntityUpdate::Evaporator { .. }));
    let EntityUpdate::Evaporator { properties, .. } = evaporator else {
        unreachable!()
    };
    assert_eq!(properties.state, DeviceState::Using);
    assert_eq!(properties.current_temperature, 45.0);
    assert_eq!(properties.current_pressure, 120.0);

    let robot = find_update(&result.updates, |u| matches!(u, EntityUpdate::Robot { .. }));
    let EntityUpdate::Robot { properties, .. } = robot else {
        unreachable!()
    };
    assert_eq!(properties.description, posture::OBSERVE_EVAPORATION);

    // The flask entered the world during phase one.
    assert!(world
        .get(crate::protocol::EntityKind::RoundBottomFlask, "rbf_001")
        .is_some());
}

#[tokio::test]
async fn test_simulators_reject_foreign_tasks() {
    let world = Arc::new(WorldModel::new());
    let bus = MemoryBus::new();
    let ctx = test_ctx(&world, &bus, instant());

    let params = TaskParams::SetupTubeRack(SetupTubeRackParams {
        work_station: WS.to_string(),
    });
    assert!(PhotoSimulator.simulate("t1", &params, &ctx).await.is_err());
    assert!(CcSimulator.simulate("t1", &params, &ctx).await.is_err());
    assert!(EvaporationSimulator.simulate("t1", &params, &ctx).await.is_err());
    assert!(ConsolidationSimulator.simulate("t1", &params, &ctx).await.is_err());
}
