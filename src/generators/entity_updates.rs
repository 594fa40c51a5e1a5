//! Constructors for entity update records, one per update variant.

use chrono::Utc;

use crate::protocol::{
    CartridgeProperties, CcExperimentParams, CcMachineProperties, CcsExtModuleProperties,
    ChuteProperties, ConsumableState, ContainerState, DeviceState, EntityUpdate,
    EvaporatorProperties, FlaskProperties, RobotProperties, RobotState, ToolState,
    TubeRackProperties,
};

/// Timestamp in the robot wire format `YYYY-MM-DD_HH-MM-SS.mmm`, e.g.
/// `2025-01-15_10-30-45.123`. Shared by image capture times and log entries.
pub fn wire_timestamp() -> String {
    let now = Utc::now();
    format!(
        "{}.{:03}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        now.timestamp_subsec_millis()
    )
}

pub fn robot_update(
    robot_id: &str,
    location: &str,
    state: RobotState,
    description: &str,
) -> EntityUpdate {
    EntityUpdate::Robot {
        id: robot_id.to_string(),
        properties: RobotProperties {
            location: location.to_string(),
            state,
            description: description.to_string(),
        },
    }
}

pub fn silica_cartridge_update(
    cartridge_id: &str,
    location: &str,
    state: ConsumableState,
) -> EntityUpdate {
    EntityUpdate::SilicaCartridge {
        id: cartridge_id.to_string(),
        properties: CartridgeProperties {
            location: location.to_string(),
            state,
            description: String::new(),
        },
    }
}

pub fn sample_cartridge_update(
    cartridge_id: &str,
    location: &str,
    state: ConsumableState,
) -> EntityUpdate {
    EntityUpdate::SampleCartridge {
        id: cartridge_id.to_string(),
        properties: CartridgeProperties {
            location: location.to_string(),
            state,
            description: String::new(),
        },
    }
}

pub fn tube_rack_update(
    rack_id: &str,
    location: &str,
    state: ToolState,
    description: &str,
) -> EntityUpdate {
    EntityUpdate::TubeRack {
        id: rack_id.to_string(),
        properties: TubeRackProperties {
            location: location.to_string(),
            state,
            description: description.to_string(),
        },
    }
}

pub fn round_bottom_flask_update(
    flask_id: &str,
    location: &str,
    state: ContainerState,
    description: &str,
) -> EntityUpdate {
    EntityUpdate::RoundBottomFlask {
        id: flask_id.to_string(),
        properties: FlaskProperties {
            location: location.to_string(),
            state,
            description: description.to_string(),
        },
    }
}

pub fn ccs_ext_module_update(module_id: &str, state: DeviceState, description: &str) -> EntityUpdate {
    EntityUpdate::CcsExtModule {
        id: module_id.to_string(),
        properties: CcsExtModuleProperties {
            state,
            description: description.to_string(),
        },
    }
}

pub fn cc_machine_update(
    machine_id: &str,
    state: DeviceState,
    experiment_params: Option<CcExperimentParams>,
    start_timestamp: Option<String>,
) -> EntityUpdate {
    EntityUpdate::CcMachine {
        id: machine_id.to_string(),
        properties: CcMachineProperties {
            state,
            experiment_params,
            start_timestamp,
            description: String::new(),
        },
    }
}

#[allow(clippy::too_many_arguments)]
pub fn evaporator_update(
    evaporator_id: &str,
    state: DeviceState,
    lower_height: f64,
    rpm: u32,
    target_temperature: f64,
    current_temperature: f64,
    target_pressure: f64,
    current_pressure: f64,
) -> EntityUpdate {
    EntityUpdate::Evaporator {
        id: evaporator_id.to_string(),
        properties: EvaporatorProperties {
            state,
            description: String::new(),
            lower_height,
            rpm,
            target_temperature,
            current_temperature,
            target_pressure,
            current_pressure,
        },
    }
}

/// Left chute pulled to its fraction-recovery position. The front waste bin
/// receives an open, empty container record unless the caller supplies one.
pub fn pcc_left_chute_update(chute_id: &str, state: DeviceState) -> EntityUpdate {
    EntityUpdate::PccLeftChute {
        id: chute_id.to_string(),
        properties: chute_properties(state, Some(ContainerState::default()), None),
    }
}

/// Right chute counterpart; the back waste bin gets the open container.
pub fn pcc_right_chute_update(chute_id: &str, state: DeviceState) -> EntityUpdate {
    EntityUpdate::PccRightChute {
        id: chute_id.to_string(),
        properties: chute_properties(state, None, Some(ContainerState::default())),
    }
}

fn chute_properties(
    state: DeviceState,
    front_waste_bin: Option<ContainerState>,
    back_waste_bin: Option<ContainerState>,
) -> ChuteProperties {
    ChuteProperties {
        state,
        description: String::new(),
        pulled_out_mm: 200.0,
        pulled_out_rate: 0.8,
        closed: false,
        front_waste_bin,
        back_waste_bin,
    }
}
