//! Entity updates: the tagged records carried in results and log entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::{CcExperimentParams, ConsumableState, ContainerState, DeviceState, RobotState, ToolState};

/// Entity kinds tracked by the world model. Wire names are the `type` tags
/// of [`EntityUpdate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Robot,
    SilicaCartridge,
    SampleCartridge,
    TubeRack,
    RoundBottomFlask,
    CcsExtModule,
    ColumnChromatographyMachine,
    Evaporator,
    PccLeftChute,
    PccRightChute,
}

impl EntityKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            EntityKind::Robot => "robot",
            EntityKind::SilicaCartridge => "silica_cartridge",
            EntityKind::SampleCartridge => "sample_cartridge",
            EntityKind::TubeRack => "tube_rack",
            EntityKind::RoundBottomFlask => "round_bottom_flask",
            EntityKind::CcsExtModule => "ccs_ext_module",
            EntityKind::ColumnChromatographyMachine => "column_chromatography_machine",
            EntityKind::Evaporator => "evaporator",
            EntityKind::PccLeftChute => "pcc_left_chute",
            EntityKind::PccRightChute => "pcc_right_chute",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Map a command's `device_type` to the entity kind tracking that device.
/// Returns `None` for device families the mock does not model.
pub fn device_entity_kind(device_type: &str) -> Option<EntityKind> {
    let lowered = device_type.to_ascii_lowercase();
    if lowered.starts_with("cc-")
        || lowered.contains("column_chromatography")
        || lowered.contains("combiflash")
        || lowered.contains("isco")
    {
        Some(EntityKind::ColumnChromatographyMachine)
    } else if lowered.starts_with("re-") || lowered.contains("evaporator") || lowered.contains("rotary") {
        Some(EntityKind::Evaporator)
    } else {
        None
    }
}

/// Robot entity properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RobotProperties {
    pub location: String,
    pub state: RobotState,
    #[serde(default)]
    pub description: String,
}

/// Silica/sample cartridge properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartridgeProperties {
    pub location: String,
    pub state: ConsumableState,
    #[serde(default)]
    pub description: String,
}

/// Tube rack properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TubeRackProperties {
    pub location: String,
    pub state: ToolState,
    #[serde(default)]
    pub description: String,
}

/// Round bottom flask properties. The state is a structured container
/// record, not a flat enum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaskProperties {
    pub location: String,
    pub state: ContainerState,
    #[serde(default)]
    pub description: String,
}

/// CC external module properties. The module is fixed to its workstation,
/// so it carries no location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CcsExtModuleProperties {
    pub state: DeviceState,
    #[serde(default)]
    pub description: String,
}

/// Column chromatography machine properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CcMachineProperties {
    pub state: DeviceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_params: Option<CcExperimentParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Evaporator properties with sensor readings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaporatorProperties {
    pub state: DeviceState,
    #[serde(default)]
    pub description: String,
    pub lower_height: f64,
    pub rpm: u32,
    pub target_temperature: f64,
    pub current_temperature: f64,
    pub target_pressure: f64,
    pub current_pressure: f64,
}

/// Post-CC chute properties (both chutes share the shape).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChuteProperties {
    pub state: DeviceState,
    #[serde(default)]
    pub description: String,
    pub pulled_out_mm: f64,
    pub pulled_out_rate: f64,
    pub closed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_waste_bin: Option<ContainerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_waste_bin: Option<ContainerState>,
}

/// One entity state update, discriminated by the `type` field on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntityUpdate {
    #[serde(rename = "robot")]
    Robot { id: String, properties: RobotProperties },
    #[serde(rename = "silica_cartridge")]
    SilicaCartridge { id: String, properties: CartridgeProperties },
    #[serde(rename = "sample_cartridge")]
    SampleCartridge { id: String, properties: CartridgeProperties },
    #[serde(rename = "tube_rack")]
    TubeRack { id: String, properties: TubeRackProperties },
    #[serde(rename = "round_bottom_flask")]
    RoundBottomFlask { id: String, properties: FlaskProperties },
    #[serde(rename = "ccs_ext_module")]
    CcsExtModule { id: String, properties: CcsExtModuleProperties },
    #[serde(rename = "column_chromatography_machine")]
    CcMachine { id: String, properties: CcMachineProperties },
    #[serde(rename = "evaporator")]
    Evaporator { id: String, properties: EvaporatorProperties },
    #[serde(rename = "pcc_left_chute")]
    PccLeftChute { id: String, properties: ChuteProperties },
    #[serde(rename = "pcc_right_chute")]
    PccRightChute { id: String, properties: ChuteProperties },
}

impl EntityUpdate {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityUpdate::Robot { .. } => EntityKind::Robot,
            EntityUpdate::SilicaCartridge { .. } => EntityKind::SilicaCartridge,
            EntityUpdate::SampleCartridge { .. } => EntityKind::SampleCartridge,
            EntityUpdate::TubeRack { .. } => EntityKind::TubeRack,
            EntityUpdate::RoundBottomFlask { .. } => EntityKind::RoundBottomFlask,
            EntityUpdate::CcsExtModule { .. } => EntityKind::CcsExtModule,
            EntityUpdate::CcMachine { .. } => EntityKind::ColumnChromatographyMachine,
            EntityUpdate::Evaporator { .. } => EntityKind::Evaporator,
            EntityUpdate::PccLeftChute { .. } => EntityKind::PccLeftChute,
            EntityUpdate::PccRightChute { .. } => EntityKind::PccRightChute,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityUpdate::Robot { id, .. }
            | EntityUpdate::SilicaCartridge { id, .. }
            | EntityUpdate::SampleCartridge { id, .. }
            | EntityUpdate::TubeRack { id, .. }
            | EntityUpdate::RoundBottomFlask { id, .. }
            | EntityUpdate::CcsExtModule { id, .. }
            | EntityUpdate::CcMachine { id, .. }
            | EntityUpdate::Evaporator { id, .. }
            | EntityUpdate::PccLeftChute { id, .. }
            | EntityUpdate::PccRightChute { id, .. } => id,
        }
    }

    /// The update's properties as a JSON object, for merging into the world
    /// model. Fields the update does not carry (skipped `None`s) are absent
    /// from the map and therefore never overwrite prior state.
    pub fn properties_object(&self) -> Map<String, Value> {
        let value = match self {
            EntityUpdate::Robot { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::SilicaCartridge { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::SampleCartridge { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::TubeRack { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::RoundBottomFlask { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::CcsExtModule { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::CcMachine { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::Evaporator { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::PccLeftChute { properties, .. } => serde_json::to_value(properties),
            EntityUpdate::PccRightChute { properties, .. } => serde_json::to_value(properties),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
