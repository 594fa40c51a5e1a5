//! Per-task command parameters.
//!
//! One struct per task type, folded into the closed [`TaskParams`] variant.
//! Defaults mirror the ground-truth protocol so sparse test commands parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CommandParseError, PeakGatheringMode, TaskType};

/// Parameters for `setup_tubes_to_column_machine`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetupCartridgesParams {
    #[serde(default = "default_silica_type")]
    pub silica_cartridge_type: String,
    #[serde(default = "default_sample_location")]
    pub sample_cartridge_location: String,
    #[serde(default = "default_sample_type")]
    pub sample_cartridge_type: String,
    pub sample_cartridge_id: String,
    #[serde(default = "default_cc_station")]
    pub work_station: String,
}

/// Parameters for `setup_tube_rack`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetupTubeRackParams {
    #[serde(default = "default_cc_station")]
    pub work_station: String,
}

/// Components to photograph: the controller sends either a single name or a
/// list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Components {
    Many(Vec<String>),
    One(String),
}

impl Components {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Components::Many(list) => list.clone(),
            Components::One(name) => vec![name.clone()],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Components::Many(list) => list.len(),
            Components::One(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters for `take_photo`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TakePhotoParams {
    pub work_station: String,
    pub device_id: String,
    pub device_type: String,
    pub components: Components,
}

/// Column chromatography gradient configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CcGradientConfig {
    pub duration_minutes: f64,
    pub solvent_b_ratio: f64,
}

/// Column chromatography experiment parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CcExperimentParams {
    #[serde(default = "default_silica_type")]
    pub silicone_cartridge: String,
    #[serde(default = "default_peak_mode")]
    pub peak_gathering_mode: PeakGatheringMode,
    #[serde(default = "default_air_purge_minutes")]
    pub air_purge_minutes: f64,
    #[serde(default = "default_run_minutes")]
    pub run_minutes: u32,
    #[serde(default = "default_solvent_a")]
    pub solvent_a: String,
    #[serde(default = "default_solvent_b")]
    pub solvent_b: String,
    #[serde(default)]
    pub gradients: Vec<CcGradientConfig>,
    #[serde(default = "default_true")]
    pub need_equilibration: bool,
    #[serde(default = "default_left_rack")]
    pub left_rack: Option<String>,
    #[serde(default)]
    pub right_rack: Option<String>,
}

impl Default for CcExperimentParams {
    fn default() -> Self {
        Self {
            silicone_cartridge: default_silica_type(),
            peak_gathering_mode: default_peak_mode(),
            air_purge_minutes: default_air_purge_minutes(),
            run_minutes: default_run_minutes(),
            solvent_a: default_solvent_a(),
            solvent_b: default_solvent_b(),
            gradients: Vec::new(),
            need_equilibration: true,
            left_rack: default_left_rack(),
            right_rack: None,
        }
    }
}

/// Parameters for `start_column_chromatography`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartCcParams {
    #[serde(default = "default_cc_station")]
    pub work_station: String,
    #[serde(default = "default_cc_device_id")]
    pub device_id: String,
    #[serde(default = "default_cc_device_type")]
    pub device_type: String,
    pub experiment_params: CcExperimentParams,
}

/// Parameters for `terminate_column_chromatography`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminateCcParams {
    #[serde(default = "default_cc_station")]
    pub work_station: String,
    #[serde(default = "default_cc_device_id")]
    pub device_id: String,
    #[serde(default = "default_cc_device_type")]
    pub device_type: String,
    #[serde(default)]
    pub experiment_params: CcExperimentParams,
}

/// Parameters for `collect_column_chromatography_fractions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectFractionsParams {
    #[serde(default = "default_cc_station")]
    pub work_station: String,
    #[serde(default = "default_cc_device_id")]
    pub device_id: String,
    #[serde(default = "default_cc_device_type")]
    pub device_type: String,
    /// 1 = collect the tube, 0 = discard.
    pub collect_config: Vec<u8>,
}

impl CollectFractionsParams {
    pub fn tubes_to_collect(&self) -> usize {
        self.collect_config.iter().filter(|&&v| v == 1).count()
    }
}

/// Trigger kind for evaporation profile changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    #[serde(rename = "time_from_start")]
    TimeFromStart,
    #[serde(rename = "event")]
    Event,
}

/// Trigger condition for an evaporation profile change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaporationTrigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

/// One evaporation parameter profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaporationProfile {
    /// Flask lowering height in mm.
    pub lower_height: f64,
    /// Rotation speed in rpm.
    pub rpm: u32,
    /// Water bath temperature in Celsius.
    pub target_temperature: f64,
    /// Vacuum pressure in mbar.
    pub target_pressure: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<EvaporationTrigger>,
}

/// Evaporation profiles: the required starting profile plus later updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaporationProfiles {
    pub start: EvaporationProfile,
    #[serde(default)]
    pub updates: Vec<EvaporationProfile>,
}

/// Parameters for `start_evaporation`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartEvaporationParams {
    #[serde(default = "default_re_station")]
    pub work_station: String,
    #[serde(default = "default_re_device_id")]
    pub device_id: String,
    #[serde(default = "default_re_device_type")]
    pub device_type: String,
    pub profiles: EvaporationProfiles,
}

// ---------------------------------------------------------------------------
// Closed param variant
// ---------------------------------------------------------------------------

/// Parsed parameters, one variant per task type. Dispatch on [`TaskType`]
/// picks the variant; there is no open string-keyed registry of shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskParams {
    SetupCartridges(SetupCartridgesParams),
    SetupTubeRack(SetupTubeRackParams),
    TakePhoto(TakePhotoParams),
    StartCc(StartCcParams),
    TerminateCc(TerminateCcParams),
    CollectFractions(CollectFractionsParams),
    StartEvaporation(StartEvaporationParams),
}

impl TaskParams {
    /// Parse the raw `params` object for the given task type.
    pub fn parse(task_type: TaskType, raw: &Value) -> Result<TaskParams, CommandParseError> {
        let invalid = |e: serde_json::Error| CommandParseError::InvalidParams {
            task_type,
            detail: e.to_string(),
        };
        Ok(match task_type {
            TaskType::SetupCartridges => {
                TaskParams::SetupCartridges(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::SetupTubeRack => {
                TaskParams::SetupTubeRack(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::TakePhoto => {
                TaskParams::TakePhoto(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::StartCc => {
                TaskParams::StartCc(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::TerminateCc => {
                TaskParams::TerminateCc(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::CollectFractions => {
                TaskParams::CollectFractions(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
            TaskType::StartEvaporation => {
                TaskParams::StartEvaporation(serde_json::from_value(raw.clone()).map_err(invalid)?)
            }
        })
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskParams::SetupCartridges(_) => TaskType::SetupCartridges,
            TaskParams::SetupTubeRack(_) => TaskType::SetupTubeRack,
            TaskParams::TakePhoto(_) => TaskType::TakePhoto,
            TaskParams::StartCc(_) => TaskType::StartCc,
            TaskParams::TerminateCc(_) => TaskType::TerminateCc,
            TaskParams::CollectFractions(_) => TaskType::CollectFractions,
            TaskParams::StartEvaporation(_) => TaskType::StartEvaporation,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults (ground-truth values)
// ---------------------------------------------------------------------------

fn default_silica_type() -> String {
    "silica_40g".to_string()
}

fn default_sample_location() -> String {
    "bic_09B_l3_002".to_string()
}

fn default_sample_type() -> String {
    "sample_40g".to_string()
}

fn default_cc_station() -> String {
    "ws_bic_09_fh_001".to_string()
}

fn default_re_station() -> String {
    "ws_bic_09_fh_002".to_string()
}

fn default_cc_device_id() -> String {
    "cc-isco-300p_001".to_string()
}

fn default_cc_device_type() -> String {
    "cc-isco-300p".to_string()
}

fn default_re_device_id() -> String {
    "re-buchi-r180_001".to_string()
}

fn default_re_device_type() -> String {
    "re-buchi-r180".to_string()
}

fn default_peak_mode() -> PeakGatheringMode {
    PeakGatheringMode::Peak
}

fn default_air_purge_minutes() -> f64 {
    1.2
}

fn default_run_minutes() -> u32 {
    30
}

fn default_solvent_a() -> String {
    "pet_ether".to_string()
}

fn default_solvent_b() -> String {
    "ethyl_acetate".to_string()
}

fn default_left_rack() -> Option<String> {
    Some("16x150".to_string())
}

fn default_true() -> bool {
    true
}
