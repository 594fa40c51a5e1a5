//! Wire protocol for the robot exchange.
//!
//! Self-contained types for the contract between the lab controller and the
//! robot: task commands, entity updates, results, log entries, and
//! heartbeats. All bodies are UTF-8 JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

mod params;
mod update;


pub use params::{
    CcExperimentParams, CcGradientConfig, CollectFractionsParams, Components, EvaporationProfile,
    EvaporationProfiles, EvaporationTrigger, SetupCartridgesParams, SetupTubeRackParams,
    StartCcParams, StartEvaporationParams, TakePhotoParams, TaskParams, TerminateCcParams,
    TriggerType,
};
pub use update::{
    device_entity_kind, CartridgeProperties, CcMachineProperties, CcsExtModuleProperties,
    ChuteProperties, EntityKind, EntityUpdate, EvaporatorProperties, FlaskProperties,
    RobotProperties, TubeRackProperties,
};

/// Reserved command that clears world state without going through the
/// simulation pipeline. Not a [`TaskType`]; checked against the raw
/// `task_type` string before task parsing.
pub const RESET_STATE: &str = "reset_state";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Robot task command types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "setup_tubes_to_column_machine")]
    SetupCartridges,
    #[serde(rename = "setup_tube_rack")]
    SetupTubeRack,
    #[serde(rename = "take_photo")]
    TakePhoto,
    #[serde(rename = "start_column_chromatography")]
    StartCc,
    #[serde(rename = "terminate_column_chromatography")]
    TerminateCc,
    #[serde(rename = "collect_column_chromatography_fractions")]
    CollectFractions,
    #[serde(rename = "start_evaporation")]
    StartEvaporation,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::SetupCartridges,
        TaskType::SetupTubeRack,
        TaskType::TakePhoto,
        TaskType::StartCc,
        TaskType::TerminateCc,
        TaskType::CollectFractions,
        TaskType::StartEvaporation,
    ];

    /// Parse the wire name. Returns `None` for unknown task types, which the
    /// pipeline reports as code 1000.
    pub fn parse(wire: &str) -> Option<TaskType> {
        match wire {
            "setup_tubes_to_column_machine" => Some(TaskType::SetupCartridges),
            "setup_tube_rack" => Some(TaskType::SetupTubeRack),
            "take_photo" => Some(TaskType::TakePhoto),
            "start_column_chromatography" => Some(TaskType::StartCc),
            "terminate_column_chromatography" => Some(TaskType::TerminateCc),
            "collect_column_chromatography_fractions" => Some(TaskType::CollectFractions),
            "start_evaporation" => Some(TaskType::StartEvaporation),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            TaskType::SetupCartridges => "setup_tubes_to_column_machine",
            TaskType::SetupTubeRack => "setup_tube_rack",
            TaskType::TakePhoto => "take_photo",
            TaskType::StartCc => "start_column_chromatography",
            TaskType::TerminateCc => "terminate_column_chromatography",
            TaskType::CollectFractions => "collect_column_chromatography_fractions",
            TaskType::StartEvaporation => "start_evaporation",
        }
    }

    /// Long-running tasks run concurrently with further command intake and
    /// publish their own final result.
    pub fn is_long_running(&self) -> bool {
        matches!(self, TaskType::StartCc | TaskType::StartEvaporation)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Robot operational states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotState {
    Idle,
    Working,
    Charging,
    Disconnected,
}

impl RobotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotState::Idle => "idle",
            RobotState::Working => "working",
            RobotState::Charging => "charging",
            RobotState::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device states (CC machine, evaporator, ext module, chutes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Idle,
    Using,
    Unavailable,
}

/// Consumable states (silica and sample cartridges).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumableState {
    Unused,
    Inuse,
    Used,
}

/// Tool states (tube rack).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    Available,
    Inuse,
    Contaminated,
}

/// Container content states (round bottom flask, waste bins).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerContentState {
    Empty,
    Fill,
    Used,
}

/// Container lid states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerLidState {
    Closed,
    Opened,
}

/// Substance unit types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstanceUnit {
    Ml,
    L,
    G,
    Kg,
    Mg,
}

/// Peak collection modes for column chromatography.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakGatheringMode {
    All,
    Peak,
    None,
}

/// Robot posture descriptions carried in the free-text `description`
/// property while the robot is `working`. Deliberately not an enum: the
/// robot may add new postures without a protocol change.
pub mod posture {
    pub const WAIT_FOR_SCREEN: &str = "wait_for_screen_manipulation";
    pub const WATCH_CC_SCREEN: &str = "watch_column_machine_screen";
    pub const MOVING_WITH_FLASK: &str = "moving_with_round_bottom_flask";
    pub const OBSERVE_EVAPORATION: &str = "observe_evaporation";
}

// ---------------------------------------------------------------------------
// Shared records
// ---------------------------------------------------------------------------

/// Substance carried by a container (solvent, sample).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Substance {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub zh_name: String,
    #[serde(default = "default_substance_unit")]
    pub unit: SubstanceUnit,
    #[serde(default)]
    pub amount: f64,
}

fn default_substance_unit() -> SubstanceUnit {
    SubstanceUnit::Ml
}

impl Default for Substance {
    fn default() -> Self {
        Self {
            name: String::new(),
            zh_name: String::new(),
            unit: SubstanceUnit::Ml,
            amount: 0.0,
        }
    }
}

/// Structured state of a container (flask, waste bin).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default = "default_content_state")]
    pub content_state: ContainerContentState,
    #[serde(default)]
    pub has_lid: bool,
    #[serde(default)]
    pub lid_state: Option<ContainerLidState>,
    #[serde(default)]
    pub substance: Option<Substance>,
}

fn default_content_state() -> ContainerContentState {
    ContainerContentState::Empty
}

impl Default for ContainerState {
    fn default() -> Self {
        Self {
            content_state: ContainerContentState::Empty,
            has_lid: false,
            lid_state: None,
            substance: None,
        }
    }
}

impl ContainerState {
    /// A flask freshly filled during fraction collection.
    pub fn filled() -> Self {
        Self {
            content_state: ContainerContentState::Fill,
            has_lid: false,
            lid_state: None,
            substance: Some(Substance::default()),
        }
    }
}

/// Captured image metadata returned by photo-producing tasks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedImage {
    pub work_station: String,
    pub device_id: String,
    pub device_type: String,
    pub component: String,
    pub url: String,
    #[serde(default)]
    pub create_time: String,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Incoming command envelope.
///
/// `task_type` stays a raw string here so the pipeline can distinguish an
/// unknown task (code 1000) from a structurally broken envelope (code 1001),
/// and intercept [`RESET_STATE`] before task parsing. Unknown top-level
/// fields are ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub task_id: String,
    pub task_type: String,
    #[serde(default)]
    pub params: Value,
}

/// Result envelope published to `{robot_id}.result` after a task completes
/// (or is refused).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub code: i32,
    pub msg: String,
    pub task_id: String,
    #[serde(default)]
    pub updates: Vec<EntityUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<CapturedImage>>,
}

impl TaskResult {
    pub const SUCCESS: i32 = 200;

    pub fn ok(task_id: impl Into<String>, msg: impl Into<String>, updates: Vec<EntityUpdate>) -> Self {
        Self {
            code: Self::SUCCESS,
            msg: msg.into(),
            task_id: task_id.into(),
            updates,
            images: None,
        }
    }

    pub fn failure(code: i32, msg: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            task_id: task_id.into(),
            updates: Vec::new(),
            images: None,
        }
    }

    pub fn with_images(mut self, images: Vec<CapturedImage>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

/// Intermediate state-update envelope published to `{robot_id}.log` while a
/// task is executing. Same shape as a result, plus a timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEnvelope {
    pub code: i32,
    pub msg: String,
    pub task_id: String,
    #[serde(default)]
    pub updates: Vec<EntityUpdate>,
    pub timestamp: String,
}

/// Liveness beacon published to `{robot_id}.hb`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub robot_id: String,
    pub timestamp: String,
    pub state: RobotState,
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Protocol-level error codes outside the per-task failure bands.
pub mod codes {
    /// Unknown task type.
    pub const UNKNOWN_TASK: i32 = 1000;
    /// Malformed envelope or parameter validation failure.
    pub const VALIDATION: i32 = 1001;
    /// Unhandled error inside a simulator.
    pub const SIMULATOR_ERROR: i32 = 1002;
}

/// Failure to turn an incoming message body into a dispatchable command.
#[derive(Debug)]
pub enum CommandParseError {
    /// Body is not valid JSON or missing required envelope fields.
    InvalidEnvelope(String),
    /// `task_type` is not one of the known task kinds.
    UnknownTaskType(String),
    /// `params` does not match the schema for the task type.
    InvalidParams { task_type: TaskType, detail: String },
}

impl CommandParseError {
    pub fn code(&self) -> i32 {
        match self {
            CommandParseError::InvalidEnvelope(_) => codes::VALIDATION,
            CommandParseError::UnknownTaskType(_) => codes::UNKNOWN_TASK,
            CommandParseError::InvalidParams { .. } => codes::VALIDATION,
        }
    }
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandParseError::InvalidEnvelope(detail) => {
                write!(f, "invalid command envelope: {}", detail)
            }
            CommandParseError::UnknownTaskType(name) => {
                write!(f, "unknown task type: {}", name)
            }
            CommandParseError::InvalidParams { task_type, detail } => {
                write!(f, "invalid params for {}: {}", task_type, detail)
            }
        }
    }
}

impl std::error::Error for CommandParseError {}
