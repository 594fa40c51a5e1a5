//! Task-keyed failure table.
//!
//! Each task owns a 10-wide code band; the concrete code is the band base
//! plus the message's index, so a given code always pairs with the same
//! message.

use rand::Rng;

use crate::protocol::TaskType;

const SETUP_CARTRIDGES_FAILURES: &[&str] = &[
    "Gripper malfunction during cartridge pickup",
    "Cartridge not detected at expected storage position",
    "Silica cartridge alignment failure at work station mount point",
    "Sample cartridge barcode scan failed - cartridge may be misplaced",
];

const SETUP_TUBE_RACK_FAILURES: &[&str] = &[
    "Tube rack not detected at storage location",
    "Gripper force sensor exceeded safe threshold during rack pickup",
    "Tube rack alignment failure at work station",
];

const TAKE_PHOTO_FAILURES: &[&str] = &[
    "Camera focus failure - image quality below threshold",
    "Navigation to photo position failed - path obstructed",
    "Device screen not detected at expected position",
];

const START_CC_FAILURES: &[&str] = &[
    "Column chromatography system not responding to start command",
    "Pressure sensor reading abnormal before start - safety check failed",
    "Solvent level insufficient for configured run duration",
    "System equilibration timeout exceeded",
];

const TERMINATE_CC_FAILURES: &[&str] = &[
    "CC system did not acknowledge terminate command within timeout",
    "Emergency stop triggered during termination sequence",
    "Result screen capture failed during termination",
];

const COLLECT_FRACTIONS_FAILURES: &[&str] = &[
    "Round bottom flask not detected at consolidation station",
    "Tube extraction failure at position - tube may be stuck",
    "Flask overflow sensor triggered during consolidation",
];

const START_EVAPORATION_FAILURES: &[&str] = &[
    "Evaporator vacuum pump failed to reach target pressure",
    "Water bath temperature sensor malfunction",
    "Flask rotation motor stalled during ramp-up",
    "Safety interlock triggered - evaporator lid not properly sealed",
];

/// Base code of each task's failure band.
pub fn band_base(task_type: TaskType) -> i32 {
    match task_type {
        TaskType::SetupCartridges => 1010,
        TaskType::SetupTubeRack => 1020,
        TaskType::TakePhoto => 1040,
        TaskType::StartCc => 1050,
        TaskType::TerminateCc => 1060,
        TaskType::CollectFractions => 1070,
        TaskType::StartEvaporation => 1080,
    }
}

fn messages(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::SetupCartridges => SETUP_CARTRIDGES_FAILURES,
        TaskType::SetupTubeRack => SETUP_TUBE_RACK_FAILURES,
        TaskType::TakePhoto => TAKE_PHOTO_FAILURES,
        TaskType::StartCc => START_CC_FAILURES,
        TaskType::TerminateCc => TERMINATE_CC_FAILURES,
        TaskType::CollectFractions => COLLECT_FRACTIONS_FAILURES,
        TaskType::StartEvaporation => START_EVAPORATION_FAILURES,
    }
}

/// Uniform pick of a `(code, message)` pair from the task's band.
pub fn random_failure(rng: &mut impl Rng, task_type: TaskType) -> (i32, &'static str) {
    let set = messages(task_type);
    let index = rng.gen_range(0..set.len());
    (band_base(task_type) + index as i32, set[index])
}
