//! Delay and duration math for task pacing.
//!
//! Everything takes the random source as an argument so tests can seed it.

use rand::Rng;

use crate::protocol::{CcExperimentParams, EvaporationProfiles, TriggerType};

/// Evaporation runs 60 minutes when no profile update carries a
/// time-from-start trigger.
const DEFAULT_EVAPORATION_MINUTES: f64 = 60.0;

/// Randomized delay: `uniform(base_min, base_max) * multiplier`, never below
/// `floor`.
pub fn scaled_delay(
    rng: &mut impl Rng,
    base_min: f64,
    base_max: f64,
    multiplier: f64,
    floor: f64,
) -> f64 {
    let base = rng.gen_range(base_min..=base_max);
    (base * multiplier).max(floor)
}

/// Total column chromatography duration in seconds: the configured run plus
/// the trailing air purge, scaled by the multiplier.
pub fn cc_duration(params: &CcExperimentParams, multiplier: f64) -> f64 {
    (params.run_minutes as f64 + params.air_purge_minutes) * 60.0 * multiplier
}

/// Evaporation duration in seconds, derived from the latest time-from-start
/// trigger among the profile updates.
pub fn evaporation_duration(profiles: &EvaporationProfiles, multiplier: f64) -> f64 {
    let latest_trigger = profiles
        .updates
        .iter()
        .filter_map(|profile| profile.trigger.as_ref())
        .filter(|trigger| trigger.trigger_type == TriggerType::TimeFromStart)
        .filter_map(|trigger| trigger.time_in_sec)
        .max();
    let base_seconds = match latest_trigger {
        Some(secs) => secs as f64,
        None => DEFAULT_EVAPORATION_MINUTES * 60.0,
    };
    base_seconds * multiplier
}

/// Interval between intermediate updates of a long-running task: the
/// configured interval scaled by the multiplier, floored.
pub fn intermediate_interval(configured: f64, multiplier: f64, floor: f64) -> f64 {
    (configured * multiplier).max(floor)
}
