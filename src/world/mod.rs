//! In-memory world model.
//!
//! Tracks the latest known properties of every entity the robot has touched,
//! keyed by `(kind, id)`. All access serializes under a single lock and
//! callers only ever receive copies, so simulators running concurrently with
//! the heartbeat loop cannot race on shared records.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::protocol::{EntityKind, EntityUpdate, RobotState};

pub mod preconditions;

#[cfg(test)]
mod tests;

type PropertyMap = Map<String, Value>;

/// Thread-safe keyed store of entity property maps with merge semantics.
///
/// Applying an update never deletes a property: it overwrites only the
/// fields the update carries. Entities are created implicitly on first
/// update; the only removal is [`WorldModel::reset`].
pub struct WorldModel {
    entities: Mutex<HashMap<(EntityKind, String), PropertyMap>>,
}

impl WorldModel {
    pub fn new() -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Merge `properties` into the entity's record, creating it if absent.
    pub fn upsert(&self, kind: EntityKind, id: &str, properties: PropertyMap) {
        let mut entities = self.entities.lock().unwrap();
        merge_entry(&mut entities, kind, id, properties);
    }

    /// Apply a batch of updates atomically: the lock is held across the
    /// whole list, so readers see either none or all of them.
    pub fn apply_updates(&self, updates: &[EntityUpdate]) {
        let mut entities = self.entities.lock().unwrap();
        for update in updates {
            let kind = update.kind();
            let id = update.id();
            merge_entry(&mut entities, kind, id, update.properties_object());
            debug!(kind = %kind, id = %id, "world model updated");
        }
    }

    /// Copy of an entity's current properties, or `None` if untracked.
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<PropertyMap> {
        let entities = self.entities.lock().unwrap();
        entities.get(&(kind, id.to_string())).cloned()
    }

    /// First entity of `kind` whose `location` property equals
    /// `workstation`. Used to resolve material ids when commands do not
    /// carry them; scans only the slice of the map with the given kind.
    pub fn find_by_location(&self, kind: EntityKind, workstation: &str) -> Option<(String, PropertyMap)> {
        let entities = self.entities.lock().unwrap();
        entities
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .find(|(_, props)| props.get("location").and_then(Value::as_str) == Some(workstation))
            .map(|((_, id), props)| (id.clone(), props.clone()))
    }

    /// The robot entity's current state. `Disconnected` when the robot has
    /// not been tracked yet (fresh start, or right after a reset) or its
    /// state property is unreadable.
    pub fn snapshot_robot_state(&self, robot_id: &str) -> RobotState {
        let entities = self.entities.lock().unwrap();
        entities
            .get(&(EntityKind::Robot, robot_id.to_string()))
            .and_then(|props| props.get("state"))
            .and_then(|state| serde_json::from_value(state.clone()).ok())
            .unwrap_or(RobotState::Disconnected)
    }

    /// Drop every tracked entity in one step.
    pub fn reset(&self) {
        let mut entities = self.entities.lock().unwrap();
        entities.clear();
        debug!("world model reset, all entities cleared");
    }

    pub fn entity_count(&self) -> usize {
        self.entities.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }
}

impl Default for WorldModel {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_entry(
    entities: &mut HashMap<(EntityKind, String), PropertyMap>,
    kind: EntityKind,
    id: &str,
    properties: PropertyMap,
) {
    let record = entities.entry((kind, id.to_string())).or_default();
    for (key, value) in properties {
        record.insert(key, value);
    }
}
