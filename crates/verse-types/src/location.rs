//! Player location types

use crate::record::{Record, RecordKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Last known position of a player inside a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub owner_id: Uuid,
    pub world_name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Location {
    pub fn new(owner_id: Uuid, world_name: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: None,
            owner_id,
            world_name: world_name.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Set the facing direction
    pub fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }
}

impl Record for Location {
    const KIND: RecordKind = RecordKind::Location;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    fn world_name(&self) -> &str {
        &self.world_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_location_has_no_id() {
        let owner = Uuid::new_v4();
        let location = Location::new(owner, "world", 1.0, 64.0, -3.5).with_rotation(90.0, 10.0);

        assert_eq!(location.id(), None);
        assert_eq!(location.owner_id(), owner);
        assert_eq!(location.world_name(), "world");
        assert_eq!(location.yaw, 90.0);
        assert_eq!(Location::KIND.table(), "locations");
    }

    #[test]
    fn test_json_omits_unassigned_id() {
        let mut location = Location::new(Uuid::nil(), "world", 0.0, 0.0, 0.0);
        let json = serde_json::to_value(&location).unwrap();
        assert!(json.get("id").is_none());

        location.set_id(7);
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["id"], 7);
    }
}
