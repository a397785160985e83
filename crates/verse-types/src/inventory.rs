//! Player inventory types

use crate::record::{Record, RecordKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serialized inventory of a player inside a world.
///
/// `contents` is opaque here: the host decides how item stacks are encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub owner_id: Uuid,
    pub world_name: String,
    pub contents: String,
}

impl Inventory {
    pub fn new(owner_id: Uuid, world_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            id: None,
            owner_id,
            world_name: world_name.into(),
            contents: contents.into(),
        }
    }
}

impl Record for Inventory {
    const KIND: RecordKind = RecordKind::Inventory;

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
