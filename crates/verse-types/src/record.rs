//! Record kinds and the capability shared by every persisted record

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The parallel record families that share the cache/persist pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Location,
    Inventory,
}

impl RecordKind {
    /// Backing-store table holding records of this kind
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Location => "locations",
            RecordKind::Inventory => "inventories",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Location => write!(f, "location"),
            RecordKind::Inventory => write!(f, "inventory"),
        }
    }
}

/// A record owned by a player and scoped to a single world.
///
/// `(owner_id, world_name)` is the natural key. `id` is assigned by the
/// backing store on first write and must be carried on every later write of
/// the same key so that the row is updated in place.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
    fn owner_id(&self) -> Uuid;
    fn world_name(&self) -> &str;
}
