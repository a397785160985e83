//! In-memory keyed cache using DashMap

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use verse_core::{Record, Uuid};

/// Two-dimensional cache of `(owner, world) -> record` for one record kind.
///
/// Cloning is cheap and shares the same underlying map. Every operation is
/// synchronous and safe to call from any thread; nothing here touches I/O.
pub struct KeyedCache<R: Record> {
    data: Arc<DashMap<Uuid, HashMap<String, R>>>,
}

impl<R: Record> Clone for KeyedCache<R> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<R: Record> KeyedCache<R> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    /// Get a copy of the record cached for this owner and world
    pub fn get(&self, owner_id: Uuid, world_name: &str) -> Option<R> {
        self.data
            .get(&owner_id)
            .and_then(|worlds| worlds.get(world_name).cloned())
    }

    /// Insert a record under its own key, replacing any previous entry
    pub fn put(&self, record: R) {
        self.data
            .entry(record.owner_id())
            .or_default()
            .insert(record.world_name().to_string(), record);
    }

    /// Record the id the backing store assigned to the entry at this key
    pub fn assign_id(&self, owner_id: Uuid, world_name: &str, id: i64) {
        if let Some(mut worlds) = self.data.get_mut(&owner_id) {
            if let Some(record) = worlds.get_mut(world_name) {
                record.set_id(id);
            }
        }
    }

    /// Remove a single entry
    pub fn remove_one(&self, owner_id: Uuid, world_name: &str) {
        if let Some(mut worlds) = self.data.get_mut(&owner_id) {
            worlds.remove(world_name);
        }
        // The shard guard above must be released before removing the owner
        self.data.remove_if(&owner_id, |_, worlds| worlds.is_empty());
    }

    /// Remove every world entry for an owner
    pub fn remove_owner(&self, owner_id: Uuid) {
        self.data.remove(&owner_id);
    }

    /// Remove the entry for a world under every owner
    pub fn remove_world(&self, world_name: &str) {
        self.data.retain(|_, worlds| {
            worlds.remove(world_name);
            !worlds.is_empty()
        });
    }

    /// Worlds that currently have an entry for this owner
    pub fn worlds(&self, owner_id: Uuid) -> Vec<String> {
        self.data
            .get(&owner_id)
            .map(|worlds| worlds.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of cached records
    pub fn len(&self) -> usize {
        self.data.iter().map(|worlds| worlds.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Record> Default for KeyedCache<R> {
    fn default() -> Self {
        Self::new()
    }
}
