//! Storage traits for persistence

use crate::Result;
use async_trait::async_trait;
use verse_types::{Record, Uuid};

/// Persistence gateway for one record kind
#[async_trait]
pub trait RecordGateway<R: Record>: Send + Sync {
    /// Overwrite the row carrying `record.id()` if it exists, otherwise insert
    /// (or update the row with the same owner and world). Returns the row id.
    async fn create_or_update(&self, record: &R) -> Result<i64>;

    async fn query_by_owner(&self, owner_id: Uuid) -> Result<Vec<R>>;

    /// Delete every row of this kind in the world, returning how many went
    async fn delete_by_world(&self, world_name: &str) -> Result<u64>;
}
