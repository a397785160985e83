//! Storage layer
//!
//! Uses SQLite (embedded) as the backing store.
//! Uses DashMap (in-memory) for the per-kind record caches.

pub mod db;
pub mod memory;

pub use db::Database;
pub use memory::KeyedCache;
