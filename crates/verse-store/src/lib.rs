//! Verse Store
//!
//! Write-through cache over per-player, per-world locations and inventories.
//! Reads come from memory; writes are persisted to SQLite in the background.

pub mod config;
pub mod services;
pub mod storage;

pub use config::Settings;
pub use services::{Completion, PersistenceFailure, PlayerData, Sequencer, StoreService};
pub use storage::{Database, KeyedCache};
