//! Verse Types - Pure record definitions
//!
//! This crate contains only the plain data records persisted per player and
//! per world, with no runtime or storage dependencies.

pub mod inventory;
pub mod location;
pub mod record;

pub use inventory::*;
pub use location::*;
pub use record::*;

/// Re-exported so downstream crates agree on the owner identifier type
pub use uuid::Uuid;
