//! Verse Core Library
//!
//! Error taxonomy and port traits for the player data store.

// Re-export pure types from verse-types
pub use verse_types::*;

pub mod error;
pub mod ports;

pub use error::{Result, StoreError};
