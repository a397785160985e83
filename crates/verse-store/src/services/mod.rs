//! Store services

pub mod player_data;
pub mod sequencer;
pub mod store;

pub use player_data::PlayerData;
pub use sequencer::{Chain, Completion, Sequencer};
pub use store::{Operation, PersistenceFailure, StoreService};
