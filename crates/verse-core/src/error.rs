//! Error types for the player data store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backing store is not connected")]
    NotConnected,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Store is shutting down")]
    ShuttingDown,

    #[error("Task error: {0}")]
    Task(String),

    #[error("Task was abandoned before completing")]
    Abandoned,

    #[error("Config error: {0}")]
    Config(String),
}
