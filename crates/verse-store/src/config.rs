//! Configuration management

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use verse_core::{Result, StoreError};

/// Environment variable prefix, e.g. `VERSE_DATA_DIR`
pub const ENV_PREFIX: &str = "VERSE";

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "verse.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub database_file: String,
    /// Whether the host should persist player locations at all
    pub persist_locations: bool,
    pub persist_inventories: bool,
    pub shutdown_timeout_secs: u64,
}

impl Settings {
    /// Load settings from defaults, then the config file (if it exists),
    /// then `VERSE_*` environment variables.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let file = config_file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        config::Config::builder()
            .set_default("data_dir", "./data")
            .and_then(|b| b.set_default("database_file", "storage.db"))
            .and_then(|b| b.set_default("persist_locations", true))
            .and_then(|b| b.set_default("persist_inventories", true))
            .and_then(|b| b.set_default("shutdown_timeout_secs", 5))
            .map_err(config_error)?
            .add_source(config::File::from(file).required(config_file.is_some()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_file: "storage.db".to_string(),
            persist_locations: true,
            persist_inventories: true,
            shutdown_timeout_secs: 5,
        }
    }
}

fn config_error(e: config::ConfigError) -> StoreError {
    StoreError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("verse.toml");
        std::fs::write(
            &path,
            "data_dir = \"/srv/verse\"\npersist_inventories = false\n",
        )?;

        let settings = Settings::load(Some(&path))?;
        assert_eq!(settings.database_path(), PathBuf::from("/srv/verse/storage.db"));
        assert!(settings.persist_locations);
        assert!(!settings.persist_inventories);
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/verse.toml")));
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
