//! Player data lifecycle: one database, one sequencer, a store per kind

use crate::config::Settings;
use crate::services::sequencer::{Completion, Sequencer};
use crate::services::store::StoreService;
use crate::storage::Database;
use std::sync::Arc;
use tracing::{info, warn};
use verse_core::{Inventory, Location, Result, StoreError};

pub struct PlayerData {
    settings: Settings,
    db: Arc<Database>,
    sequencer: Sequencer,
    locations: StoreService<Location>,
    inventories: StoreService<Inventory>,
}

impl PlayerData {
    /// Connect to the database and start accepting requests.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(settings: Settings) -> Result<Self> {
        let db = Arc::new(Database::new(settings.database_path()));
        db.try_connect().await?;

        let sequencer = match Sequencer::start() {
            Ok(sequencer) => sequencer,
            Err(e) => {
                db.close().await;
                return Err(e);
            }
        };

        let locations: StoreService<Location> = StoreService::new(db.clone(), sequencer.clone());
        let inventories: StoreService<Inventory> = StoreService::new(db.clone(), sequencer.clone());
        locations.start();
        inventories.start();

        info!(
            "Player data ready (locations: {}, inventories: {})",
            settings.persist_locations, settings.persist_inventories
        );

        Ok(Self {
            settings,
            db,
            sequencer,
            locations,
            inventories,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn locations(&self) -> &StoreService<Location> {
        &self.locations
    }

    pub fn inventories(&self) -> &StoreService<Inventory> {
        &self.inventories
    }

    /// Remove every location and inventory of a world. Resolves to the total
    /// number of rows deleted.
    pub fn clear_world(&self, world_name: &str) -> Result<Completion<Result<u64>>> {
        let locations = self.locations.clear_for_world(world_name)?;
        let inventories = self.inventories.clear_for_world(world_name)?;

        Ok(self
            .sequencer
            .run_async(async move {
                let deleted = locations.wait().await?? + inventories.wait().await??;
                Ok(deleted)
            })
            .execute())
    }

    /// Stop accepting requests, wait for in-flight work, then close the
    /// database.
    pub async fn stop(self) -> Result<()> {
        self.locations.stop();
        self.inventories.stop();

        if !self.sequencer.drain(self.settings.shutdown_timeout()).await {
            warn!("Closing the database with writes still in flight");
        }

        let sequencer = self.sequencer.clone();
        tokio::task::spawn_blocking(move || sequencer.shutdown())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?;

        self.db.close().await;
        info!("Player data stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verse_core::Uuid;

    fn settings(dir: &tempfile::TempDir) -> Settings {
        Settings {
            data_dir: dir.path().join("data"),
            ..Settings::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_store_and_restart() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let owner = Uuid::new_v4();

        let data = PlayerData::start(settings(&dir)).await?;
        assert!(dir.path().join("data/storage.db").exists());

        // Fire-and-forget writes still land: stop drains them
        let _ = data
            .locations()
            .store(Location::new(owner, "w1", 10.0, 64.0, 0.0), true, false)?;
        let _ = data
            .inventories()
            .store(Inventory::new(owner, "w1", "[diamond]"), false, false)?;
        data.stop().await?;

        let data = PlayerData::start(settings(&dir)).await?;
        assert!(data.locations().get(owner, "w1").is_none());

        let locations = data.locations().load(owner)?.wait().await??;
        assert_eq!(locations.len(), 1);
        assert_eq!(data.locations().get(owner, "w1").map(|l| l.x), Some(10.0));

        // Inventory loads are usually not awaited
        let _ = data.inventories().load(owner)?;
        data.stop().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clear_world_removes_both_kinds() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let owner = Uuid::new_v4();
        let data = PlayerData::start(settings(&dir)).await?;

        for world in ["w1", "w2"] {
            data.locations()
                .store(Location::new(owner, world, 0.0, 0.0, 0.0), true, false)?
                .wait()
                .await?;
            data.inventories()
                .store(Inventory::new(owner, world, "[]"), true, false)?
                .wait()
                .await?;
        }

        assert_eq!(data.clear_world("w1")?.wait().await??, 2);
        assert!(data.locations().get(owner, "w1").is_none());
        assert!(data.inventories().get(owner, "w1").is_none());

        data.locations().clear_for_owner(owner);
        let remaining = data.locations().load(owner)?.wait().await??;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].world_name, "w2");

        data.stop().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_confirmed_store_fails_on_closed_database() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let owner = Uuid::new_v4();
        let data = PlayerData::start(settings(&dir)).await?;

        data.inventories()
            .store_confirmed(Inventory::new(owner, "w1", "[stone]"), false)
            .await?;

        data.db.close().await;
        let outcome = data
            .inventories()
            .store_confirmed(Inventory::new(owner, "w1", "[dirt]"), false)
            .await;
        assert!(matches!(outcome, Err(StoreError::Persistence(_))));

        // The plain store still resolves; the failure only goes to subscribers
        let mut failures = data.locations().subscribe_failures();
        data.locations()
            .store(Location::new(owner, "w1", 0.0, 0.0, 0.0), true, false)?
            .wait()
            .await?;
        assert!(failures.try_recv().is_ok());

        data.stop().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_fails_on_unusable_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x")?;

        let result = PlayerData::start(Settings {
            data_dir: blocker,
            ..Settings::default()
        })
        .await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
        Ok(())
    }
}
