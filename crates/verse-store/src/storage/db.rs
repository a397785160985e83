//! SQLite database layer (embedded, single connection)

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use verse_core::ports::RecordGateway;
use verse_core::{Inventory, Location, Record, RecordKind, Result, StoreError, Uuid};

pub struct Database {
    path: PathBuf,
    pool: RwLock<Option<SqlitePool>>,
}

impl Database {
    /// Create a handle for the database file. Nothing is opened until `connect`.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            path: database_path.into(),
            pool: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt to connect, returning whether it worked.
    ///
    /// Failures are logged here; use `try_connect` to inspect the error.
    pub async fn connect(&self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to connect to database at {}: {}",
                    self.path.display(),
                    e
                );
                false
            }
        }
    }

    /// Open the database file (creating it if missing) and make sure both
    /// tables exist. Connecting again reuses the open pool.
    pub async fn try_connect(&self) -> Result<()> {
        let mut guard = self.pool.write().await;

        if let Some(pool) = guard.as_ref() {
            debug!("Database already connected, re-checking schema");
            return Self::run_migrations(pool).await;
        }

        info!("Opening SQLite database at: {}", self.path.display());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Connection(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("SQLite connection established, creating tables...");

        if let Err(e) = Self::run_migrations(&pool).await {
            pool.close().await;
            return Err(e);
        }

        *guard = Some(pool);
        info!("Database initialization complete");

        Ok(())
    }

    /// Close the connection. Does nothing if it was never opened or is
    /// already closed.
    pub async fn close(&self) {
        let Some(pool) = self.pool.write().await.take() else {
            return;
        };
        pool.close().await;
        info!("Database at {} closed", self.path.display());
    }

    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Delete every location and inventory stored for a world
    pub async fn clear_world(&self, world_name: &str) -> Result<u64> {
        let locations = self
            .delete_world_rows(RecordKind::Location, world_name)
            .await?;
        let inventories = self
            .delete_world_rows(RecordKind::Inventory, world_name)
            .await?;
        Ok(locations + inventories)
    }

    async fn pool(&self) -> Result<SqlitePool> {
        self.pool.read().await.clone().ok_or(StoreError::NotConnected)
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        // Locations table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                world_name TEXT NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                z REAL NOT NULL,
                yaw REAL NOT NULL DEFAULT 0,
                pitch REAL NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(persistence)?;

        // Inventories table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                world_name TEXT NOT NULL,
                contents TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(persistence)?;

        for kind in [RecordKind::Location, RecordKind::Inventory] {
            let table = kind.table();
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_owner_world ON {table} (owner_id, world_name)"
            ))
            .execute(pool)
            .await
            .map_err(persistence)?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_world ON {table} (world_name)"
            ))
            .execute(pool)
            .await
            .map_err(persistence)?;
        }

        Ok(())
    }

    async fn delete_world_rows(&self, kind: RecordKind, world_name: &str) -> Result<u64> {
        let pool = self.pool().await?;
        let sql = format!("DELETE FROM {} WHERE world_name = ?1", kind.table());
        let result = sqlx::query(&sql)
            .bind(world_name)
            .execute(&pool)
            .await
            .map_err(persistence)?;

        debug!(
            "Deleted {} {} rows for world {}",
            result.rows_affected(),
            kind,
            world_name
        );
        Ok(result.rows_affected())
    }
}

// Location operations
#[async_trait]
impl RecordGateway<Location> for Database {
    async fn create_or_update(&self, location: &Location) -> Result<i64> {
        let pool = self.pool().await?;

        if let Some(id) = location.id() {
            let updated = sqlx::query(
                r#"
                UPDATE locations
                SET owner_id = ?1, world_name = ?2, x = ?3, y = ?4, z = ?5,
                    yaw = ?6, pitch = ?7, updated_at = datetime('now')
                WHERE id = ?8
                "#,
            )
            .bind(location.owner_id.to_string())
            .bind(&location.world_name)
            .bind(location.x)
            .bind(location.y)
            .bind(location.z)
            .bind(location.yaw)
            .bind(location.pitch)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(persistence)?;

            if updated.rows_affected() > 0 {
                return Ok(id);
            }
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO locations (owner_id, world_name, x, y, z, yaw, pitch)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (owner_id, world_name) DO UPDATE SET
                x = excluded.x, y = excluded.y, z = excluded.z,
                yaw = excluded.yaw, pitch = excluded.pitch,
                updated_at = datetime('now')
            RETURNING id
            "#,
        )
        .bind(location.owner_id.to_string())
        .bind(&location.world_name)
        .bind(location.x)
        .bind(location.y)
        .bind(location.z)
        .bind(location.yaw)
        .bind(location.pitch)
        .fetch_one(&pool)
        .await
        .map_err(persistence)?;

        Ok(id)
    }

    async fn query_by_owner(&self, owner_id: Uuid) -> Result<Vec<Location>> {
        let pool = self.pool().await?;
        let rows: Vec<LocationRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, world_name, x, y, z, yaw, pitch
            FROM locations WHERE owner_id = ?1
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&pool)
        .await
        .map_err(persistence)?;

        rows.into_iter().map(Location::try_from).collect()
    }

    async fn delete_by_world(&self, world_name: &str) -> Result<u64> {
        self.delete_world_rows(RecordKind::Location, world_name).await
    }
}

// Inventory operations
#[async_trait]
impl RecordGateway<Inventory> for Database {
    async fn create_or_update(&self, inventory: &Inventory) -> Result<i64> {
        let pool = self.pool().await?;

        if let Some(id) = inventory.id() {
            let updated = sqlx::query(
                r#"
                UPDATE inventories
                SET owner_id = ?1, world_name = ?2, contents = ?3, updated_at = datetime('now')
                WHERE id = ?4
                "#,
            )
            .bind(inventory.owner_id.to_string())
            .bind(&inventory.world_name)
            .bind(&inventory.contents)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(persistence)?;

            if updated.rows_affected() > 0 {
                return Ok(id);
            }
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO inventories (owner_id, world_name, contents)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (owner_id, world_name) DO UPDATE SET
                contents = excluded.contents,
                updated_at = datetime('now')
            RETURNING id
            "#,
        )
        .bind(inventory.owner_id.to_string())
        .bind(&inventory.world_name)
        .bind(&inventory.contents)
        .fetch_one(&pool)
        .await
        .map_err(persistence)?;

        Ok(id)
    }

    async fn query_by_owner(&self, owner_id: Uuid) -> Result<Vec<Inventory>> {
        let pool = self.pool().await?;
        let rows: Vec<InventoryRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, world_name, contents
            FROM inventories WHERE owner_id = ?1
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&pool)
        .await
        .map_err(persistence)?;

        rows.into_iter().map(Inventory::try_from).collect()
    }

    async fn delete_by_world(&self, world_name: &str) -> Result<u64> {
        self.delete_world_rows(RecordKind::Inventory, world_name).await
    }
}

fn persistence(e: sqlx::Error) -> StoreError {
    StoreError::Persistence(e.to_string())
}

fn parse_owner(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::CorruptRow(format!("owner_id {:?}: {}", s, e)))
}

// Helper structs for sqlx query_as
#[derive(sqlx::FromRow)]
struct LocationRow {
    id: i64,
    owner_id: String,
    world_name: String,
    x: f64,
    y: f64,
    z: f64,
    yaw: f32,
    pitch: f32,
}

impl TryFrom<LocationRow> for Location {
    type Error = StoreError;

    fn try_from(r: LocationRow) -> Result<Self> {
        Ok(Location {
            id: Some(r.id),
            owner_id: parse_owner(&r.owner_id)?,
            world_name: r.world_name,
            x: r.x,
            y: r.y,
            z: r.z,
            yaw: r.yaw,
            pitch: r.pitch,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: i64,
    owner_id: String,
    world_name: String,
    contents: String,
}

impl TryFrom<InventoryRow> for Inventory {
    type Error = StoreError;

    fn try_from(r: InventoryRow) -> Result<Self> {
        Ok(Inventory {
            id: Some(r.id),
            owner_id: parse_owner(&r.owner_id)?,
            world_name: r.world_name,
            contents: r.contents,
        })
    }
}
