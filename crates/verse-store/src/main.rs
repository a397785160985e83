//! Verse Store admin tool
//!
//! Inspects and edits the player data database the host application uses.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use verse_core::{Inventory, Location, Uuid};
use verse_store::{PlayerData, Settings};

#[derive(Parser)]
#[command(name = "verse-store", version, about = "Player data store admin tool")]
struct Cli {
    /// Configuration file (defaults to ./verse.toml when present)
    #[arg(short, long, env = "VERSE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every stored location and inventory of a player
    Show { owner: Uuid },

    /// Store a player's location in a world
    SetLocation {
        owner: Uuid,
        world: String,
        x: f64,
        y: f64,
        z: f64,
        #[arg(long, default_value_t = 0.0)]
        yaw: f32,
        #[arg(long, default_value_t = 0.0)]
        pitch: f32,
    },

    /// Store a player's serialized inventory in a world
    SetInventory {
        owner: Uuid,
        world: String,
        contents: String,
    },

    /// Delete every location and inventory stored for a world
    ClearWorld { world: String },
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log crashes
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("Using database at {}", settings.database_path().display());

    let data = PlayerData::start(settings)
        .await
        .context("Failed to open player data")?;

    let outcome = execute(&data, cli.command).await;
    data.stop().await.context("Failed to shut down cleanly")?;
    outcome
}

async fn execute(data: &PlayerData, command: Command) -> Result<()> {
    match command {
        Command::Show { owner } => {
            let locations = data.locations().load(owner)?.wait().await??;
            let inventories = data.inventories().load(owner)?.wait().await??;

            let report = serde_json::json!({
                "owner": owner,
                "locations": locations,
                "inventories": inventories,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::SetLocation {
            owner,
            world,
            x,
            y,
            z,
            yaw,
            pitch,
        } => {
            if !data.settings().persist_locations {
                warn!("Location persistence is disabled, nothing stored");
                return Ok(());
            }

            // Pick up the existing row id so the write is an update
            data.locations().load(owner)?.wait().await??;
            let location = Location::new(owner, world.clone(), x, y, z).with_rotation(yaw, pitch);
            data.locations()
                .store_confirmed(location, true)
                .await
                .context("Failed to store location")?;

            let stored = data
                .locations()
                .get(owner, &world)
                .context("Location missing from cache after store")?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }

        Command::SetInventory {
            owner,
            world,
            contents,
        } => {
            if !data.settings().persist_inventories {
                warn!("Inventory persistence is disabled, nothing stored");
                return Ok(());
            }

            data.inventories()
                .store_confirmed(Inventory::new(owner, world.clone(), contents), false)
                .await
                .context("Failed to store inventory")?;
            info!("Stored inventory of {} in {}", owner, world);
        }

        Command::ClearWorld { world } => {
            let deleted = data.clear_world(&world)?.wait().await??;
            println!("Deleted {} rows for world {}", deleted, world);
        }
    }

    Ok(())
}
