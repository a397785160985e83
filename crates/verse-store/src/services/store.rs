//! Write-through store for one record kind
//!
//! Reads are served from the keyed cache. Writes update the cache first and
//! are persisted by the gateway on the tokio workers; whatever has to touch
//! the cache afterwards runs as a continuation on the sync thread.

use crate::services::sequencer::{Completion, Sequencer};
use crate::storage::KeyedCache;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use verse_core::ports::RecordGateway;
use verse_core::{Record, RecordKind, Result, StoreError, Uuid};

/// Capacity of the failure channel; slow subscribers miss older reports
const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Which store operation a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Store,
    Load,
    ClearWorld,
}

/// A persistence failure that was not surfaced to the caller
#[derive(Debug, Clone, Serialize)]
pub struct PersistenceFailure {
    pub kind: RecordKind,
    pub operation: Operation,
    pub owner_id: Option<Uuid>,
    pub world_name: Option<String>,
    pub message: String,
}

pub struct StoreService<R: Record> {
    cache: KeyedCache<R>,
    gateway: Arc<dyn RecordGateway<R>>,
    sequencer: Sequencer,
    accepting: AtomicBool,
    failures: broadcast::Sender<PersistenceFailure>,
}

impl<R: Record> StoreService<R> {
    /// Create a stopped service; call `start` before use
    pub fn new(gateway: Arc<dyn RecordGateway<R>>, sequencer: Sequencer) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            cache: KeyedCache::new(),
            gateway,
            sequencer,
            accepting: AtomicBool::new(false),
            failures,
        }
    }

    pub fn start(&self) {
        self.accepting.store(true, Ordering::SeqCst);
        info!("{} store accepting requests", R::KIND);
    }

    /// Refuse new `store`/`load`/`clear_for_world` calls. In-flight chains
    /// keep running.
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        info!("{} store stopped accepting requests", R::KIND);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &KeyedCache<R> {
        &self.cache
    }

    /// Receive reports of failed background writes, loads and deletes
    pub fn subscribe_failures(&self) -> broadcast::Receiver<PersistenceFailure> {
        self.failures.subscribe()
    }

    /// Store a record.
    ///
    /// The id of the cached entry for the same owner and world (if any) is
    /// carried over so the row is updated in place. With `update_cache` the
    /// record is visible to `get` before this returns. Once the write has
    /// finished, `clear_after` drops every cached world of the owner.
    ///
    /// The returned completion resolves after that last step; write failures
    /// are logged and published on the failure channel instead.
    pub fn store(
        &self,
        mut record: R,
        update_cache: bool,
        clear_after: bool,
    ) -> Result<Completion<()>> {
        self.ensure_accepting()?;

        let owner_id = record.owner_id();
        let world_name = record.world_name().to_string();

        if let Some(id) = self
            .cache
            .get(owner_id, &world_name)
            .and_then(|cached| cached.id())
        {
            record.set_id(id);
        }

        if update_cache {
            self.cache.put(record.clone());
        }

        let gateway = self.gateway.clone();
        let cache = self.cache.clone();
        let failures = self.failures.clone();

        let completion = self
            .sequencer
            .run_async(async move { gateway.create_or_update(&record).await })
            .run_after(move |outcome| {
                match outcome {
                    Ok(id) => {
                        debug!(
                            "Persisted {} {} for {} in {}",
                            R::KIND,
                            id,
                            owner_id,
                            world_name
                        );
                        cache.assign_id(owner_id, &world_name, id);
                    }
                    Err(e) => report(
                        &failures,
                        R::KIND,
                        Operation::Store,
                        Some(owner_id),
                        Some(&world_name),
                        &e,
                    ),
                }

                if clear_after {
                    cache.remove_owner(owner_id);
                }
            });

        Ok(completion)
    }

    /// Store a record and wait until the write has finished. Unlike `store`,
    /// a failed write is returned as an error.
    pub async fn store_confirmed(&self, record: R, update_cache: bool) -> Result<()> {
        let owner_id = record.owner_id();
        let world_name = record.world_name().to_string();

        // Subscribe first: the failure is published before the completion resolves
        let mut failures = self.subscribe_failures();
        self.store(record, update_cache, false)?.wait().await?;

        loop {
            match failures.try_recv() {
                Ok(failure)
                    if failure.operation == Operation::Store
                        && failure.owner_id == Some(owner_id)
                        && failure.world_name.as_deref() == Some(world_name.as_str()) =>
                {
                    return Err(StoreError::Persistence(failure.message));
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return Ok(()),
            }
        }
    }

    /// Load every stored record of this owner into the cache, overwriting
    /// cached entries with the same world.
    ///
    /// The completion carries the rows, or the error. Callers that do not
    /// need to observe the load may drop it.
    pub fn load(&self, owner_id: Uuid) -> Result<Completion<Result<Vec<R>>>> {
        self.ensure_accepting()?;

        let gateway = self.gateway.clone();
        let cache = self.cache.clone();
        let failures = self.failures.clone();

        let completion = self
            .sequencer
            .run_async(async move { gateway.query_by_owner(owner_id).await })
            .run_after(move |outcome| {
                match &outcome {
                    Ok(records) => {
                        debug!(
                            "Loaded {} {} records for {}",
                            records.len(),
                            R::KIND,
                            owner_id
                        );
                        for record in records {
                            cache.put(record.clone());
                        }
                    }
                    Err(e) => {
                        report(&failures, R::KIND, Operation::Load, Some(owner_id), None, e)
                    }
                }
                outcome
            });

        Ok(completion)
    }

    /// Cached record for this owner and world. Never touches the backing
    /// store; `load` first when freshness matters.
    pub fn get(&self, owner_id: Uuid, world_name: &str) -> Option<R> {
        self.cache.get(owner_id, world_name)
    }

    /// Drop every cached world of an owner. The backing store is untouched.
    pub fn clear_for_owner(&self, owner_id: Uuid) {
        self.cache.remove_owner(owner_id);
    }

    /// Remove a world: its cached entries are dropped for every owner right
    /// away, and its rows are deleted in the background.
    pub fn clear_for_world(&self, world_name: &str) -> Result<Completion<Result<u64>>> {
        self.ensure_accepting()?;

        self.cache.remove_world(world_name);

        let gateway = self.gateway.clone();
        let failures = self.failures.clone();
        let world = world_name.to_string();
        let target = world.clone();

        let completion = self
            .sequencer
            .run_async(async move { gateway.delete_by_world(&target).await })
            .run_after(move |outcome| match outcome {
                Ok(deleted) => {
                    info!("Deleted {} {} rows for world {}", deleted, R::KIND, world);
                    Ok(deleted)
                }
                Err(e) => {
                    report(
                        &failures,
                        R::KIND,
                        Operation::ClearWorld,
                        None,
                        Some(&world),
                        &e,
                    );
                    Err(e)
                }
            });

        Ok(completion)
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(StoreError::ShuttingDown)
        }
    }
}

fn report(
    failures: &broadcast::Sender<PersistenceFailure>,
    kind: RecordKind,
    operation: Operation,
    owner_id: Option<Uuid>,
    world_name: Option<&str>,
    error: &StoreError,
) {
    warn!(
        "{:?} of {} failed (owner={:?}, world={:?}): {}",
        operation, kind, owner_id, world_name, error
    );
    // No subscribers is fine
    let _ = failures.send(PersistenceFailure {
        kind,
        operation,
        owner_id,
        world_name: world_name.map(str::to_string),
        message: error.to_string(),
    });
}
