//! Task sequencing: run a step on the tokio workers, then a continuation on
//! the designated sync thread.
//!
//! The sync thread plays the role of the host's main thread. Every cache
//! mutation that follows an async step goes through it, so those mutations
//! are serialized with respect to each other.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use verse_core::{Result, StoreError};

/// Name of the designated thread continuations run on
pub const SYNC_THREAD_NAME: &str = "verse-sync";

type SyncJob = Box<dyn FnOnce() + Send + 'static>;

enum SyncMessage {
    Run(SyncJob),
    Shutdown,
}

/// Cheap to clone; all clones share the runtime handle, the sync thread and
/// the tracker of in-flight chains.
#[derive(Clone)]
pub struct Sequencer {
    runtime: Handle,
    sync_tx: mpsc::UnboundedSender<SyncMessage>,
    sync_thread: Arc<Mutex<Option<JoinHandle<()>>>>,
    tracker: TaskTracker,
    closed: Arc<AtomicBool>,
}

impl Sequencer {
    /// Start the sync thread. Must be called from within a tokio runtime,
    /// which is where the async steps will run.
    pub fn start() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| StoreError::Task(e.to_string()))?;
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();

        let sync_thread = std::thread::Builder::new()
            .name(SYNC_THREAD_NAME.to_string())
            .spawn(move || run_sync_loop(sync_rx))?;

        info!("Sequencer started");

        Ok(Self {
            runtime,
            sync_tx,
            sync_thread: Arc::new(Mutex::new(Some(sync_thread))),
            tracker: TaskTracker::new(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Begin a chain whose first step runs on the tokio workers
    pub fn run_async<T, F>(&self, step: F) -> Chain<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Chain {
            sequencer: self.clone(),
            step: Box::pin(step),
        }
    }

    /// Stop admitting new chains and wait for in-flight ones, up to `timeout`.
    /// Returns false if the wait timed out.
    ///
    /// Chains started after this resolve to `StoreError::ShuttingDown`
    /// without running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!("Waiting for {} in-flight chains", in_flight);
        }

        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "Timed out after {:?} with {} chains still running",
                timeout,
                self.tracker.len()
            );
            return false;
        }
        true
    }

    /// Stop the sync thread once the continuations already queued have run
    pub fn shutdown(&self) {
        let handle = match self.sync_thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        let _ = self.sync_tx.send(SyncMessage::Shutdown);
        if handle.join().is_err() {
            error!("Sync thread terminated abnormally");
        }
        info!("Sequencer stopped");
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn spawn_chain<F>(&self, chain: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(chain, &self.runtime);
    }
}

fn run_sync_loop(mut rx: mpsc::UnboundedReceiver<SyncMessage>) {
    debug!("Sync thread running");
    while let Some(message) = rx.blocking_recv() {
        match message {
            SyncMessage::Run(job) => {
                if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Continuation panicked on the sync thread");
                }
            }
            SyncMessage::Shutdown => break,
        }
    }
    debug!("Sync thread exiting");
}

/// An async step waiting for its (single) continuation
pub struct Chain<T> {
    sequencer: Sequencer,
    step: std::pin::Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>,
}

impl<T: Send + 'static> Chain<T> {
    /// Run `continuation` on the sync thread once the step finished, with the
    /// step's outcome. It runs whether the step succeeded or failed.
    pub fn run_after<U, C>(self, continuation: C) -> Completion<U>
    where
        U: Send + 'static,
        C: FnOnce(Result<T>) -> U + Send + 'static,
    {
        if self.sequencer.is_closed() {
            debug!("Sequencer closed, refusing chain");
            return Completion::refused();
        }

        let (done_tx, done_rx) = oneshot::channel();
        let sync_tx = self.sequencer.sync_tx.clone();
        let runtime = self.sequencer.runtime.clone();
        let step = self.step;

        self.sequencer.spawn_chain(async move {
            let outcome = run_step(&runtime, step).await;

            let (ran_tx, ran_rx) = oneshot::channel();
            let job: SyncJob = Box::new(move || {
                let _ = ran_tx.send(continuation(outcome));
            });

            if sync_tx.send(SyncMessage::Run(job)).is_err() {
                warn!("Sync thread is gone, dropping continuation");
                return;
            }

            match ran_rx.await {
                Ok(value) => {
                    let _ = done_tx.send(value);
                }
                Err(_) => warn!("Continuation did not complete"),
            }
        });

        Completion::new(done_rx)
    }

    /// Run the step with no continuation
    pub fn execute(self) -> Completion<Result<T>> {
        if self.sequencer.is_closed() {
            debug!("Sequencer closed, refusing chain");
            return Completion::refused();
        }

        let (done_tx, done_rx) = oneshot::channel();
        let runtime = self.sequencer.runtime.clone();
        let step = self.step;

        self.sequencer.spawn_chain(async move {
            let _ = done_tx.send(run_step(&runtime, step).await);
        });

        Completion::new(done_rx)
    }
}

/// Run the step as its own task so a panic comes back as an error
async fn run_step<T: Send + 'static>(
    runtime: &Handle,
    step: std::pin::Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>,
) -> Result<T> {
    match runtime.spawn(step).await {
        Ok(outcome) => outcome,
        Err(e) => Err(StoreError::Task(e.to_string())),
    }
}

/// Handle to the result of a chain. Dropping it does not cancel anything.
pub struct Completion<T> {
    rx: Option<oneshot::Receiver<T>>,
}

impl<T> Completion<T> {
    fn new(rx: oneshot::Receiver<T>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A chain that was never started
    fn refused() -> Self {
        Self { rx: None }
    }

    /// Wait for the chain to finish
    pub async fn wait(self) -> Result<T> {
        match self.rx {
            Some(rx) => rx.await.map_err(|_| StoreError::Abandoned),
            None => Err(StoreError::ShuttingDown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn current_thread_name() -> Option<String> {
        std::thread::current().name().map(str::to_string)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_continuation_runs_on_sync_thread() -> Result<()> {
        let sequencer = Sequencer::start()?;

        let (step_thread, sync_thread) = sequencer
            .run_async(async { Ok(current_thread_name()) })
            .run_after(|outcome| (outcome.ok().flatten(), current_thread_name()))
            .wait()
            .await?;

        assert_ne!(step_thread.as_deref(), Some(SYNC_THREAD_NAME));
        assert_eq!(sync_thread.as_deref(), Some(SYNC_THREAD_NAME));

        sequencer.shutdown();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_continuation_runs_after_failure() -> Result<()> {
        let sequencer = Sequencer::start()?;

        let failed = sequencer
            .run_async(async { Err::<(), _>(StoreError::Persistence("disk full".into())) })
            .run_after(|outcome| outcome.is_err())
            .wait()
            .await?;
        assert!(failed);

        let panicked = sequencer
            .run_async(async {
                if true {
                    panic!("step blew up");
                }
                Ok(())
            })
            .run_after(|outcome| matches!(outcome, Err(StoreError::Task(_))))
            .wait()
            .await?;
        assert!(panicked);

        sequencer.shutdown();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sync_thread_survives_panicking_continuation() -> Result<()> {
        let sequencer = Sequencer::start()?;

        let lost: Result<()> = sequencer
            .run_async(async { Ok(()) })
            .run_after(|_| panic!("continuation blew up"))
            .wait()
            .await;
        assert!(matches!(lost, Err(StoreError::Abandoned)));

        let value = sequencer
            .run_async(async { Ok(1) })
            .run_after(|outcome| outcome.map(|n| n + 1))
            .wait()
            .await??;
        assert_eq!(value, 2);

        sequencer.shutdown();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_waits_for_in_flight_chains() -> Result<()> {
        let sequencer = Sequencer::start()?;
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = counter.clone();
            let _ = sequencer
                .run_async(async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(())
                })
                .run_after(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
        }

        assert!(sequencer.drain(Duration::from_secs(5)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(sequencer.in_flight(), 0);

        assert!(sequencer.is_closed());

        sequencer.shutdown();
        // Second shutdown is a no-op
        sequencer.shutdown();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_execute_without_continuation() -> Result<()> {
        let sequencer = Sequencer::start()?;

        let value = sequencer.run_async(async { Ok("done") }).execute().wait().await??;
        assert_eq!(value, "done");

        sequencer.shutdown();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_chains_after_drain_are_refused() -> Result<()> {
        let sequencer = Sequencer::start()?;
        assert!(sequencer.drain(Duration::from_secs(1)).await);

        let ran = Arc::new(AtomicUsize::new(0));
        let step_ran = ran.clone();
        let executed = sequencer
            .run_async(async move {
                step_ran.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .execute()
            .wait()
            .await;
        assert!(matches!(executed, Err(StoreError::ShuttingDown)));

        let continuation_ran = ran.clone();
        let chained = sequencer
            .run_async(async { Ok(()) })
            .run_after(move |_| {
                continuation_ran.fetch_add(1, Ordering::SeqCst);
            })
            .wait()
            .await;
        assert!(matches!(chained, Err(StoreError::ShuttingDown)));

        // A clone shares the closed state
        let clone = sequencer.clone();
        assert!(clone.is_closed());
        assert!(matches!(
            clone.run_async(async { Ok(()) }).execute().wait().await,
            Err(StoreError::ShuttingDown)
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(sequencer.in_flight(), 0);

        sequencer.shutdown();
        Ok(())
    }
}
