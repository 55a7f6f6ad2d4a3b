//! Background worker driving the job store.
//!
//! The worker owns a single run loop that claims batches, fans
//! parallel jobs out across a bounded pool, and applies the retry /
//! dead-letter policy after every dispatch. Sequential jobs always
//! arrive as single-element batches from the store, so running a batch
//! concurrently never violates the barrier.

use std::sync::Arc;

use config::WorkerConfig;
use eg_core::traits::{DispatchError, JobDispatcher};
use eg_core::types::Job;
use errors::WorkerError;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

pub struct Worker {
    store: Arc<JobStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: WorkerConfig,
    state: Mutex<WorkerState>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Worker {
    pub fn new(
        store: Arc<JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            store,
            dispatcher,
            config,
            state: Mutex::new(WorkerState::Stopped),
            shutdown_tx,
            handle: Mutex::new(None),
        })
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    /// Start the run loop. Idempotent: a second call while running is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if *state != WorkerState::Stopped {
            debug!("Worker already running, start ignored");
            return;
        }
        *state = WorkerState::Starting;
        drop(state);

        // Reset any stale shutdown signal from a previous stop.
        let _ = self.shutdown_tx.send(false);

        let worker = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            info!(pool_size = worker.config.pool_size, "Worker started");
            worker.run_loop(&mut shutdown_rx).await;
            info!("Worker stopped");
        });
        *self.handle.lock().await = Some(handle);
        *self.state.lock().await = WorkerState::Running;
    }

    /// Signal shutdown and wait for the in-flight batch to finish.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        {
            let mut state = self.state.lock().await;
            if *state == WorkerState::Stopped {
                return Err(WorkerError::AlreadyStopped);
            }
            *state = WorkerState::Stopping;
        }
        let _ = self.shutdown_tx.send(true);

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let timeout =
                std::time::Duration::from_secs(self.config.graceful_shutdown_timeout_seconds);
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("Worker did not stop within the graceful timeout");
            }
        }

        *self.state.lock().await = WorkerState::Stopped;
        Ok(())
    }

    async fn run_loop(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        let poll = std::time::Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.store.claim_next_batch().await {
                Ok(batch) if !batch.is_empty() => {
                    self.execute_batch(batch).await;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Failed to claim a job batch");
                }
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = self.store.wait_for_work() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Run one claimed batch to completion. A single-job batch runs
    /// inline; larger batches fan out across the pool.
    pub async fn execute_batch(&self, mut batch: Vec<Job>) {
        if batch.len() == 1 {
            if let Some(job) = batch.pop() {
                self.execute_one(job).await;
            }
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let mut set = JoinSet::new();
        for job in batch {
            let permit = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let dispatcher = Arc::clone(&self.dispatcher);
            let max_attempts = store.config().max_attempts;
            set.spawn(async move {
                let _permit = permit.acquire().await;
                settle(&store, dispatcher.as_ref(), job, max_attempts).await;
            });
        }
        while set.join_next().await.is_some() {}
    }

    async fn execute_one(&self, job: Job) {
        settle(
            &self.store,
            self.dispatcher.as_ref(),
            job,
            self.store.config().max_attempts,
        )
        .await;
    }
}

/// Dispatch one job and apply the outcome to the store.
#[instrument(skip_all, fields(job_id = %job.id, kind = %job.kind))]
async fn settle(store: &JobStore, dispatcher: &dyn JobDispatcher, job: Job, max_attempts: u32) {
    match dispatcher.dispatch(&job).await {
        Ok(()) => {
            if let Err(e) = store.acknowledge(&job.id).await {
                error!(error = %e, "Failed to acknowledge completed job");
            }
        }
        Err(DispatchError::Permanent { reason }) => {
            error!(reason, "Job failed permanently");
            if let Err(e) = store.move_to_dead_letter(&job.id, &reason).await {
                error!(error = %e, "Failed to dead-letter job");
            }
        }
        Err(DispatchError::Transient { reason }) => {
            match store.negative_acknowledge(&job.id, &reason).await {
                Ok(updated) if updated.attempts > max_attempts => {
                    if let Err(e) = store.move_to_dead_letter(&job.id, &reason).await {
                        error!(error = %e, "Failed to dead-letter exhausted job");
                    }
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Failed to record job failure"),
            }
        }
    }
}

/// Process everything claimable right now, then return. Jobs waiting
/// out a backoff window are left for the background loop.
pub async fn drain(
    store: &Arc<JobStore>,
    dispatcher: &Arc<dyn JobDispatcher>,
    config: &WorkerConfig,
) -> Result<usize, WorkerError> {
    let worker = Worker::new(Arc::clone(store), Arc::clone(dispatcher), config.clone());
    let mut processed = 0usize;
    loop {
        let batch = store
            .claim_next_batch()
            .await
            .map_err(|e| WorkerError::LoopFailed {
                reason: e.to_string(),
            })?;
        if batch.is_empty() {
            break;
        }
        processed += batch.len();
        worker.execute_batch(batch).await;
    }
    Ok(processed)
}
