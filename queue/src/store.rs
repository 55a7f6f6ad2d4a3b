//! Durable job store with a separate dead-letter collection.
//!
//! Both collections are persisted as JSON files under the data
//! directory and rewritten with a tmp-file-plus-rename on every
//! mutation, so state survives a crash at any point. Jobs claimed but
//! not terminal at the time of a crash are re-run on the next open
//! (at-least-once; downstream writes are idempotent-ish by design).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use config::QueueConfig;
use eg_core::types::{DeadLetterEntry, ExecutionMode, Job, JobKind, JobStatus, QueueStats};
use errors::QueueError;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

const JOBS_FILE: &str = "jobs.json";
const DEAD_LETTER_FILE: &str = "dead_letter.json";

/// Target of an operator-initiated dead-letter retry.
#[derive(Debug, Clone)]
pub enum RetrySelector {
    Id(String),
    All,
}

struct StoreInner {
    /// Active jobs in creation (FIFO) order.
    jobs: Vec<Job>,
    dead: Vec<DeadLetterEntry>,
}

pub struct JobStore {
    inner: Mutex<StoreInner>,
    jobs_path: PathBuf,
    dead_path: PathBuf,
    config: QueueConfig,
    /// Wakes the worker when new work arrives.
    notify: Notify,
}

impl JobStore {
    /// Open (or create) the durable store under `dir`. Jobs left in
    /// `processing` by a crashed worker are reset to `pending`.
    pub fn open(dir: impl AsRef<Path>, config: QueueConfig) -> Result<Arc<Self>, QueueError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| QueueError::Persistence {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let jobs_path = dir.join(JOBS_FILE);
        let dead_path = dir.join(DEAD_LETTER_FILE);

        let mut jobs: Vec<Job> = load_collection(&jobs_path)?;
        let dead: Vec<DeadLetterEntry> = load_collection(&dead_path)?;

        let mut recovered = 0usize;
        for job in &mut jobs {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Pending;
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(count = recovered, "Recovered in-flight jobs from previous run");
        }
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let store = Self {
            inner: Mutex::new(StoreInner { jobs, dead }),
            jobs_path,
            dead_path,
            config,
            notify: Notify::new(),
        };
        if recovered > 0 {
            // Persist the recovery so a second crash does not repeat it.
            let inner = store.inner.try_lock().map_err(|_| QueueError::Corrupt {
                reason: "store lock contended during open".to_string(),
            })?;
            store.persist_jobs(&inner)?;
        }
        Ok(Arc::new(store))
    }

    /// Enqueue a job. Never rejects on capacity; crossing 80%/100% of
    /// the soft limit only logs a backpressure warning. Returns the new
    /// job id and whether the store was empty beforehand (the
    /// auto-start trigger).
    pub async fn enqueue(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        execution_mode: ExecutionMode,
    ) -> Result<(String, bool), QueueError> {
        let job = Job::new(kind, payload, execution_mode);
        let id = job.id.clone();

        let mut inner = self.inner.lock().await;
        let was_empty = inner.jobs.is_empty();
        inner.jobs.push(job);

        let occupancy = inner.jobs.len() as f64 / self.config.soft_limit as f64 * 100.0;
        if occupancy >= 100.0 {
            warn!(
                pending = inner.jobs.len(),
                soft_limit = self.config.soft_limit,
                "Job queue exceeded its soft limit"
            );
        } else if occupancy >= 80.0 {
            warn!(
                pending = inner.jobs.len(),
                soft_limit = self.config.soft_limit,
                "Job queue above 80% of its soft limit"
            );
        }

        self.persist_jobs(&inner)?;
        drop(inner);

        debug!(job_id = %id, kind = %kind, mode = %execution_mode, "Job enqueued");
        self.notify.notify_one();
        Ok((id, was_empty))
    }

    /// Claim the next batch in strict FIFO order.
    ///
    /// Returns a single job when the head of the queue is sequential,
    /// or a contiguous run of parallel jobs (up to the claim limit)
    /// stopping before the next sequential job. A sequential job is a
    /// full barrier: nothing enqueued after it is handed out until it
    /// reaches a terminal state, and it is never batched with any other
    /// job. Jobs still inside their backoff window are skipped.
    pub async fn claim_next_batch(&self) -> Result<Vec<Job>, QueueError> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let any_processing = inner.jobs.iter().any(|j| j.status == JobStatus::Processing);

        let mut claimed_ids: Vec<String> = Vec::new();
        for job in &inner.jobs {
            match job.execution_mode {
                ExecutionMode::Sequential => {
                    if job.status == JobStatus::Processing {
                        // Barrier already in flight.
                        claimed_ids.clear();
                        break;
                    }
                    if claimed_ids.is_empty() {
                        // Sequential head: claim it alone, and only once
                        // nothing else is running ahead of it.
                        if !any_processing && job.is_claimable(now) {
                            claimed_ids.push(job.id.clone());
                        }
                    }
                    // Either way the run stops at a sequential job.
                    break;
                }
                ExecutionMode::Parallel => {
                    if job.is_claimable(now) {
                        claimed_ids.push(job.id.clone());
                        if claimed_ids.len() >= self.config.claim_limit {
                            break;
                        }
                    }
                }
            }
        }

        if claimed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = Vec::with_capacity(claimed_ids.len());
        for job in &mut inner.jobs {
            if claimed_ids.contains(&job.id) {
                job.status = JobStatus::Processing;
                batch.push(job.clone());
            }
        }
        self.persist_jobs(&inner)?;

        debug!(count = batch.len(), "Claimed job batch");
        Ok(batch)
    }

    /// Remove a successfully executed job.
    pub async fn acknowledge(&self, id: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let before = inner.jobs.len();
        inner.jobs.retain(|j| j.id != id);
        if inner.jobs.len() == before {
            return Err(QueueError::JobNotFound { id: id.to_string() });
        }
        self.persist_jobs(&inner)?;
        debug!(job_id = %id, "Job acknowledged");
        Ok(())
    }

    /// Record a failure: attempts + 1, error stored, job returned to
    /// pending with its backoff gate set. Returns the updated job so the
    /// caller can decide whether retries are exhausted.
    pub async fn negative_acknowledge(&self, id: &str, error: &str) -> Result<Job, QueueError> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| QueueError::JobNotFound { id: id.to_string() })?;

        job.attempts += 1;
        job.last_error = Some(error.to_string());
        job.status = JobStatus::Pending;
        let backoff = self.config.backoff_for_attempt(job.attempts);
        job.not_before = Some(
            Utc::now()
                + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::seconds(0)),
        );

        let updated = job.clone();
        self.persist_jobs(&inner)?;
        drop(inner);

        warn!(
            job_id = %id,
            attempts = updated.attempts,
            backoff_ms = backoff.as_millis() as u64,
            error,
            "Job failed, scheduled for retry"
        );
        Ok(updated)
    }

    /// Move a job into the dead-letter collection. Only explicit
    /// operator retry brings it back.
    pub async fn move_to_dead_letter(&self, id: &str, error: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        let idx = inner
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| QueueError::JobNotFound { id: id.to_string() })?;

        let mut job = inner.jobs.remove(idx);
        job.status = JobStatus::Dead;
        job.last_error = Some(error.to_string());

        inner.dead.push(DeadLetterEntry {
            job,
            failed_at: Utc::now(),
            final_error: error.to_string(),
        });

        self.persist_jobs(&inner)?;
        self.persist_dead(&inner)?;
        warn!(job_id = %id, error, "Job moved to dead letter");
        Ok(())
    }

    /// Re-enqueue dead-lettered jobs as fresh pending jobs, attempts
    /// reset to zero. Returns the new job ids.
    pub async fn retry_dead_letter(
        &self,
        selector: RetrySelector,
    ) -> Result<Vec<String>, QueueError> {
        let mut inner = self.inner.lock().await;

        let entries: Vec<DeadLetterEntry> = match &selector {
            RetrySelector::All => inner.dead.drain(..).collect(),
            RetrySelector::Id(id) => {
                let idx = inner
                    .dead
                    .iter()
                    .position(|e| e.job.id == *id)
                    .ok_or_else(|| QueueError::DeadLetterNotFound { id: id.clone() })?;
                vec![inner.dead.remove(idx)]
            }
        };

        let mut new_ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let job = Job::new(
                entry.job.kind,
                entry.job.payload.clone(),
                entry.job.execution_mode,
            );
            new_ids.push(job.id.clone());
            inner.jobs.push(job);
        }

        self.persist_jobs(&inner)?;
        self.persist_dead(&inner)?;
        drop(inner);

        if !new_ids.is_empty() {
            info!(count = new_ids.len(), "Dead-letter jobs re-enqueued");
            self.notify.notify_one();
        }
        Ok(new_ids)
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.inner.lock().await.dead.clone()
    }

    /// Derived statistics; reporting only.
    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        QueueStats {
            pending_count: inner.jobs.len(),
            dead_letter_count: inner.dead.len(),
            capacity_pct: inner.jobs.len() as f64 / self.config.soft_limit as f64 * 100.0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }

    /// Await the next enqueue/retry wakeup.
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn persist_jobs(&self, inner: &StoreInner) -> Result<(), QueueError> {
        write_collection(&self.jobs_path, &inner.jobs)
    }

    fn persist_dead(&self, inner: &StoreInner) -> Result<(), QueueError> {
        write_collection(&self.dead_path, &inner.dead)
    }
}

fn load_collection<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, QueueError> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| QueueError::Corrupt {
            reason: format!("{}: {}", path.display(), e),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(QueueError::Persistence {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Atomic rewrite: serialize to a sibling tmp file, then rename over
/// the target so readers never observe a partial write.
fn write_collection<T: serde::Serialize>(path: &Path, items: &[T]) -> Result<(), QueueError> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(items).map_err(|e| QueueError::Persistence {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    std::fs::write(&tmp, bytes).map_err(|e| QueueError::Persistence {
        path: tmp.display().to_string(),
        reason: e.to_string(),
    })?;
    std::fs::rename(&tmp, path).map_err(|e| QueueError::Persistence {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
