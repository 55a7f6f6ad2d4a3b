//! End-to-end ordering and delivery checks across the store, worker,
//! and signal store, using the public crate surface only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use config::{QueueConfig, WorkerConfig};
use eg_core::traits::{DispatchError, JobDispatcher};
use eg_core::types::{ExecutionMode, JobKind};
use proptest::prelude::*;
use queue::{BatchAccumulator, JobStore, PendingSignalStore, Worker, drain};

fn queue_config() -> QueueConfig {
    QueueConfig {
        soft_limit: 100,
        max_attempts: 3,
        backoff_base_ms: 10,
        claim_limit: 4,
    }
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        pool_size: 4,
        poll_interval_ms: 10,
        auto_start: true,
        graceful_shutdown_timeout_seconds: 5,
    }
}

/// Records which jobs ran and in what order.
struct RecordingDispatcher {
    order: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    overlapped_sequential: AtomicUsize,
    sequential_tags: Vec<String>,
}

impl RecordingDispatcher {
    fn new(sequential_tags: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            order: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            overlapped_sequential: AtomicUsize::new(0),
            sequential_tags,
        })
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &eg_core::types::Job) -> Result<(), DispatchError> {
        let tag = job.payload["tag"].as_str().unwrap_or_default().to_string();

        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.sequential_tags.contains(&tag) && concurrent > 0 {
            self.overlapped_sequential.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.order.lock().unwrap().push(tag);
        Ok(())
    }
}

async fn enqueue(store: &JobStore, mode: ExecutionMode, tag: &str) {
    store
        .enqueue(
            JobKind::CaptureGitCommits,
            serde_json::json!({ "tag": tag }),
            mode,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn sequential_jobs_never_overlap_anything() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::open(dir.path(), queue_config()).unwrap();

    enqueue(&store, ExecutionMode::Parallel, "p0").await;
    enqueue(&store, ExecutionMode::Sequential, "s0").await;
    enqueue(&store, ExecutionMode::Parallel, "p1").await;
    enqueue(&store, ExecutionMode::Parallel, "p2").await;
    enqueue(&store, ExecutionMode::Sequential, "s1").await;
    enqueue(&store, ExecutionMode::Parallel, "p3").await;

    let dispatcher = RecordingDispatcher::new(vec!["s0".to_string(), "s1".to_string()]);
    let dyn_dispatcher: Arc<dyn JobDispatcher> = dispatcher.clone();

    let worker = Worker::new(
        Arc::clone(&store),
        Arc::clone(&dyn_dispatcher),
        worker_config(),
    );
    worker.start().await;
    for _ in 0..200 {
        if store.is_empty().await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    worker.stop().await.unwrap();

    assert_eq!(dispatcher.overlapped_sequential.load(Ordering::SeqCst), 0);

    let order = dispatcher.order.lock().unwrap().clone();
    assert_eq!(order.len(), 6);
    let pos = |t: &str| order.iter().position(|o| o == t).unwrap();
    // Everything before a barrier finishes before it; everything after
    // waits for it.
    assert!(pos("p0") < pos("s0"));
    assert!(pos("s0") < pos("p1"));
    assert!(pos("s0") < pos("p2"));
    assert!(pos("p1") < pos("s1"));
    assert!(pos("p2") < pos("s1"));
    assert!(pos("s1") < pos("p3"));
}

#[tokio::test]
async fn drain_is_equivalent_for_parallel_only_queues() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::open(dir.path(), queue_config()).unwrap();

    for i in 0..9 {
        enqueue(&store, ExecutionMode::Parallel, &format!("p{i}")).await;
    }

    let dispatcher = RecordingDispatcher::new(vec![]);
    let dyn_dispatcher: Arc<dyn JobDispatcher> = dispatcher.clone();
    let processed = drain(&store, &dyn_dispatcher, &worker_config())
        .await
        .unwrap();

    assert_eq!(processed, 9);
    assert!(store.is_empty().await);
}

proptest! {
    /// Every item lands in exactly one emitted batch, order preserved,
    /// and only the last batch may be short.
    #[test]
    fn accumulator_partitions_exactly(
        items in prop::collection::vec(0u32..1000, 0..40),
        threshold in 1usize..8,
    ) {
        let mut accumulator = BatchAccumulator::new(threshold);
        let mut batches = Vec::new();
        for item in &items {
            if let Some(batch) = accumulator.add(*item) {
                batches.push(batch);
            }
        }
        let tail = accumulator.flush();
        if !tail.is_empty() {
            batches.push(tail);
        }

        for batch in &batches[..batches.len().saturating_sub(1)] {
            prop_assert_eq!(batch.len(), threshold);
        }
        let rejoined: Vec<u32> = batches.into_iter().flatten().collect();
        prop_assert_eq!(rejoined, items);
    }

    /// Markers survive interleaved append/consume cycles without loss
    /// or duplication.
    #[test]
    fn signal_store_loses_nothing(chunks in prop::collection::vec(1usize..6, 1..6)) {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingSignalStore::new(dir.path().join("pending"));

        let mut written = Vec::new();
        let mut consumed = Vec::new();
        let mut counter = 0usize;
        for chunk in chunks {
            for _ in 0..chunk {
                let marker = format!("commit-{counter}");
                store.append(&marker).unwrap();
                written.push(marker);
                counter += 1;
            }
            consumed.extend(store.consume_all().unwrap());
        }
        consumed.extend(store.consume_all().unwrap());

        prop_assert_eq!(consumed, written);
    }
}
