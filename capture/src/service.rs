//! The one context object that wires configuration, stores, pipeline,
//! and worker together. Producers (hooks, CLI) talk to this facade
//! in-process; nothing re-invokes the binary to reach the queue.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use config::Config;
use eg_core::traits::{JobDispatcher, LlmService, Sanitizer};
use eg_core::types::{
    ConversationCapturePayload, DeadLetterEntry, ExecutionMode, GitCapturePayload, HealthLevel,
    JobKind, QueueStats, ScopeRef, TriggerMode,
};
use queue::{JobStore, PendingSignalStore, RetrySelector, Worker, WorkerState, drain};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::conversation::ConversationCaptureHandler;
use crate::dispatcher::CaptureDispatcher;
use crate::git::{Git2VersionControl, GitCaptureHandler};
use crate::knowledge::FileKnowledgeStore;
use crate::llm::OpenAiLlmService;
use crate::metadata::CaptureMetadataStore;
use crate::relevance::RelevanceFilter;
use crate::sanitizer::SecretSanitizer;
use crate::summarizer::Summarizer;

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub queue: QueueStats,
    pub health: HealthLevel,
    pub worker_running: bool,
}

pub struct CaptureService {
    config: Config,
    store: Arc<JobStore>,
    worker: Arc<Worker>,
    dispatcher: Arc<dyn JobDispatcher>,
    signals: PendingSignalStore,
}

impl CaptureService {
    /// Build the full service against a real model endpoint.
    pub fn new(config: Config, repo_root: impl AsRef<Path>) -> Result<Self> {
        let llm: Arc<dyn LlmService> = Arc::new(OpenAiLlmService::new(config.llm.clone())?);
        Self::with_llm(config, repo_root, llm)
    }

    /// Build the service with a caller-supplied model, used by tests
    /// and offline runs.
    pub fn with_llm(
        config: Config,
        repo_root: impl AsRef<Path>,
        llm: Arc<dyn LlmService>,
    ) -> Result<Self> {
        let data_dir = &config.data_dir;
        let store = JobStore::open(data_dir.join("queue"), config.queue.clone())?;
        let knowledge = Arc::new(FileKnowledgeStore::open(data_dir.join("knowledge"))?);
        let metadata = Arc::new(CaptureMetadataStore::new(data_dir.join("metadata")));
        let sanitizer: Arc<dyn Sanitizer> = Arc::new(SecretSanitizer::new());
        let signals = PendingSignalStore::new(data_dir.join("pending_commits"));

        let git_handler = GitCaptureHandler::new(
            PendingSignalStore::new(data_dir.join("pending_commits")),
            Git2VersionControl::new(repo_root),
            Arc::clone(&knowledge),
            Arc::clone(&sanitizer),
            Summarizer::new(Arc::clone(&llm)),
            RelevanceFilter::new(&config.relevance),
            Arc::clone(&metadata),
            config.git.clone(),
        );
        let conversation_handler = ConversationCaptureHandler::new(
            knowledge,
            sanitizer,
            Summarizer::new(llm),
            metadata,
        );

        let dispatcher: Arc<dyn JobDispatcher> =
            Arc::new(CaptureDispatcher::new(git_handler, conversation_handler));
        let worker = Worker::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            config.worker.clone(),
        );

        Ok(Self {
            config,
            store,
            worker,
            dispatcher,
            signals,
        })
    }

    /// Enqueue a job, auto-starting the worker on the empty→non-empty
    /// transition when configured.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        mode: ExecutionMode,
    ) -> Result<String> {
        let (id, was_empty) = self.store.enqueue(kind, payload, mode).await?;
        if was_empty && self.config.worker.auto_start {
            self.worker.start().await;
        }
        Ok(id)
    }

    /// Record one commit marker and make sure a capture job is queued
    /// to pick it up.
    pub async fn record_commit(&self, scope: &ScopeRef, commit_id: &str) -> Result<String> {
        self.signals.append(commit_id)?;
        let payload = serde_json::to_value(GitCapturePayload {
            scope: scope.clone(),
        })?;
        self.enqueue(JobKind::CaptureGitCommits, payload, ExecutionMode::Parallel)
            .await
    }

    /// Queue a conversation capture. A user-triggered full capture is
    /// sequential so it sees the queue in a settled state.
    pub async fn capture_session(
        &self,
        scope: &ScopeRef,
        session_id: &str,
        transcript_path: impl AsRef<Path>,
        mode: TriggerMode,
    ) -> Result<String> {
        let payload = serde_json::to_value(ConversationCapturePayload {
            scope: scope.clone(),
            session_id: session_id.to_string(),
            transcript_path: transcript_path.as_ref().to_path_buf(),
            mode,
        })?;
        let execution = match mode {
            TriggerMode::Full => ExecutionMode::Sequential,
            TriggerMode::Incremental => ExecutionMode::Parallel,
        };
        self.enqueue(JobKind::CaptureConversation, payload, execution)
            .await
    }

    pub async fn get_status(&self) -> ServiceStatus {
        let queue = self.store.stats().await;
        ServiceStatus {
            health: queue.health(),
            worker_running: self.worker.state().await == WorkerState::Running,
            queue,
        }
    }

    /// Synchronously work through everything claimable right now.
    pub async fn process_pending(&self) -> Result<usize> {
        let processed = drain(&self.store, &self.dispatcher, &self.config.worker).await?;
        info!(processed, "Drained pending jobs");
        Ok(processed)
    }

    pub async fn start_worker(&self) {
        self.worker.start().await;
    }

    pub async fn stop_worker(&self) -> Result<()> {
        self.worker.stop().await?;
        Ok(())
    }

    pub async fn retry_dead_letter(&self, selector: RetrySelector) -> Result<Vec<String>> {
        let ids = self.store.retry_dead_letter(selector).await?;
        if !ids.is_empty() && self.config.worker.auto_start {
            self.worker.start().await;
        }
        Ok(ids)
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.store.dead_letters().await
    }
}
