//! Core traits for the capture queue's external collaborators.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CommitDiff, Job, KnowledgeEntity, SanitizeOutcome, ScopeRef};

/// Opaque persistent store the pipeline writes session summaries into.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    type Error;

    /// Persist one entity and return its id.
    async fn store(&self, entity: KnowledgeEntity) -> Result<String, Self::Error>;

    async fn search(
        &self,
        scope: &ScopeRef,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, Self::Error>;

    async fn list(&self, scope: &ScopeRef) -> Result<Vec<KnowledgeEntity>, Self::Error>;

    async fn delete(&self, id: &str) -> Result<(), Self::Error>;
}

/// Chat-model failure, with an explicitly distinguishable unavailable
/// condition so callers can fall back without inspecting messages.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Quota, network, or service outage. Callers degrade gracefully.
    #[error("LLM unavailable: {reason}")]
    Unavailable { reason: String },

    /// The model answered but the response was unusable.
    #[error("LLM request failed: {reason}")]
    Failed { reason: String },
}

impl LlmError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::Unavailable { .. })
    }
}

/// Chat/summarization interface.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn chat(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Secrets/PII sanitizer. Pure and total: even on detected secrets it
/// returns usable, redacted content. This is the security boundary the
/// relevance filter is not.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> SanitizeOutcome;
}

/// Version-control query collaborator.
#[async_trait]
pub trait VersionControlQuery: Send + Sync {
    type Error;

    /// Full message + per-file diffs + parent ids for one commit.
    /// Merge commits are diffed against each parent separately.
    async fn diff(&self, commit_id: &str) -> Result<CommitDiff, Self::Error>;
}

/// Job execution failure as seen by the worker. The taxonomy drives the
/// retry decision: transient failures retry with backoff, permanent ones
/// dead-letter immediately without burning attempts.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transient failure: {reason}")]
    Transient { reason: String },

    #[error("permanent failure: {reason}")]
    Permanent { reason: String },
}

impl DispatchError {
    pub fn transient(reason: impl Into<String>) -> Self {
        DispatchError::Transient {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        DispatchError::Permanent {
            reason: reason.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, DispatchError::Permanent { .. })
    }
}

/// Seam between the background worker and the capture pipeline. The
/// implementation must match `Job::kind` exhaustively; a malformed
/// payload is a permanent failure, never a silent no-op.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &Job) -> Result<(), DispatchError>;
}
