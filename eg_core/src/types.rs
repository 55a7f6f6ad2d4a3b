use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifies the repository or session a capture belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ScopeRef(String);

impl ScopeRef {
    pub fn new(scope: impl Into<String>) -> Option<Self> {
        let scope = scope.into();
        if scope.is_empty() || scope.len() > 200 {
            None
        } else {
            Some(Self(scope))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ScopeRef {
    fn default() -> Self {
        Self("default".to_string())
    }
}

/// Closed set of job kinds; dispatch matches this exhaustively so a new
/// kind cannot be added without updating every handler site.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    CaptureGitCommits,
    CaptureConversation,
}

/// Whether a job is an execution barrier or may share a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionMode {
    /// Full barrier: no later job starts until this one is terminal.
    Sequential,
    /// May run concurrently with other parallel jobs claimed in the
    /// same contiguous run.
    #[default]
    Parallel,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Dead,
}

/// One unit of deferred, retryable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Kind-specific payload; opaque to the queue itself.
    pub payload: serde_json::Value,
    pub execution_mode: ExecutionMode,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Gate for retry backoff; the store will not hand the job out
    /// before this instant.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value, execution_mode: ExecutionMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
            execution_mode,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            not_before: None,
        }
    }

    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.not_before.is_none_or(|t| t <= now)
    }
}

/// Terminal record for a job that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub job: Job,
    pub failed_at: DateTime<Utc>,
    pub final_error: String,
}

/// Queue health, derived from occupancy against the soft limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthLevel {
    Ok,
    Warning,
    Error,
}

/// Derived queue statistics; reporting only, never used to reject work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending_count: usize,
    pub dead_letter_count: usize,
    /// Pending occupancy as a percentage of the configured soft limit.
    pub capacity_pct: f64,
}

impl QueueStats {
    pub fn health(&self) -> HealthLevel {
        if self.capacity_pct >= 100.0 {
            HealthLevel::Error
        } else if self.capacity_pct >= 80.0 {
            HealthLevel::Warning
        } else {
            HealthLevel::Ok
        }
    }
}

/// Payload for `JobKind::CaptureGitCommits`. The job itself is only a
/// trigger; the commit backlog lives in the pending-signal store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCapturePayload {
    pub scope: ScopeRef,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerMode {
    /// Automatic small delta since the last captured turn.
    #[default]
    Incremental,
    /// User-triggered whole-session capture.
    Full,
}

/// Payload for `JobKind::CaptureConversation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCapturePayload {
    pub scope: ScopeRef,
    pub session_id: String,
    pub transcript_path: std::path::PathBuf,
    #[serde(default)]
    pub mode: TriggerMode,
}

/// One turn of a session transcript (JSONL line).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Per-scope capture bookkeeping, independent of the job lifecycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    /// Offset of the last captured turn, keyed by session id. Sessions
    /// sharing a scope advance independently.
    #[serde(default)]
    pub session_offsets: HashMap<String, usize>,
    /// Last repository commit folded into a summary.
    pub last_indexed_commit: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CaptureMetadata {
    pub fn turn_offset(&self, session_id: &str) -> usize {
        self.session_offsets.get(session_id).copied().unwrap_or(0)
    }

    pub fn set_turn_offset(&mut self, session_id: &str, offset: usize) {
        self.session_offsets.insert(session_id.to_string(), offset);
    }
}

/// Full diff of a single commit as returned by the version-control query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDiff {
    pub id: String,
    pub message: String,
    pub parent_ids: Vec<String>,
    pub files: Vec<FileDiff>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub path: String,
    pub content: String,
    /// True when the diff was cut at the configured line cap. Truncated
    /// content always carries an explicit marker line.
    pub truncated: bool,
}

/// Fixed set of capture-worthy content categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelevanceCategory {
    DecisionRationale,
    ArchitecturePattern,
    BugRootCause,
    DependencyConfig,
}

impl RelevanceCategory {
    pub const ALL: [RelevanceCategory; 4] = [
        RelevanceCategory::DecisionRationale,
        RelevanceCategory::ArchitecturePattern,
        RelevanceCategory::BugRootCause,
        RelevanceCategory::DependencyConfig,
    ];
}

/// A single redaction made by the sanitizer, kept for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizerFinding {
    pub label: String,
    pub occurrences: usize,
}

/// Sanitizer output: always usable text, findings on the side.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    pub text: String,
    pub findings: Vec<SanitizerFinding>,
}

/// Result of the summarization step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub text: String,
    pub item_count: usize,
    /// True when the model was unavailable and the deterministic
    /// concatenation fallback produced the text.
    pub used_fallback: bool,
}

/// Entity persisted in the knowledge store; one per capture batch,
/// never one per commit or turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntity {
    pub id: String,
    pub scope: ScopeRef,
    pub content: String,
    /// Contributing commit ids or session markers, for traceability.
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_ref_rejects_empty() {
        assert!(ScopeRef::new("").is_none());
        assert!(ScopeRef::new("a".repeat(201)).is_none());
        assert_eq!(ScopeRef::new("repo-1").unwrap().as_str(), "repo-1");
    }

    #[test]
    fn test_job_kind_round_trip() {
        let json = serde_json::to_string(&JobKind::CaptureGitCommits).unwrap();
        assert_eq!(json, "\"capture_git_commits\"");
        let kind: JobKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, JobKind::CaptureGitCommits);
    }

    #[test]
    fn test_new_job_starts_pending() {
        let job = Job::new(
            JobKind::CaptureConversation,
            serde_json::json!({}),
            ExecutionMode::Parallel,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.is_claimable(Utc::now()));
    }

    #[test]
    fn test_backoff_gate_blocks_claim() {
        let mut job = Job::new(
            JobKind::CaptureGitCommits,
            serde_json::json!({}),
            ExecutionMode::Sequential,
        );
        job.not_before = Some(Utc::now() + chrono::Duration::seconds(60));
        assert!(!job.is_claimable(Utc::now()));
    }

    #[test]
    fn test_queue_stats_health_thresholds() {
        let mut stats = QueueStats {
            pending_count: 10,
            dead_letter_count: 0,
            capacity_pct: 10.0,
        };
        assert_eq!(stats.health(), HealthLevel::Ok);
        stats.capacity_pct = 80.0;
        assert_eq!(stats.health(), HealthLevel::Warning);
        stats.capacity_pct = 100.0;
        assert_eq!(stats.health(), HealthLevel::Error);
    }
}
