//! Git commit capture: resolve queued commit markers into diffs, batch
//! them, and run the batches through the filter → sanitize → summarize
//! → store pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use config::GitCaptureConfig;
use eg_core::traits::{KnowledgeStore, Sanitizer, VersionControlQuery};
use eg_core::types::{CommitDiff, FileDiff, GitCapturePayload, KnowledgeEntity, ScopeRef};
use errors::CaptureError;
use queue::{BatchAccumulator, PendingSignalStore};
use tracing::{debug, info, instrument, warn};

use crate::metadata::CaptureMetadataStore;
use crate::relevance::{Relevance, RelevanceFilter};
use crate::summarizer::Summarizer;

const TRUNCATION_MARKER: &str = "... [diff truncated]";

/// git2-backed implementation of the version-control query. The
/// repository handle is opened per call; `git2::Repository` is not
/// shareable across threads.
pub struct Git2VersionControl {
    root_path: PathBuf,
}

impl Git2VersionControl {
    pub fn new(root_path: impl AsRef<Path>) -> Self {
        Self {
            root_path: root_path.as_ref().to_path_buf(),
        }
    }

    fn diff_sync(&self, commit_id: &str) -> Result<CommitDiff, git2::Error> {
        let repo = git2::Repository::open(&self.root_path)?;
        let commit = repo.revparse_single(commit_id)?.peel_to_commit()?;
        let tree = commit.tree()?;

        let parent_ids: Vec<String> = commit.parent_ids().map(|id| id.to_string()).collect();

        let mut files = Vec::new();
        if parent_ids.is_empty() {
            // Root commit: diff against the empty tree.
            let diff = repo.diff_tree_to_tree(None, Some(&tree), None)?;
            collect_file_diffs(&diff, &mut files)?;
        } else {
            // Merge commits are diffed against each parent separately so
            // changes from both sides are visible.
            for parent in commit.parents() {
                let parent_tree = parent.tree()?;
                let diff = repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
                collect_file_diffs(&diff, &mut files)?;
            }
        }

        Ok(CommitDiff {
            id: commit.id().to_string(),
            message: commit.message().unwrap_or_default().to_string(),
            parent_ids,
            files,
        })
    }
}

fn collect_file_diffs(diff: &git2::Diff<'_>, files: &mut Vec<FileDiff>) -> Result<(), git2::Error> {
    for idx in 0..diff.deltas().len() {
        let Some(mut patch) = git2::Patch::from_diff(diff, idx)? else {
            continue;
        };
        let path = patch
            .delta()
            .new_file()
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let buf = patch.to_buf()?;
        files.push(FileDiff {
            path,
            content: buf.as_str().unwrap_or_default().to_string(),
            truncated: false,
        });
    }
    Ok(())
}

#[async_trait]
impl VersionControlQuery for Git2VersionControl {
    type Error = CaptureError;

    async fn diff(&self, commit_id: &str) -> Result<CommitDiff, Self::Error> {
        self.diff_sync(commit_id)
            .map_err(|e| CaptureError::VersionControl {
                commit_id: commit_id.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Cut a file diff at the line cap, appending an explicit marker so the
/// summary never mistakes a cut diff for a complete one.
pub(crate) fn truncate_diff(file: FileDiff, line_cap: usize) -> FileDiff {
    let line_count = file.content.lines().count();
    if line_count <= line_cap {
        return file;
    }
    let mut content: String = file
        .content
        .lines()
        .take(line_cap)
        .collect::<Vec<_>>()
        .join("\n");
    content.push('\n');
    content.push_str(TRUNCATION_MARKER);
    FileDiff {
        path: file.path,
        content,
        truncated: true,
    }
}

struct BatchItem {
    commit_id: String,
    text: String,
}

/// Handler for `JobKind::CaptureGitCommits`.
pub struct GitCaptureHandler<V, S> {
    signals: PendingSignalStore,
    vcs: V,
    store: Arc<S>,
    sanitizer: Arc<dyn Sanitizer>,
    summarizer: Summarizer,
    relevance: RelevanceFilter,
    metadata: Arc<CaptureMetadataStore>,
    config: GitCaptureConfig,
}

impl<V, S> GitCaptureHandler<V, S>
where
    V: VersionControlQuery<Error = CaptureError>,
    S: KnowledgeStore<Error = CaptureError>,
{
    pub fn new(
        signals: PendingSignalStore,
        vcs: V,
        store: Arc<S>,
        sanitizer: Arc<dyn Sanitizer>,
        summarizer: Summarizer,
        relevance: RelevanceFilter,
        metadata: Arc<CaptureMetadataStore>,
        config: GitCaptureConfig,
    ) -> Self {
        Self {
            signals,
            vcs,
            store,
            sanitizer,
            summarizer,
            relevance,
            metadata,
            config,
        }
    }

    /// Consume the queued commit markers and capture them. Returns the
    /// number of knowledge entities stored. Markers not yet folded into
    /// a stored entity are re-queued when a step fails, so a retry does
    /// not lose them.
    #[instrument(skip_all, fields(scope = %payload.scope))]
    pub async fn handle(&self, payload: &GitCapturePayload) -> Result<usize, CaptureError> {
        let markers = self
            .signals
            .consume_all()
            .map_err(|e| CaptureError::StoreWrite {
                reason: e.to_string(),
            })?;
        if markers.is_empty() {
            debug!("No pending commit markers");
            return Ok(0);
        }
        info!(count = markers.len(), "Capturing queued commits");

        let mut accumulator: BatchAccumulator<BatchItem> =
            BatchAccumulator::new(self.config.batch_threshold);
        let mut stored = 0usize;

        for (idx, commit_id) in markers.iter().enumerate() {
            let diff = match self.vcs.diff(commit_id).await {
                Ok(diff) => diff,
                Err(e) => {
                    self.requeue(accumulator.flush(), &markers[idx..]);
                    return Err(e);
                }
            };

            let text = render_commit(&diff, self.config.diff_line_cap);
            if let Relevance::Excluded = self.relevance.classify(&text) {
                debug!(commit_id = %commit_id, "Commit excluded by relevance filter");
                continue;
            }

            if let Some(batch) = accumulator.add(BatchItem {
                commit_id: commit_id.clone(),
                text,
            }) {
                let batch_ids: Vec<String> =
                    batch.iter().map(|item| item.commit_id.clone()).collect();
                match self.capture_batch(&payload.scope, batch).await {
                    Ok(wrote) => stored += usize::from(wrote),
                    Err(e) => {
                        self.requeue_ids(batch_ids, &markers[idx + 1..]);
                        return Err(e);
                    }
                }
            }
        }

        let remainder = accumulator.flush();
        if !remainder.is_empty() {
            let remainder_ids: Vec<String> =
                remainder.iter().map(|item| item.commit_id.clone()).collect();
            match self.capture_batch(&payload.scope, remainder).await {
                Ok(wrote) => stored += usize::from(wrote),
                Err(e) => {
                    self.requeue_ids(remainder_ids, &[]);
                    return Err(e);
                }
            }
        }

        if let Some(last) = markers.last() {
            self.metadata.update(&payload.scope, |m| {
                m.last_indexed_commit = Some(last.clone());
            })?;
        }

        Ok(stored)
    }

    /// Sanitize, summarize, and store one batch as a single entity
    /// tagged with the contributing commit ids. Sanitization always
    /// happens before the model sees anything.
    async fn capture_batch(
        &self,
        scope: &ScopeRef,
        batch: Vec<BatchItem>,
    ) -> Result<bool, CaptureError> {
        let mut sanitized = Vec::with_capacity(batch.len());
        let mut tags = Vec::with_capacity(batch.len());
        for item in batch {
            let outcome = self.sanitizer.sanitize(&item.text);
            for finding in &outcome.findings {
                warn!(
                    commit_id = %item.commit_id,
                    label = %finding.label,
                    occurrences = finding.occurrences,
                    "Redacted sensitive content from commit capture"
                );
            }
            sanitized.push(outcome.text);
            tags.push(item.commit_id);
        }

        let summary = self.summarizer.summarize(&sanitized, "").await;
        if summary.text.is_empty() {
            return Ok(false);
        }

        let entity = KnowledgeEntity {
            id: uuid::Uuid::new_v4().to_string(),
            scope: scope.clone(),
            content: summary.text,
            tags,
            created_at: chrono::Utc::now(),
        };
        self.store.store(entity).await?;
        info!(
            items = summary.item_count,
            used_fallback = summary.used_fallback,
            "Stored commit capture summary"
        );
        Ok(true)
    }

    /// Put unprocessed markers back so the retrying job sees them.
    fn requeue(&self, unflushed: Vec<BatchItem>, remaining: &[String]) {
        self.requeue_ids(
            unflushed.into_iter().map(|item| item.commit_id).collect(),
            remaining,
        );
    }

    fn requeue_ids(&self, ids: Vec<String>, remaining: &[String]) {
        for marker in ids.into_iter().chain(remaining.iter().cloned()) {
            if let Err(e) = self.signals.append(&marker) {
                warn!(marker = %marker, error = %e, "Failed to re-queue commit marker");
            }
        }
    }
}

fn render_commit(diff: &CommitDiff, line_cap: usize) -> String {
    let mut text = format!("commit {}\n{}\n", diff.id, diff.message.trim());
    for file in &diff.files {
        let file = truncate_diff(file.clone(), line_cap);
        text.push_str(&format!("\n--- {}\n{}\n", file.path, file.content));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmService;
    use crate::sanitizer::SecretSanitizer;
    use config::RelevanceConfig;
    use std::sync::Mutex as StdMutex;

    struct MockVcs {
        diffs: StdMutex<std::collections::HashMap<String, CommitDiff>>,
        fail: StdMutex<Vec<String>>,
    }

    impl MockVcs {
        fn new() -> Self {
            Self {
                diffs: StdMutex::new(std::collections::HashMap::new()),
                fail: StdMutex::new(Vec::new()),
            }
        }

        fn with_commit(self, id: &str, message: &str) -> Self {
            self.diffs.lock().unwrap().insert(
                id.to_string(),
                CommitDiff {
                    id: id.to_string(),
                    message: message.to_string(),
                    parent_ids: vec![],
                    files: vec![],
                },
            );
            self
        }

        fn fail_on(&self, id: &str) {
            self.fail.lock().unwrap().push(id.to_string());
        }
    }

    #[async_trait]
    impl VersionControlQuery for MockVcs {
        type Error = CaptureError;

        async fn diff(&self, commit_id: &str) -> Result<CommitDiff, Self::Error> {
            if self.fail.lock().unwrap().contains(&commit_id.to_string()) {
                return Err(CaptureError::VersionControl {
                    commit_id: commit_id.to_string(),
                    reason: "object not found".to_string(),
                });
            }
            self.diffs
                .lock()
                .unwrap()
                .get(commit_id)
                .cloned()
                .ok_or_else(|| CaptureError::VersionControl {
                    commit_id: commit_id.to_string(),
                    reason: "unknown commit".to_string(),
                })
        }
    }

    struct MockStore {
        entities: StdMutex<Vec<KnowledgeEntity>>,
    }

    impl MockStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entities: StdMutex::new(Vec::new()),
            })
        }

        fn stored(&self) -> Vec<KnowledgeEntity> {
            self.entities.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KnowledgeStore for MockStore {
        type Error = CaptureError;

        async fn store(&self, entity: KnowledgeEntity) -> Result<String, Self::Error> {
            let id = entity.id.clone();
            self.entities.lock().unwrap().push(entity);
            Ok(id)
        }

        async fn search(
            &self,
            _scope: &ScopeRef,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<KnowledgeEntity>, Self::Error> {
            Ok(vec![])
        }

        async fn list(&self, scope: &ScopeRef) -> Result<Vec<KnowledgeEntity>, Self::Error> {
            Ok(self
                .entities
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.scope == *scope)
                .cloned()
                .collect())
        }

        async fn delete(&self, _id: &str) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn handler(
        dir: &Path,
        vcs: MockVcs,
        store: Arc<MockStore>,
        llm: MockLlmService,
    ) -> GitCaptureHandler<MockVcs, MockStore> {
        GitCaptureHandler::new(
            PendingSignalStore::new(dir.join("pending_commits")),
            vcs,
            store,
            Arc::new(SecretSanitizer::new()),
            Summarizer::new(Arc::new(llm)),
            RelevanceFilter::new(&RelevanceConfig::default()),
            Arc::new(CaptureMetadataStore::new(dir.join("metadata"))),
            GitCaptureConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_no_markers_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockStore::new();
        let h = handler(dir.path(), MockVcs::new(), store.clone(), MockLlmService::new());

        let payload = GitCapturePayload {
            scope: ScopeRef::new("repo").unwrap(),
        };
        assert_eq!(h.handle(&payload).await.unwrap(), 0);
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn test_batch_becomes_single_entity_with_commit_tags() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = MockVcs::new()
            .with_commit("c1", "fix race in scheduler startup")
            .with_commit("c2", "chose channel over mutex because of contention");
        let store = MockStore::new();
        let llm = MockLlmService::new();
        llm.set_default_response("merged note").await;
        let h = handler(dir.path(), vcs, store.clone(), llm);

        h.signals.append("c1").unwrap();
        h.signals.append("c2").unwrap();

        let payload = GitCapturePayload {
            scope: ScopeRef::new("repo").unwrap(),
        };
        assert_eq!(h.handle(&payload).await.unwrap(), 1);

        let stored = store.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "merged note");
        assert_eq!(stored[0].tags, vec!["c1".to_string(), "c2".to_string()]);
        // Metadata advanced to the last captured commit.
        let meta = h
            .metadata
            .load(&ScopeRef::new("repo").unwrap())
            .unwrap();
        assert_eq!(meta.last_indexed_commit.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_irrelevant_commits_are_dropped_before_summarization() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = MockVcs::new()
            .with_commit("c1", "WIP: scribbles")
            .with_commit("c2", "fix crash on empty config");
        let store = MockStore::new();
        let llm = MockLlmService::new();
        llm.set_default_response("note").await;
        let h = handler(dir.path(), vcs, store.clone(), llm);

        h.signals.append("c1").unwrap();
        h.signals.append("c2").unwrap();

        let payload = GitCapturePayload {
            scope: ScopeRef::new("repo").unwrap(),
        };
        h.handle(&payload).await.unwrap();

        let stored = store.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].tags, vec!["c2".to_string()]);
    }

    #[tokio::test]
    async fn test_vcs_failure_requeues_unprocessed_markers() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = MockVcs::new().with_commit("c1", "fix leak in watcher");
        vcs.fail_on("c2");
        let store = MockStore::new();
        let h = handler(dir.path(), vcs, store.clone(), MockLlmService::new());

        h.signals.append("c1").unwrap();
        h.signals.append("c2").unwrap();
        h.signals.append("c3").unwrap();

        let payload = GitCapturePayload {
            scope: ScopeRef::new("repo").unwrap(),
        };
        assert!(h.handle(&payload).await.is_err());

        // c1 was still in the unflushed accumulator, so everything
        // comes back for the retry.
        let requeued = h.signals.consume_all().unwrap();
        assert_eq!(requeued, vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_truncation_appends_marker_at_cap() {
        let content: String = (0..600).map(|i| format!("line {i}\n")).collect();
        let file = FileDiff {
            path: "src/lib.rs".to_string(),
            content,
            truncated: false,
        };

        let cut = truncate_diff(file, 500);
        assert!(cut.truncated);
        assert_eq!(cut.content.lines().count(), 501);
        assert!(cut.content.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_short_diff_is_not_truncated() {
        let file = FileDiff {
            path: "src/lib.rs".to_string(),
            content: "one\ntwo".to_string(),
            truncated: false,
        };
        let out = truncate_diff(file, 500);
        assert!(!out.truncated);
        assert_eq!(out.content, "one\ntwo");
    }
}
