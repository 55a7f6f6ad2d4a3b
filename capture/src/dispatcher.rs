//! Maps claimed jobs onto the capture handlers. `JobKind` is matched
//! exhaustively; adding a kind will not compile until it is routed.

use async_trait::async_trait;
use eg_core::traits::{DispatchError, JobDispatcher, KnowledgeStore, VersionControlQuery};
use eg_core::types::{ConversationCapturePayload, GitCapturePayload, Job, JobKind};
use errors::CaptureError;

use crate::conversation::ConversationCaptureHandler;
use crate::git::GitCaptureHandler;

pub struct CaptureDispatcher<V, S> {
    git: GitCaptureHandler<V, S>,
    conversation: ConversationCaptureHandler<S>,
}

impl<V, S> CaptureDispatcher<V, S>
where
    V: VersionControlQuery<Error = CaptureError>,
    S: KnowledgeStore<Error = CaptureError>,
{
    pub fn new(
        git: GitCaptureHandler<V, S>,
        conversation: ConversationCaptureHandler<S>,
    ) -> Self {
        Self { git, conversation }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(job: &Job) -> Result<T, DispatchError> {
    serde_json::from_value(job.payload.clone()).map_err(|e| {
        // A payload the handler cannot read will never succeed on retry.
        DispatchError::permanent(
            CaptureError::MalformedPayload {
                kind: job.kind.to_string(),
                reason: e.to_string(),
            }
            .to_string(),
        )
    })
}

fn into_dispatch(e: CaptureError) -> DispatchError {
    if e.is_permanent() {
        DispatchError::permanent(e.to_string())
    } else {
        DispatchError::transient(e.to_string())
    }
}

#[async_trait]
impl<V, S> JobDispatcher for CaptureDispatcher<V, S>
where
    V: VersionControlQuery<Error = CaptureError> + Send + Sync,
    S: KnowledgeStore<Error = CaptureError> + Send + Sync,
{
    async fn dispatch(&self, job: &Job) -> Result<(), DispatchError> {
        match job.kind {
            JobKind::CaptureGitCommits => {
                let payload: GitCapturePayload = parse_payload(job)?;
                self.git
                    .handle(&payload)
                    .await
                    .map(|_| ())
                    .map_err(into_dispatch)
            }
            JobKind::CaptureConversation => {
                let payload: ConversationCapturePayload = parse_payload(job)?;
                self.conversation
                    .handle(&payload)
                    .await
                    .map(|_| ())
                    .map_err(into_dispatch)
            }
        }
    }
}
