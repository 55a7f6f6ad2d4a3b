//! # Engram Errors
//!
//! Error handling for the engram capture queue.
//!
//! Uses `thiserror` for structured error definitions with named fields,
//! and keeps one enum per subsystem so callers match on the failures
//! they can actually handle.

use thiserror::Error;

/// Durable job store errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Dead-letter entry not found: {id}")]
    DeadLetterNotFound { id: String },

    #[error("Persistence failed at {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("Corrupt queue state: {reason}")]
    Corrupt { reason: String },
}

/// Pending-signal store errors
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Signal append failed at {path}: {reason}")]
    Append { path: String, reason: String },

    #[error("Signal consumption failed at {path}: {reason}")]
    Consume { path: String, reason: String },
}

/// Background worker lifecycle errors
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker already stopped")]
    AlreadyStopped,

    #[error("Worker loop panicked: {reason}")]
    LoopFailed { reason: String },
}

/// Capture pipeline errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Version control query for {commit_id} failed: {reason}")]
    VersionControl { commit_id: String, reason: String },

    #[error("Malformed payload for {kind} job: {reason}")]
    MalformedPayload { kind: String, reason: String },

    #[error("Knowledge store write failed: {reason}")]
    StoreWrite { reason: String },

    #[error("Transcript unreadable at {path}: {reason}")]
    Transcript { path: String, reason: String },

    #[error("Capture metadata update failed for {scope}: {reason}")]
    Metadata { scope: String, reason: String },
}

impl CaptureError {
    /// Malformed payloads are bugs in the producer, not conditions that
    /// clear up on retry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CaptureError::MalformedPayload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::JobNotFound {
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Job not found: abc");
    }

    #[test]
    fn test_malformed_payload_is_permanent() {
        let err = CaptureError::MalformedPayload {
            kind: "capture_git_commits".to_string(),
            reason: "missing scope".to_string(),
        };
        assert!(err.is_permanent());

        let err = CaptureError::StoreWrite {
            reason: "timeout".to_string(),
        };
        assert!(!err.is_permanent());
    }
}
