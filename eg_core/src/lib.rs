//! # Engram Core
//!
//! Shared types and traits for the engram knowledge-capture queue.
//!
//! This crate provides:
//! - Job, dead-letter and queue-health type definitions
//! - Capture payload and metadata types
//! - Core traits for the external collaborators (knowledge store,
//!   LLM chat, sanitizer, version-control query)
//! - The dispatch seam between the background worker and the
//!   capture pipeline

pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use traits::{
    DispatchError, JobDispatcher, KnowledgeStore, LlmError, LlmService, Sanitizer,
    VersionControlQuery,
};
pub use types::{
    DeadLetterEntry, ExecutionMode, HealthLevel, Job, JobKind, JobStatus, QueueStats, ScopeRef,
};
