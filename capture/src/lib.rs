//! Knowledge-capture pipeline: relevance filtering, secret redaction,
//! summarization, and the git/conversation handlers the background
//! worker dispatches into.

pub mod conversation;
pub mod dispatcher;
pub mod git;
pub mod knowledge;
pub mod llm;
pub mod metadata;
pub mod relevance;
pub mod sanitizer;
pub mod service;
pub mod summarizer;

pub use conversation::ConversationCaptureHandler;
pub use dispatcher::CaptureDispatcher;
pub use git::{Git2VersionControl, GitCaptureHandler};
pub use knowledge::FileKnowledgeStore;
pub use llm::{MockLlmService, OpenAiLlmService};
pub use metadata::CaptureMetadataStore;
pub use relevance::{Relevance, RelevanceFilter};
pub use sanitizer::SecretSanitizer;
pub use service::CaptureService;
pub use summarizer::Summarizer;
