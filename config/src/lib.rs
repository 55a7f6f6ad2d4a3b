//! # Configuration System
//!
//! Centralized configuration management for the engram capture queue.
//!
//! This crate provides:
//! - Configuration structures for the queue, worker and capture pipeline
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration validation via the `validator` crate

pub mod config;
pub mod file_loader;
pub mod loader;

pub use config::{
    Config, GitCaptureConfig, LlmConfig, QueueConfig, RelevanceConfig, WorkerConfig,
};
pub use file_loader::{load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use validator::Validate;
