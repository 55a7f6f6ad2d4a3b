//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! - `EG_*`: General settings (data dir)
//! - `EG_QUEUE_*`: Job store settings
//! - `EG_WORKER_*`: Background worker settings
//! - `EG_GIT_*`: Git capture settings
//! - `EG_LLM_*`: Summarization model settings

use crate::config::{Config, GitCaptureConfig, LlmConfig, QueueConfig, WorkerConfig};
use std::env;

/// Load configuration from environment variables.
///
/// Environment variables override defaults but can themselves be
/// overridden by a config file passed explicitly on the command line.
///
/// ## Environment Variables
/// - `EG_DATA_DIR`: Durable state directory (default: ".engram")
/// - `EG_QUEUE_SOFT_LIMIT`: Occupancy soft limit (default: 1000)
/// - `EG_QUEUE_MAX_ATTEMPTS`: Attempts before dead-letter (default: 3)
/// - `EG_QUEUE_BACKOFF_BASE_MS`: Exponential backoff base (default: 10000)
/// - `EG_QUEUE_CLAIM_LIMIT`: Max parallel run size (default: 4)
/// - `EG_WORKER_POOL_SIZE`: Parallel execution slots (default: 4)
/// - `EG_WORKER_POLL_INTERVAL_MS`: Idle poll interval (default: 500)
/// - `EG_WORKER_AUTO_START`: Auto-start on enqueue (default: true)
/// - `EG_WORKER_SHUTDOWN_TIMEOUT_SECONDS`: Drain timeout (default: 30)
/// - `EG_GIT_DIFF_LINE_CAP`: Per-file diff cap (default: 500)
/// - `EG_GIT_BATCH_THRESHOLD`: Commits per summary batch (default: 10)
/// - `EG_LLM_API_URL`: Chat completions endpoint
/// - `EG_LLM_API_KEY`: Bearer token (optional)
/// - `EG_LLM_MODEL`: Model name (default: "gpt-4o-mini")
/// - `EG_LLM_TIMEOUT_SECONDS`: Per-call timeout (default: 60)
pub fn load_from_env() -> Result<Config, Box<dyn std::error::Error>> {
    let defaults = Config::default();

    Ok(Config {
        data_dir: env::var("EG_DATA_DIR")
            .map(std::path::PathBuf::from)
            .unwrap_or(defaults.data_dir),
        queue: load_queue_from_env(),
        worker: load_worker_from_env(),
        git: load_git_from_env(),
        relevance: defaults.relevance,
        llm: load_llm_from_env(),
    })
}

fn load_queue_from_env() -> QueueConfig {
    let defaults = QueueConfig::default();
    QueueConfig {
        soft_limit: parse_env("EG_QUEUE_SOFT_LIMIT").unwrap_or(defaults.soft_limit),
        max_attempts: parse_env("EG_QUEUE_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
        backoff_base_ms: parse_env("EG_QUEUE_BACKOFF_BASE_MS").unwrap_or(defaults.backoff_base_ms),
        claim_limit: parse_env("EG_QUEUE_CLAIM_LIMIT").unwrap_or(defaults.claim_limit),
    }
}

fn load_worker_from_env() -> WorkerConfig {
    let defaults = WorkerConfig::default();
    WorkerConfig {
        pool_size: parse_env("EG_WORKER_POOL_SIZE").unwrap_or(defaults.pool_size),
        poll_interval_ms: parse_env("EG_WORKER_POLL_INTERVAL_MS")
            .unwrap_or(defaults.poll_interval_ms),
        auto_start: parse_env("EG_WORKER_AUTO_START").unwrap_or(defaults.auto_start),
        graceful_shutdown_timeout_seconds: parse_env("EG_WORKER_SHUTDOWN_TIMEOUT_SECONDS")
            .unwrap_or(defaults.graceful_shutdown_timeout_seconds),
    }
}

fn load_git_from_env() -> GitCaptureConfig {
    let defaults = GitCaptureConfig::default();
    GitCaptureConfig {
        diff_line_cap: parse_env("EG_GIT_DIFF_LINE_CAP").unwrap_or(defaults.diff_line_cap),
        batch_threshold: parse_env("EG_GIT_BATCH_THRESHOLD").unwrap_or(defaults.batch_threshold),
    }
}

fn load_llm_from_env() -> LlmConfig {
    let defaults = LlmConfig::default();
    LlmConfig {
        api_url: env::var("EG_LLM_API_URL").unwrap_or(defaults.api_url),
        api_key: env::var("EG_LLM_API_KEY").ok(),
        model: env::var("EG_LLM_MODEL").unwrap_or(defaults.model),
        timeout_seconds: parse_env("EG_LLM_TIMEOUT_SECONDS").unwrap_or(defaults.timeout_seconds),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_env_defaults() {
        // No EG_* vars set in the test environment for these keys.
        let config = load_from_env().unwrap();
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.worker.pool_size, 4);
    }

    #[test]
    fn test_parse_env_ignores_garbage() {
        unsafe { std::env::set_var("EG_TEST_GARBAGE", "not-a-number") };
        let parsed: Option<u64> = parse_env("EG_TEST_GARBAGE");
        assert!(parsed.is_none());
        unsafe { std::env::remove_var("EG_TEST_GARBAGE") };
    }
}
