use eg_core::types::RelevanceCategory;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Root configuration for the capture queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct Config {
    /// Directory holding the durable job collections, signal files and
    /// capture metadata.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,

    #[serde(default)]
    #[validate(nested)]
    pub worker: WorkerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub git: GitCaptureConfig,

    #[serde(default)]
    #[validate(nested)]
    pub relevance: RelevanceConfig,

    #[serde(default)]
    #[validate(nested)]
    pub llm: LlmConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".engram")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            git: GitCaptureConfig::default(),
            relevance: RelevanceConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct QueueConfig {
    /// Soft occupancy limit; crossing 80%/100% only logs a warning,
    /// enqueue never rejects.
    #[serde(default = "default_soft_limit")]
    #[validate(range(min = 10, max = 1_000_000))]
    pub soft_limit: usize,

    /// Attempts after which a job is dead-lettered.
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    /// Base of the exponential backoff: delay = base * 2^(attempts-1).
    #[serde(default = "default_backoff_base_ms")]
    #[validate(range(min = 1, max = 3_600_000))]
    pub backoff_base_ms: u64,

    /// Upper bound on the size of one claimed parallel run.
    #[serde(default = "default_claim_limit")]
    #[validate(range(min = 1, max = 64))]
    pub claim_limit: usize,
}

fn default_soft_limit() -> usize {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    10_000
}

fn default_claim_limit() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            soft_limit: default_soft_limit(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            claim_limit: default_claim_limit(),
        }
    }
}

impl QueueConfig {
    /// Backoff before retry attempt `n` (1-based): 10, 20, 40 units for
    /// the default base.
    pub fn backoff_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let exp = attempt.saturating_sub(1).min(16);
        std::time::Duration::from_millis(self.backoff_base_ms.saturating_mul(1 << exp))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct WorkerConfig {
    /// Bounded pool for executing one parallel batch.
    #[serde(default = "default_pool_size")]
    #[validate(range(min = 1, max = 32))]
    pub pool_size: usize,

    /// Idle poll interval while waiting for claimable work.
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 10, max = 60_000))]
    pub poll_interval_ms: u64,

    /// Start the worker whenever the store goes empty -> non-empty.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    #[serde(default = "default_shutdown_timeout_seconds")]
    #[validate(range(min = 1, max = 300))]
    pub graceful_shutdown_timeout_seconds: u64,
}

fn default_pool_size() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_auto_start() -> bool {
    true
}

fn default_shutdown_timeout_seconds() -> u64 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            poll_interval_ms: default_poll_interval_ms(),
            auto_start: default_auto_start(),
            graceful_shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct GitCaptureConfig {
    /// Per-file diff line cap; longer diffs keep their head and carry an
    /// explicit truncation marker.
    #[serde(default = "default_diff_line_cap")]
    #[validate(range(min = 10, max = 100_000))]
    pub diff_line_cap: usize,

    /// Commits accumulated before a batch is summarized.
    #[serde(default = "default_batch_threshold")]
    #[validate(range(min = 1, max = 1000))]
    pub batch_threshold: usize,
}

fn default_diff_line_cap() -> usize {
    500
}

fn default_batch_threshold() -> usize {
    10
}

impl Default for GitCaptureConfig {
    fn default() -> Self {
        Self {
            diff_line_cap: default_diff_line_cap(),
            batch_threshold: default_batch_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RelevanceConfig {
    /// Categories considered capture-worthy. All four are on by default.
    #[serde(default = "default_enabled_categories")]
    pub enabled_categories: Vec<RelevanceCategory>,

    /// Additional exclusion regexes on top of the built-in noise set.
    #[serde(default)]
    pub extra_exclusions: Vec<String>,
}

fn default_enabled_categories() -> Vec<RelevanceCategory> {
    RelevanceCategory::ALL.to_vec()
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            enabled_categories: default_enabled_categories(),
            extra_exclusions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout_seconds")]
    #[validate(range(min = 1, max = 600))]
    pub timeout_seconds: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout_seconds() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            timeout_seconds: default_llm_timeout_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.backoff_base_ms, 10_000);
        assert_eq!(config.worker.pool_size, 4);
        assert_eq!(config.git.diff_line_cap, 500);
        assert_eq!(config.git.batch_threshold, 10);
        assert_eq!(config.relevance.enabled_categories.len(), 4);
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let queue = QueueConfig {
            backoff_base_ms: 10,
            ..Default::default()
        };
        assert_eq!(queue.backoff_for_attempt(1).as_millis(), 10);
        assert_eq!(queue.backoff_for_attempt(2).as_millis(), 20);
        assert_eq!(queue.backoff_for_attempt(3).as_millis(), 40);
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let queue = QueueConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(queue.validate().is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }
}
