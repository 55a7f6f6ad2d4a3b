//! Keyword-driven relevance pre-filter. Advisory only: it decides what
//! is worth summarizing, never what is safe to send (that is the
//! sanitizer's job).

use config::RelevanceConfig;
use eg_core::types::RelevanceCategory;
use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    Relevant(RelevanceCategory),
    Excluded,
}

pub struct RelevanceFilter {
    enabled: Vec<RelevanceCategory>,
    exclusions: Vec<Regex>,
}

impl RelevanceFilter {
    pub fn new(config: &RelevanceConfig) -> Self {
        // Noise that never carries durable knowledge: work-in-progress
        // markers, formatting-only changes, routine test churn.
        let builtin = [
            r"(?i)\bwip\b",
            r"(?i)\b(formatting|whitespace|typo)[- ]only\b",
            r"(?i)^\s*(chore|style)(\([^)]*\))?:\s*(fmt|format|lint|whitespace)",
            r"(?i)^\s*(fix|update)\s+(typo|typos)\b",
            r"(?i)\bregenerate[d]?\s+(snapshots?|fixtures?|lockfile)\b",
        ];

        let exclusions = builtin
            .iter()
            .map(|s| s.to_string())
            .chain(config.extra_exclusions.iter().cloned())
            .filter_map(|source| Regex::new(&source).ok())
            .collect();

        Self {
            enabled: config.enabled_categories.clone(),
            exclusions,
        }
    }

    /// Classify one item of capture content. Exclusions win over
    /// category matches; an item matching no enabled category is
    /// excluded as well.
    pub fn classify(&self, text: &str) -> Relevance {
        for exclusion in &self.exclusions {
            if exclusion.is_match(text) {
                debug!(pattern = exclusion.as_str(), "Content excluded from capture");
                return Relevance::Excluded;
            }
        }

        for category in &self.enabled {
            if Self::matches_category(*category, text) {
                return Relevance::Relevant(*category);
            }
        }
        Relevance::Excluded
    }

    fn matches_category(category: RelevanceCategory, text: &str) -> bool {
        let lower = text.to_lowercase();
        let keywords: &[&str] = match category {
            RelevanceCategory::DecisionRationale => &[
                "decided",
                "decision",
                "chose",
                "rationale",
                "trade-off",
                "tradeoff",
                "instead of",
                "because",
            ],
            RelevanceCategory::ArchitecturePattern => &[
                "architecture",
                "refactor",
                "restructure",
                "design",
                "pattern",
                "extract",
                "introduce",
                "module boundary",
            ],
            RelevanceCategory::BugRootCause => &[
                "root cause",
                "bug",
                "fix",
                "race",
                "regression",
                "crash",
                "leak",
                "deadlock",
            ],
            RelevanceCategory::DependencyConfig => &[
                "dependency",
                "upgrade",
                "bump",
                "migrate",
                "config",
                "version",
                "pin",
            ],
        };
        keywords.iter().any(|k| lower.contains(k))
    }
}
