//! Regex-based secret redaction applied before any content leaves the
//! process. Pure and total: input always yields usable output, and a
//! detected secret is a finding to log, never an error.

use eg_core::traits::Sanitizer;
use eg_core::types::{SanitizeOutcome, SanitizerFinding};
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

struct LabeledPattern {
    label: &'static str,
    regex: Regex,
}

pub struct SecretSanitizer {
    patterns: Vec<LabeledPattern>,
}

impl SecretSanitizer {
    pub fn new() -> Self {
        let sources: [(&str, &str); 6] = [
            ("api_key", r#"(?i)(api[_-]?key|apikey)\s*[:=]\s*['"]?[\w-]+"#),
            ("password", r#"(?i)(password|passwd|pwd)\s*[:=]\s*['"]?[^\s'"]+"#),
            ("secret", r#"(?i)(secret|token)\s*[:=]\s*['"]?[\w-]+"#),
            ("bearer_token", r#"(?i)bearer\s+[\w-]+\.[\w-]+\.[\w-]+"#),
            ("private_key", r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----"),
            ("email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
        ];

        let patterns = sources
            .iter()
            .filter_map(|(label, source)| {
                Regex::new(source).ok().map(|regex| LabeledPattern { label, regex })
            })
            .collect();

        Self { patterns }
    }

    /// Extend the built-in set with a caller-supplied pattern.
    pub fn add_pattern(&mut self, label: &'static str, pattern: &str) -> Result<(), regex::Error> {
        let regex = Regex::new(pattern)?;
        self.patterns.push(LabeledPattern { label, regex });
        Ok(())
    }
}

impl Default for SecretSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer for SecretSanitizer {
    fn sanitize(&self, text: &str) -> SanitizeOutcome {
        let mut result = text.to_string();
        let mut findings = Vec::new();

        for pattern in &self.patterns {
            let occurrences = pattern.regex.find_iter(&result).count();
            if occurrences > 0 {
                result = pattern.regex.replace_all(&result, REDACTED).to_string();
                findings.push(SanitizerFinding {
                    label: pattern.label.to_string(),
                    occurrences,
                });
            }
        }

        SanitizeOutcome {
            text: result,
            findings,
        }
    }
}
