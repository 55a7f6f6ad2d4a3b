//! Summarization step with a deterministic degradation path. A model
//! outage degrades the quality of a capture, never its delivery.

use std::sync::Arc;

use eg_core::traits::LlmService;
use eg_core::types::Summary;
use tracing::{info, instrument, warn};

/// Joins items in the concatenation fallback.
const FALLBACK_DELIMITER: &str = "\n\n---\n\n";

pub struct Summarizer {
    llm: Arc<dyn LlmService>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    /// Summarize a batch of already-sanitized items. Items must have
    /// passed the sanitizer before reaching this point.
    #[instrument(skip_all, fields(item_count = items.len()))]
    pub async fn summarize(&self, items: &[String], instructions: &str) -> Summary {
        if items.is_empty() {
            return Summary {
                text: String::new(),
                item_count: 0,
                used_fallback: false,
            };
        }

        let prompt = build_prompt(items, instructions);
        match self.llm.chat(&prompt).await {
            Ok(text) => Summary {
                text,
                item_count: items.len(),
                used_fallback: false,
            },
            Err(e) => {
                if e.is_unavailable() {
                    info!(error = %e, "Model unavailable, using concatenation fallback");
                } else {
                    warn!(error = %e, "Model request failed, using concatenation fallback");
                }
                Summary {
                    text: items.join(FALLBACK_DELIMITER),
                    item_count: items.len(),
                    used_fallback: true,
                }
            }
        }
    }
}

fn build_prompt(items: &[String], instructions: &str) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str(
        "Summarize the following development activity into durable project \
         knowledge. Focus on: decision rationale, architecture patterns, bug \
         root causes, and dependency or configuration changes. Merge related \
         items into a single coherent note and drop duplicated content instead \
         of repeating it.\n",
    );
    if !instructions.is_empty() {
        prompt.push_str(instructions);
        prompt.push('\n');
    }
    prompt.push('\n');
    for (i, item) in items.iter().enumerate() {
        prompt.push_str(&format!("### Item {}\n{}\n\n", i + 1, item));
    }
    prompt
}
