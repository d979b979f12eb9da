//! Context assembly — working context plus recalled memories, packed into a
//! token budget for the next prompt.
//!
//! Tokens are estimated as `ceil(chars / 4)`. The working context gets
//! `context.working_share` of the budget and memories the rest; each side
//! is packed greedily in order, and anything that does not fit is dropped.

use std::fmt::Write as _;

use mneme_core::config::ContextConfig;
use mneme_core::retrieval::MemoryView;
use mneme_core::taxonomy::ContextKey;
use mneme_core::working_context::ContextItem;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::promotion::render_value;

/// Rough token count for `text`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

fn working_line(key: ContextKey, value: &Value) -> String {
    format!("- {key}: {}", render_value(value))
}

fn memory_line(memory: &MemoryView) -> String {
    format!(
        "- [{}] {} (confidence {:.2})",
        memory.memory_type, memory.content, memory.confidence
    )
}

/// Context ready to be rendered into a prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Working-context entries that fit, ordered by key.
    pub working: Vec<(ContextKey, Value)>,
    /// Recalled memories that fit, best first.
    pub memories: Vec<MemoryView>,
    /// Estimated tokens of everything kept.
    pub token_estimate: usize,
    /// Something was dropped to stay within budget.
    pub truncated: bool,
}

impl AssembledContext {
    /// Nothing to show.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.working.is_empty() && self.memories.is_empty()
    }

    /// Render as a Markdown block. Empty context renders as an empty string.
    #[must_use]
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::new();
        if !self.working.is_empty() {
            out.push_str("## Working context\n");
            for (key, value) in &self.working {
                let _ = writeln!(out, "{}", working_line(*key, value));
            }
        }
        if !self.memories.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("## Relevant memories\n");
            for memory in &self.memories {
                let _ = writeln!(out, "{}", memory_line(memory));
            }
        }
        out
    }
}

/// Packs context into a token budget.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Builder using `config` for budget, share and memory count.
    #[must_use]
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// The settings in force.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Pack `working` and `memories` into `token_budget` (or the configured
    /// default).
    #[must_use]
    pub fn assemble(
        &self,
        working: Vec<ContextItem>,
        memories: Vec<MemoryView>,
        token_budget: Option<usize>,
    ) -> AssembledContext {
        let budget = token_budget.unwrap_or(self.config.token_budget);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let working_budget = (budget as f64 * f64::from(self.config.working_share.clamp(0.0, 1.0))) as usize;
        let memory_budget = budget - working_budget.min(budget);

        let mut ctx = AssembledContext::default();

        let mut used = 0;
        for item in working {
            let cost = estimate_tokens(&working_line(item.key, &item.value));
            if used + cost <= working_budget {
                used += cost;
                ctx.working.push((item.key, item.value));
            } else {
                ctx.truncated = true;
            }
        }
        ctx.token_estimate += used;

        let mut used = 0;
        for memory in memories.into_iter().take(self.config.max_memories) {
            let cost = estimate_tokens(&memory_line(&memory));
            if used + cost <= memory_budget {
                used += cost;
                ctx.memories.push(memory);
            } else {
                ctx.truncated = true;
            }
        }
        ctx.token_estimate += used;

        tracing::debug!(
            working = ctx.working.len(),
            memories = ctx.memories.len(),
            tokens = ctx.token_estimate,
            budget,
            truncated = ctx.truncated,
            "context assembled"
        );
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mneme_core::taxonomy::MemoryType;
    use mneme_core::types::MemoryId;
    use mneme_core::working_context::{PutOptions, WorkingContext};
    use serde_json::json;

    fn view(content: &str) -> MemoryView {
        MemoryView {
            id: MemoryId::new(),
            content: content.into(),
            memory_type: MemoryType::Decision,
            confidence: 0.9,
            timestamp: Utc::now(),
        }
    }

    fn working() -> Vec<ContextItem> {
        let mut ctx = WorkingContext::default();
        ctx.put(ContextKey::Framework, json!("Phoenix"), PutOptions::tool());
        ctx.put(ContextKey::PrimaryLanguage, json!("Elixir"), PutOptions::tool());
        ctx.to_list()
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn everything_fits_in_default_budget() {
        let ctx = ContextBuilder::default().assemble(working(), vec![view("use ecto")], None);
        assert_eq!(ctx.working.len(), 2);
        assert_eq!(ctx.memories.len(), 1);
        assert!(!ctx.truncated);
        assert!(ctx.token_estimate > 0);

        let text = ctx.format_for_prompt();
        assert!(text.contains("## Working context"));
        assert!(text.contains("- framework: Phoenix"));
        assert!(text.contains("## Relevant memories"));
        assert!(text.contains("- [decision] use ecto (confidence 0.90)"));
    }

    #[test]
    fn small_budget_truncates() {
        let memories = vec![view(&"long memory ".repeat(20)), view("short")];
        let ctx = ContextBuilder::default().assemble(working(), memories, Some(20));
        assert!(ctx.truncated);
        assert!(ctx.token_estimate <= 20);
        assert!(ctx.memories.iter().all(|m| m.content == "short"));
    }

    #[test]
    fn memory_count_capped() {
        let config = ContextConfig {
            max_memories: 2,
            ..ContextConfig::default()
        };
        let memories = (0..5).map(|n| view(&format!("memory {n}"))).collect();
        let ctx = ContextBuilder::new(config).assemble(Vec::new(), memories, None);
        assert_eq!(ctx.memories.len(), 2);
        assert!(ctx.format_for_prompt().starts_with("## Relevant memories"));
    }

    #[test]
    fn empty_renders_empty() {
        let ctx = ContextBuilder::default().assemble(Vec::new(), Vec::new(), None);
        assert!(ctx.is_empty());
        assert_eq!(ctx.format_for_prompt(), "");
    }
}
