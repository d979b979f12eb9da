//! Working context — the session's short-term scratchpad.
//!
//! A keyed map of what the agent currently understands about the task.
//! Every item carries access statistics so the importance scorer can decide
//! whether it deserves to outlive the session.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::taxonomy::{ContextKey, ContextSource, MemoryType, infer_memory_type};
use crate::types::clamp_to_unit;

/// Default token budget for the working context.
pub const DEFAULT_TOKEN_BUDGET: usize = 12_000;

/// Options for [`WorkingContext::put`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PutOptions {
    /// Where the value came from.
    pub source: ContextSource,
    /// Confidence in the value, clamped to `[0, 1]`.
    pub confidence: f32,
    /// Explicit long-term type. Overrides inference when set.
    pub memory_type: Option<MemoryType>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            source: ContextSource::Explicit,
            confidence: 1.0,
            memory_type: None,
        }
    }
}

impl PutOptions {
    /// Options for a tool-reported value.
    #[must_use]
    pub fn tool() -> Self {
        Self {
            source: ContextSource::Tool,
            ..Self::default()
        }
    }

    /// Options for an inferred value with the given confidence.
    #[must_use]
    pub fn inferred(confidence: f32) -> Self {
        Self {
            source: ContextSource::Inferred,
            confidence,
            memory_type: None,
        }
    }
}

/// A single working-context slot with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    /// Slot key.
    pub key: ContextKey,
    /// Current value.
    pub value: Value,
    /// Provenance of the current value.
    pub source: ContextSource,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Reads and writes so far (≥ 1).
    pub access_count: u32,
    /// When the key was first written. Never changes.
    pub first_seen: DateTime<Utc>,
    /// Last read or write.
    pub last_accessed: DateTime<Utc>,
    /// Long-term type this value would be promoted as.
    pub suggested_type: Option<MemoryType>,
}

/// The session's scratchpad.
#[derive(Debug, Clone)]
pub struct WorkingContext {
    items: HashMap<ContextKey, ContextItem>,
    token_budget: usize,
}

impl Default for WorkingContext {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_BUDGET)
    }
}

impl WorkingContext {
    /// Create an empty context with the given token budget.
    #[must_use]
    pub fn new(token_budget: usize) -> Self {
        Self {
            items: HashMap::new(),
            token_budget,
        }
    }

    /// Write `value` under `key`.
    ///
    /// Creates the item on first write; afterwards replaces value, source,
    /// confidence and suggested type while keeping `first_seen`.
    pub fn put(&mut self, key: ContextKey, value: Value, options: PutOptions) {
        self.put_at(key, value, options, Utc::now());
    }

    /// [`WorkingContext::put`] with an explicit clock.
    pub fn put_at(&mut self, key: ContextKey, value: Value, options: PutOptions, now: DateTime<Utc>) {
        let suggested_type = options
            .memory_type
            .or_else(|| infer_memory_type(key, options.source));
        let confidence = clamp_to_unit(options.confidence);

        self.items
            .entry(key)
            .and_modify(|item| {
                item.value = value.clone();
                item.source = options.source;
                item.confidence = confidence;
                item.suggested_type = suggested_type;
                item.access_count = item.access_count.saturating_add(1);
                item.last_accessed = now.max(item.first_seen);
            })
            .or_insert_with(|| ContextItem {
                key,
                value,
                source: options.source,
                confidence,
                access_count: 1,
                first_seen: now,
                last_accessed: now,
                suggested_type,
            });
    }

    /// Read `key`, counting it as an access.
    pub fn get(&mut self, key: ContextKey) -> Option<&Value> {
        let item = self.items.get_mut(&key)?;
        item.access_count = item.access_count.saturating_add(1);
        item.last_accessed = Utc::now().max(item.first_seen);
        Some(&item.value)
    }

    /// Read `key` without touching its statistics.
    #[must_use]
    pub fn peek(&self, key: ContextKey) -> Option<&Value> {
        self.items.get(&key).map(|item| &item.value)
    }

    /// Full metadata for `key`, without touching its statistics.
    #[must_use]
    pub fn get_item(&self, key: ContextKey) -> Option<&ContextItem> {
        self.items.get(&key)
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&mut self, key: ContextKey) -> bool {
        self.items.remove(&key).is_some()
    }

    /// Whether `key` is set.
    #[must_use]
    pub fn has_key(&self, key: ContextKey) -> bool {
        self.items.contains_key(&key)
    }

    /// Every item, ordered by key.
    #[must_use]
    pub fn to_list(&self) -> Vec<ContextItem> {
        let mut items: Vec<ContextItem> = self.items.values().cloned().collect();
        items.sort_by_key(|item| item.key);
        items
    }

    /// Key → value view, ordered by key.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<ContextKey, Value> {
        self.items
            .iter()
            .map(|(key, item)| (*key, item.value.clone()))
            .collect()
    }

    /// Number of set keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every item. The token budget is kept.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Configured token budget.
    #[must_use]
    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Items that carry a suggested long-term type.
    pub fn promotable(&self) -> impl Iterator<Item = &ContextItem> {
        self.items.values().filter(|item| item.suggested_type.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn first_put_initialises_metadata() {
        let mut ctx = WorkingContext::default();
        ctx.put(ContextKey::Framework, json!("axum"), PutOptions::tool());

        let item = ctx.get_item(ContextKey::Framework).expect("item present");
        assert_eq!(item.access_count, 1);
        assert_eq!(item.first_seen, item.last_accessed);
        assert_eq!(item.suggested_type, Some(MemoryType::Fact));
    }

    #[test]
    fn overwrite_preserves_first_seen() {
        let mut ctx = WorkingContext::default();
        let t0 = Utc::now() - Duration::minutes(5);
        ctx.put_at(ContextKey::CurrentTask, json!("a"), PutOptions::default(), t0);
        ctx.put(ContextKey::CurrentTask, json!("b"), PutOptions::inferred(0.4));

        let item = ctx.get_item(ContextKey::CurrentTask).expect("item present");
        assert_eq!(item.first_seen, t0);
        assert!(item.last_accessed >= item.first_seen);
        assert_eq!(item.access_count, 2);
        assert_eq!(item.value, json!("b"));
        assert_eq!(item.source, ContextSource::Inferred);
    }

    #[test]
    fn peek_does_not_count_get_does() {
        let mut ctx = WorkingContext::default();
        ctx.put(ContextKey::ActiveFile, json!("src/main.rs"), PutOptions::default());

        assert_eq!(ctx.peek(ContextKey::ActiveFile), Some(&json!("src/main.rs")));
        assert_eq!(ctx.get_item(ContextKey::ActiveFile).map(|i| i.access_count), Some(1));

        assert!(ctx.get(ContextKey::ActiveFile).is_some());
        assert_eq!(ctx.get_item(ContextKey::ActiveFile).map(|i| i.access_count), Some(2));
    }

    #[test]
    fn explicit_type_overrides_inference() {
        let mut ctx = WorkingContext::default();
        let options = PutOptions {
            memory_type: Some(MemoryType::Risk),
            ..PutOptions::tool()
        };
        ctx.put(ContextKey::Framework, json!("beta"), options);
        assert_eq!(
            ctx.get_item(ContextKey::Framework).and_then(|i| i.suggested_type),
            Some(MemoryType::Risk)
        );
    }

    #[test]
    fn confidence_is_clamped() {
        let mut ctx = WorkingContext::default();
        ctx.put(ContextKey::UserIntent, json!("ship"), PutOptions::inferred(3.0));
        assert_eq!(ctx.get_item(ContextKey::UserIntent).map(|i| i.confidence), Some(1.0));
    }

    #[test]
    fn clear_keeps_budget_and_delete_reports() {
        let mut ctx = WorkingContext::new(500);
        ctx.put(ContextKey::Framework, json!("x"), PutOptions::default());
        assert!(ctx.has_key(ContextKey::Framework));
        assert!(ctx.delete(ContextKey::Framework));
        assert!(!ctx.delete(ContextKey::Framework));
        ctx.put(ContextKey::ActiveFile, json!("y"), PutOptions::default());
        ctx.clear();
        assert!(ctx.is_empty());
        assert_eq!(ctx.token_budget(), 500);
    }

    #[test]
    fn list_and_map_are_key_ordered() {
        let mut ctx = WorkingContext::default();
        ctx.put(ContextKey::ConversationSummary, json!("s"), PutOptions::default());
        ctx.put(ContextKey::ActiveFile, json!("f"), PutOptions::default());
        let keys: Vec<_> = ctx.to_list().into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec![ContextKey::ActiveFile, ContextKey::ConversationSummary]);
        assert_eq!(ctx.to_map().len(), 2);
    }
}
