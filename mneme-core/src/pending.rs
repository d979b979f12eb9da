//! Staging area for memories that may be promoted to long-term storage.
//!
//! Two pools with different admission rules:
//!
//! - **implicit** items, keyed by id and capacity-bounded. When full, the
//!   single lowest-scored item is evicted (oldest first on ties).
//! - **agent decisions**, an ordered list bypassing scoring entirely. Score
//!   is forced to 1.0; when full the oldest decision is dropped.
//!
//! Items are only destroyed by promotion or an explicit clear.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::taxonomy::{MemoryType, SourceType, SuggestedBy};
use crate::types::clamp_to_unit;

/// Default implicit-pool capacity.
pub const DEFAULT_MAX_ITEMS: usize = 500;
/// Default agent-decision capacity.
pub const DEFAULT_MAX_AGENT_DECISIONS: usize = 100;
/// Default promotion threshold.
pub const DEFAULT_PROMOTION_THRESHOLD: f32 = 0.6;
/// Score given to implicit items that were not scored, unless the pool
/// is configured otherwise.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Identifier of a staged item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(pub Uuid);

impl PendingId {
    /// Fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PendingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A memory candidate waiting for promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    /// Staging id.
    pub id: PendingId,
    /// Memory text.
    pub content: String,
    /// Long-term type it would be stored as.
    pub memory_type: MemoryType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Provenance.
    pub source_type: SourceType,
    /// Supporting evidence snippets.
    pub evidence: Vec<String>,
    /// Why this is worth remembering.
    pub rationale: Option<String>,
    /// Who proposed it.
    pub suggested_by: SuggestedBy,
    /// Importance in `[0, 1]`. Always 1.0 for agent decisions.
    pub importance_score: f32,
    /// When it was staged.
    pub created_at: DateTime<Utc>,
    /// How often it has been touched while staged.
    pub access_count: u32,
    #[serde(default = "scored_by_default")]
    scored: bool,
}

fn scored_by_default() -> bool {
    true
}

impl PendingItem {
    /// New implicit item with default importance.
    #[must_use]
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            id: PendingId::new(),
            content: content.into(),
            memory_type,
            confidence: 0.5,
            source_type: SourceType::Agent,
            evidence: Vec::new(),
            rationale: None,
            suggested_by: SuggestedBy::Implicit,
            importance_score: DEFAULT_IMPORTANCE,
            created_at: Utc::now(),
            access_count: 0,
            scored: false,
        }
    }

    /// Whether a score was set explicitly. Unscored implicit items take the
    /// pool's default importance when staged.
    #[must_use]
    pub fn is_scored(&self) -> bool {
        self.scored
    }

    /// Set the confidence (clamped).
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = clamp_to_unit(confidence);
        self
    }

    /// Set the importance score (clamped).
    #[must_use]
    pub fn with_importance(mut self, score: f32) -> Self {
        self.importance_score = clamp_to_unit(score);
        self.scored = true;
        self
    }

    /// Set the provenance.
    #[must_use]
    pub fn with_source(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    /// Set the rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Append one evidence snippet.
    #[must_use]
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }
}

#[derive(Debug, Clone)]
struct Staged {
    seq: u64,
    item: PendingItem,
}

/// The two-pool staging area.
#[derive(Debug, Clone)]
pub struct PendingMemories {
    items: HashMap<PendingId, Staged>,
    agent_decisions: VecDeque<Staged>,
    max_items: usize,
    max_agent_decisions: usize,
    default_importance: f32,
    next_seq: u64,
}

impl Default for PendingMemories {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS, DEFAULT_MAX_AGENT_DECISIONS)
    }
}

impl PendingMemories {
    /// Create an empty staging area. Capacities below 1 are raised to 1.
    #[must_use]
    pub fn new(max_items: usize, max_agent_decisions: usize) -> Self {
        Self {
            items: HashMap::new(),
            agent_decisions: VecDeque::new(),
            max_items: max_items.max(1),
            max_agent_decisions: max_agent_decisions.max(1),
            default_importance: DEFAULT_IMPORTANCE,
            next_seq: 0,
        }
    }

    /// Score applied to implicit items staged without one (clamped).
    #[must_use]
    pub fn with_default_importance(mut self, score: f32) -> Self {
        self.default_importance = clamp_to_unit(score);
        self
    }

    /// Score applied to unscored implicit items.
    #[must_use]
    pub fn default_importance(&self) -> f32 {
        self.default_importance
    }

    fn stage(&mut self, item: PendingItem) -> Staged {
        let seq = self.next_seq;
        self.next_seq += 1;
        Staged { seq, item }
    }

    /// Stage an implicit candidate.
    ///
    /// Re-adding an existing id replaces it. Returns the item evicted to make
    /// room, if any.
    pub fn add_implicit(&mut self, mut item: PendingItem) -> Option<PendingItem> {
        item.suggested_by = SuggestedBy::Implicit;
        item.importance_score = if item.scored {
            clamp_to_unit(item.importance_score)
        } else {
            self.default_importance
        };
        item.scored = true;
        let id = item.id;
        let staged = self.stage(item);
        self.items.insert(id, staged);

        if self.items.len() <= self.max_items {
            return None;
        }
        let victim = self
            .items
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.item
                    .importance_score
                    .total_cmp(&b.item.importance_score)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(id, _)| *id)?;
        let evicted = self.items.remove(&victim).map(|s| s.item);
        if let Some(ref e) = evicted {
            tracing::debug!(id = %e.id, score = e.importance_score, "evicted staged memory");
        }
        evicted
    }

    /// Stage an agent decision. Returns the decision dropped for room, if any.
    pub fn add_agent_decision(&mut self, mut item: PendingItem) -> Option<PendingItem> {
        item.importance_score = 1.0;
        item.scored = true;
        item.suggested_by = SuggestedBy::Agent;
        let staged = self.stage(item);
        self.agent_decisions.push_back(staged);
        if self.agent_decisions.len() > self.max_agent_decisions {
            self.agent_decisions.pop_front().map(|s| s.item)
        } else {
            None
        }
    }

    /// Update an implicit item's score (clamped). Returns whether it exists.
    pub fn update_score(&mut self, id: PendingId, score: f32) -> bool {
        match self.items.get_mut(&id) {
            Some(staged) => {
                staged.item.importance_score = clamp_to_unit(score);
                true
            }
            None => false,
        }
    }

    /// Look up a staged item in either pool.
    #[must_use]
    pub fn get(&self, id: PendingId) -> Option<&PendingItem> {
        self.items.get(&id).map(|s| &s.item).or_else(|| {
            self.agent_decisions
                .iter()
                .find(|s| s.item.id == id)
                .map(|s| &s.item)
        })
    }

    /// Number of implicit items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether both pools are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.agent_decisions.is_empty()
    }

    /// Number of agent decisions.
    #[must_use]
    pub fn agent_decision_count(&self) -> usize {
        self.agent_decisions.len()
    }

    /// Items across both pools.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.items.len() + self.agent_decisions.len()
    }

    /// Implicit-pool capacity.
    #[must_use]
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Agent-decision capacity.
    #[must_use]
    pub fn max_agent_decisions(&self) -> usize {
        self.max_agent_decisions
    }

    /// Empty both pools.
    pub fn clear(&mut self) {
        self.items.clear();
        self.agent_decisions.clear();
    }

    /// Remove the listed implicit items.
    pub fn remove_implicit(&mut self, ids: &[PendingId]) {
        for id in ids {
            self.items.remove(id);
        }
    }

    /// Drop the `n` oldest agent decisions.
    pub fn drop_oldest_agent_decisions(&mut self, n: usize) {
        let n = n.min(self.agent_decisions.len());
        self.agent_decisions.drain(..n);
    }

    /// Implicit items scoring at least `threshold` plus every agent decision,
    /// by score descending, then oldest first.
    #[must_use]
    pub fn ready_for_promotion(&self, threshold: f32) -> Vec<PendingItem> {
        let mut ready: Vec<&Staged> = self
            .items
            .values()
            .filter(|s| s.item.importance_score >= threshold)
            .chain(self.agent_decisions.iter())
            .collect();
        ready.sort_by(|a, b| {
            b.item
                .importance_score
                .total_cmp(&a.item.importance_score)
                .then(a.seq.cmp(&b.seq))
        });
        ready.into_iter().map(|s| s.item.clone()).collect()
    }

    /// Remove promoted implicit ids and empty the agent-decision list.
    pub fn clear_promoted(&mut self, ids: &[PendingId]) {
        self.remove_implicit(ids);
        self.agent_decisions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn implicit(score: f32) -> PendingItem {
        PendingItem::new(format!("item {score}"), MemoryType::Fact).with_importance(score)
    }

    #[test]
    fn eviction_removes_lowest_score() {
        let mut pending = PendingMemories::new(3, 10);
        let low = implicit(0.1);
        let low_id = low.id;
        pending.add_implicit(implicit(0.9));
        pending.add_implicit(low);
        pending.add_implicit(implicit(0.5));

        let evicted = pending.add_implicit(implicit(0.7)).expect("over capacity");
        assert_eq!(evicted.id, low_id);
        assert_eq!(pending.len(), 3);
        assert!(pending.get(low_id).is_none());
    }

    #[test]
    fn eviction_tie_breaks_on_oldest() {
        let mut pending = PendingMemories::new(2, 10);
        let first = implicit(0.4);
        let first_id = first.id;
        pending.add_implicit(first);
        pending.add_implicit(implicit(0.4));
        let evicted = pending.add_implicit(implicit(0.4)).expect("over capacity");
        assert_eq!(evicted.id, first_id);
    }

    #[test]
    fn agent_decisions_forced_to_one_and_fifo() {
        let mut pending = PendingMemories::new(10, 2);
        let first = implicit(0.1);
        let first_id = first.id;
        pending.add_agent_decision(first);
        pending.add_agent_decision(implicit(0.2));
        let dropped = pending.add_agent_decision(implicit(0.3)).expect("over capacity");
        assert_eq!(dropped.id, first_id);
        assert_eq!(pending.agent_decision_count(), 2);

        for item in pending.ready_for_promotion(0.99) {
            assert!((item.importance_score - 1.0).abs() < f32::EPSILON);
            assert_eq!(item.suggested_by, SuggestedBy::Agent);
        }
    }

    #[test]
    fn ready_for_promotion_sorted_and_filtered() {
        let mut pending = PendingMemories::default();
        pending.add_implicit(implicit(0.65));
        pending.add_implicit(implicit(0.3));
        pending.add_implicit(implicit(0.95));
        pending.add_agent_decision(implicit(0.0));

        let ready = pending.ready_for_promotion(DEFAULT_PROMOTION_THRESHOLD);
        let scores: Vec<f32> = ready.iter().map(|i| i.importance_score).collect();
        assert_eq!(scores, vec![1.0, 0.95, 0.65]);
    }

    #[test]
    fn unscored_items_take_pool_default() {
        let mut pending = PendingMemories::new(10, 10).with_default_importance(0.9);
        let unscored = PendingItem::new("prefers tabs", MemoryType::Discovery);
        let scored = implicit(0.2);
        let (unscored_id, scored_id) = (unscored.id, scored.id);
        assert!(!unscored.is_scored());
        pending.add_implicit(unscored);
        pending.add_implicit(scored);

        assert_eq!(pending.get(unscored_id).map(|i| i.importance_score), Some(0.9));
        assert_eq!(pending.get(scored_id).map(|i| i.importance_score), Some(0.2));
        assert_eq!(pending.ready_for_promotion(DEFAULT_PROMOTION_THRESHOLD).len(), 1);
    }

    #[test]
    fn update_score_clamps() {
        let mut pending = PendingMemories::default();
        let item = implicit(0.2);
        let id = item.id;
        pending.add_implicit(item);
        assert!(pending.update_score(id, 4.0));
        assert_eq!(pending.get(id).map(|i| i.importance_score), Some(1.0));
        assert!(!pending.update_score(PendingId::new(), 0.5));
    }

    #[test]
    fn clear_promoted_empties_agent_list() {
        let mut pending = PendingMemories::default();
        let a = implicit(0.8);
        let b = implicit(0.8);
        let keep = b.id;
        let drop = a.id;
        pending.add_implicit(a);
        pending.add_implicit(b);
        pending.add_agent_decision(implicit(0.0));

        pending.clear_promoted(&[drop]);
        assert_eq!(pending.len(), 1);
        assert!(pending.get(keep).is_some());
        assert_eq!(pending.agent_decision_count(), 0);
    }

    #[test]
    fn drop_oldest_agent_decisions_is_partial() {
        let mut pending = PendingMemories::default();
        let old = implicit(0.0);
        let old_id = old.id;
        let young = implicit(0.0);
        let young_id = young.id;
        pending.add_agent_decision(old);
        pending.add_agent_decision(young);
        pending.drop_oldest_agent_decisions(1);
        assert!(pending.get(old_id).is_none());
        assert!(pending.get(young_id).is_some());
        pending.drop_oldest_agent_decisions(10);
        assert_eq!(pending.total_len(), 0);
    }
}
