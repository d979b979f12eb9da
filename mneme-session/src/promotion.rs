//! Promotion Engine — moves staged candidates into the long-term store.
//!
//! A run takes a snapshot of everything ready for promotion:
//!
//! 1. Implicit staged items scoring at or above the threshold.
//! 2. Every staged agent decision (score forced to 1.0).
//! 3. Working-context items with a suggested type whose importance clears
//!    the threshold, unless the same `(key, value)` was promoted before.
//!
//! Candidates are ordered by score (stable, so staging order breaks ties),
//! capped at `max_promotions_per_run`, and persisted one by one. A failed
//! write is logged and counted; the run carries on.
//!
//! Clearing rules:
//! - implicit items leave staging only if their write succeeded,
//! - agent decisions attempted in this run are dropped whether or not the
//!   write succeeded (no partial retry),
//! - agent decisions beyond the cap stay staged for the next run.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mneme_core::config::PromotionConfig;
use mneme_core::pending::{PendingId, PendingItem};
use mneme_core::scoring::ImportanceScorer;
use mneme_core::store::{LongTermStore, NewMemory};
use mneme_core::taxonomy::{ContextKey, ContextSource, SourceType, SuggestedBy};
use mneme_core::types::{MemoryId, SessionId};
use mneme_core::working_context::ContextItem;
use serde::{Deserialize, Serialize};

use crate::state::SessionState;

// ---------------------------------------------------------------------------
// Triggers & Reports
// ---------------------------------------------------------------------------

/// What started a promotion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionTrigger {
    /// Periodic actor tick.
    Scheduled,
    /// The implicit staging pool reached capacity.
    MemoryLimitReached,
    /// The agent staged an explicit decision.
    AgentDecision,
    /// The session was paused.
    SessionPause,
    /// The session is shutting down.
    SessionClose,
    /// A caller asked for a run.
    ExplicitRequest,
}

impl PromotionTrigger {
    /// Snake-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::MemoryLimitReached => "memory_limit_reached",
            Self::AgentDecision => "agent_decision",
            Self::SessionPause => "session_pause",
            Self::SessionClose => "session_close",
            Self::ExplicitRequest => "explicit_request",
        }
    }

    /// Fired by the pipeline itself rather than by a caller. Automatic runs
    /// with nothing to do are not reported.
    #[must_use]
    pub fn is_automatic(self) -> bool {
        matches!(self, Self::Scheduled | Self::MemoryLimitReached)
    }
}

impl fmt::Display for PromotionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one promotion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionReport {
    /// What started the run.
    pub trigger: PromotionTrigger,
    /// Ids of the memories written, in promotion order.
    pub memory_ids: Vec<MemoryId>,
    /// Candidates attempted this run.
    pub attempted: usize,
    /// Attempts whose write failed.
    pub failures: usize,
    /// Ready candidates left for a later run by the per-run cap.
    pub deferred: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl PromotionReport {
    /// Number of memories written.
    #[must_use]
    pub fn promoted(&self) -> usize {
        self.memory_ids.len()
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

enum Origin {
    Implicit(PendingId),
    AgentDecision,
    Context(ContextKey, String),
}

struct Candidate {
    score: f32,
    memory: NewMemory,
    origin: Origin,
}

impl Candidate {
    fn staged(session_id: &SessionId, item: PendingItem) -> Self {
        let origin = match item.suggested_by {
            SuggestedBy::Agent => Origin::AgentDecision,
            SuggestedBy::Implicit => Origin::Implicit(item.id),
        };
        Self {
            score: item.importance_score,
            memory: NewMemory {
                session_id: session_id.clone(),
                content: item.content,
                memory_type: item.memory_type,
                confidence: item.confidence,
                source_type: item.source_type,
                evidence: item.evidence,
                rationale: item.rationale,
            },
            origin,
        }
    }

    fn context(session_id: &SessionId, item: &ContextItem, rendered: String, score: f32) -> Option<Self> {
        let memory_type = item.suggested_type?;
        let source_type = match item.source {
            ContextSource::Tool => SourceType::Tool,
            ContextSource::Explicit | ContextSource::Inferred => SourceType::Agent,
        };
        Some(Self {
            score,
            memory: NewMemory {
                session_id: session_id.clone(),
                content: format!("{}: {rendered}", item.key),
                memory_type,
                confidence: item.confidence,
                source_type,
                evidence: vec![format!("working_context.{}", item.key)],
                rationale: Some(format!("working-context importance {score:.2}")),
            },
            origin: Origin::Context(item.key, rendered),
        })
    }
}

/// Text form of a context value: strings verbatim, anything else as JSON.
#[must_use]
pub fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies the promotion policy to a session's state.
#[derive(Debug, Clone)]
pub struct PromotionEngine {
    config: PromotionConfig,
    scorer: ImportanceScorer,
}

impl Default for PromotionEngine {
    fn default() -> Self {
        Self::new(PromotionConfig::default())
    }
}

impl PromotionEngine {
    /// Engine for the given policy.
    #[must_use]
    pub fn new(config: PromotionConfig) -> Self {
        let scorer = ImportanceScorer::new(config.weights.clone());
        Self { config, scorer }
    }

    /// The policy in force.
    #[must_use]
    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Run once against `state`, writing to `store`.
    pub fn run(
        &self,
        session_id: &SessionId,
        state: &mut SessionState,
        store: &dyn LongTermStore,
        trigger: PromotionTrigger,
    ) -> PromotionReport {
        self.run_at(session_id, state, store, trigger, Utc::now())
    }

    /// [`PromotionEngine::run`] with an explicit clock for importance scoring.
    pub fn run_at(
        &self,
        session_id: &SessionId,
        state: &mut SessionState,
        store: &dyn LongTermStore,
        trigger: PromotionTrigger,
        now: DateTime<Utc>,
    ) -> PromotionReport {
        self.plan(session_id, state, trigger, now)
            .persist(store)
            .apply(state)
    }

    /// Select and order this run's candidates without writing anything.
    ///
    /// The batch must be persisted and applied back to the same, unchanged
    /// state; the session actor guarantees this by handling nothing else
    /// until the run completes.
    #[must_use]
    pub fn plan(
        &self,
        session_id: &SessionId,
        state: &SessionState,
        trigger: PromotionTrigger,
        now: DateTime<Utc>,
    ) -> PromotionBatch {
        let started = Instant::now();

        let mut candidates: Vec<Candidate> = state
            .pending
            .ready_for_promotion(self.config.threshold)
            .into_iter()
            .map(|item| Candidate::staged(session_id, item))
            .collect();
        if self.config.include_working_context {
            candidates.extend(self.context_candidates(session_id, state, now));
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let ready = candidates.len();
        candidates.truncate(self.config.max_promotions_per_run);

        PromotionBatch {
            session_id: session_id.clone(),
            trigger,
            candidates,
            ready,
            started,
        }
    }

    fn context_candidates(
        &self,
        session_id: &SessionId,
        state: &SessionState,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        state
            .context
            .promotable()
            .filter_map(|item| {
                let rendered = render_value(&item.value);
                if state.promoted_context.contains(&(item.key, rendered.clone())) {
                    return None;
                }
                let score = self.scorer.score_context_item(item, now);
                if score < self.config.threshold {
                    return None;
                }
                Candidate::context(session_id, item, rendered, score)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Candidates chosen for one run, not yet written.
///
/// Owns everything it needs, so [`PromotionBatch::persist`] can run on a
/// blocking thread away from the session state.
pub struct PromotionBatch {
    session_id: SessionId,
    trigger: PromotionTrigger,
    candidates: Vec<Candidate>,
    ready: usize,
    started: Instant,
}

impl fmt::Debug for PromotionBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromotionBatch")
            .field("session_id", &self.session_id)
            .field("trigger", &self.trigger)
            .field("attempting", &self.candidates.len())
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

impl PromotionBatch {
    /// What started the run.
    #[must_use]
    pub fn trigger(&self) -> PromotionTrigger {
        self.trigger
    }

    /// Candidates this run will attempt.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Ready candidates left for a later run by the per-run cap.
    #[must_use]
    pub fn deferred(&self) -> usize {
        self.ready - self.candidates.len()
    }

    /// Write every candidate. A failed write is logged and counted; the rest
    /// still go through.
    #[must_use]
    pub fn persist(self, store: &dyn LongTermStore) -> PersistedBatch {
        let attempted = self.candidates.len();
        let mut out = PersistedBatch {
            trigger: self.trigger,
            memory_ids: Vec::with_capacity(attempted),
            persisted_implicit: Vec::new(),
            promoted_context: Vec::new(),
            attempted,
            attempted_agent: 0,
            failures: 0,
            deferred: self.ready - attempted,
            started: self.started,
            session_id: self.session_id,
        };

        for Candidate { memory, origin, .. } in self.candidates {
            if matches!(origin, Origin::AgentDecision) {
                out.attempted_agent += 1;
            }
            let memory_type = memory.memory_type;
            match store.persist(memory) {
                Ok(id) => {
                    out.memory_ids.push(id);
                    match origin {
                        Origin::Implicit(pending_id) => out.persisted_implicit.push(pending_id),
                        Origin::Context(key, rendered) => out.promoted_context.push((key, rendered)),
                        Origin::AgentDecision => {}
                    }
                }
                Err(err) => {
                    out.failures += 1;
                    tracing::warn!(
                        session = %out.session_id,
                        trigger = out.trigger.as_str(),
                        memory_type = memory_type.as_str(),
                        error = %err,
                        "promotion write failed"
                    );
                }
            }
        }
        out
    }
}

/// Outcome of [`PromotionBatch::persist`], to be applied back to the state.
#[derive(Debug)]
pub struct PersistedBatch {
    session_id: SessionId,
    trigger: PromotionTrigger,
    memory_ids: Vec<MemoryId>,
    persisted_implicit: Vec<PendingId>,
    promoted_context: Vec<(ContextKey, String)>,
    attempted: usize,
    attempted_agent: usize,
    failures: usize,
    deferred: usize,
    started: Instant,
}

impl PersistedBatch {
    /// Clear what was written from staging and produce the report.
    ///
    /// Implicit items leave only if their write succeeded; every attempted
    /// agent decision is dropped.
    pub fn apply(self, state: &mut SessionState) -> PromotionReport {
        state.promoted_context.extend(self.promoted_context);
        if self.attempted_agent >= state.pending.agent_decision_count() {
            state.pending.clear_promoted(&self.persisted_implicit);
        } else {
            state.pending.remove_implicit(&self.persisted_implicit);
            state.pending.drop_oldest_agent_decisions(self.attempted_agent);
        }

        let report = PromotionReport {
            trigger: self.trigger,
            memory_ids: self.memory_ids,
            attempted: self.attempted,
            failures: self.failures,
            deferred: self.deferred,
            duration: self.started.elapsed(),
        };
        tracing::debug!(
            session = %self.session_id,
            trigger = self.trigger.as_str(),
            attempted = report.attempted,
            promoted = report.promoted(),
            failures = report.failures,
            deferred = report.deferred,
            elapsed_us = report.duration.as_micros(),
            "promotion run"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mneme_core::store::{InMemoryStore, PersistedMemory, QueryOptions, StoreError};
    use mneme_core::taxonomy::MemoryType;
    use mneme_core::working_context::PutOptions;
    use serde_json::json;

    /// Store that rejects every write.
    struct FailingStore;

    impl LongTermStore for FailingStore {
        fn persist(&self, _memory: NewMemory) -> Result<MemoryId, StoreError> {
            Err(StoreError::StorageFailure("disk full".into()))
        }
        fn query(&self, _: &SessionId, _: QueryOptions) -> Result<Vec<PersistedMemory>, StoreError> {
            Ok(Vec::new())
        }
        fn query_by_type(
            &self,
            _: &SessionId,
            _: MemoryType,
            _: QueryOptions,
        ) -> Result<Vec<PersistedMemory>, StoreError> {
            Ok(Vec::new())
        }
        fn get(&self, _: &SessionId, id: MemoryId) -> Result<PersistedMemory, StoreError> {
            Err(StoreError::NotFound(id))
        }
        fn supersede(&self, _: &SessionId, id: MemoryId, _: Option<MemoryId>) -> Result<(), StoreError> {
            Err(StoreError::NotFound(id))
        }
        fn record_access(&self, _: &SessionId, _: MemoryId) -> Result<(), StoreError> {
            Ok(())
        }
        fn count(&self, _: &SessionId) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    fn session() -> SessionId {
        SessionId::parse("promotion-test").expect("valid id")
    }

    fn engine_with(adjust: impl FnOnce(&mut PromotionConfig)) -> PromotionEngine {
        let mut config = PromotionConfig::default();
        adjust(&mut config);
        PromotionEngine::new(config)
    }

    #[test]
    fn persists_only_qualifying_implicit_items() {
        let engine = engine_with(|c| c.include_working_context = false);
        let store = InMemoryStore::default();
        let mut state = SessionState::default();
        let high = PendingItem::new("uses postgres 16", MemoryType::Fact).with_importance(0.9);
        let low = PendingItem::new("opened a file", MemoryType::Fact).with_importance(0.2);
        let (high_id, low_id) = (high.id, low.id);
        state.pending.add_implicit(high);
        state.pending.add_implicit(low);

        let report = engine.run(&session(), &mut state, &store, PromotionTrigger::ExplicitRequest);
        assert_eq!(report.promoted(), 1);
        assert_eq!(report.failures, 0);
        assert!(state.pending.get(high_id).is_none());
        assert!(state.pending.get(low_id).is_some());
        assert_eq!(store.count(&session()).expect("count"), 1);
    }

    #[test]
    fn failed_writes_keep_implicit_items_and_drop_agent_decisions() {
        let engine = engine_with(|c| c.include_working_context = false);
        let mut state = SessionState::default();
        let implicit = PendingItem::new("tests run with nextest", MemoryType::Fact).with_importance(0.8);
        let implicit_id = implicit.id;
        state.pending.add_implicit(implicit);
        state
            .pending
            .add_agent_decision(PendingItem::new("use sqlx over diesel", MemoryType::Decision));

        let report = engine.run(&session(), &mut state, &FailingStore, PromotionTrigger::Scheduled);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failures, 2);
        assert!(report.memory_ids.is_empty());
        assert!(state.pending.get(implicit_id).is_some(), "failed implicit item stays staged");
        assert_eq!(state.pending.agent_decision_count(), 0, "attempted agent decisions are dropped");
    }

    #[test]
    fn agent_decisions_beyond_cap_stay_staged() {
        let engine = engine_with(|c| {
            c.include_working_context = false;
            c.max_promotions_per_run = 2;
        });
        let store = InMemoryStore::default();
        let mut state = SessionState::default();
        for n in 0..3 {
            state
                .pending
                .add_agent_decision(PendingItem::new(format!("decision {n}"), MemoryType::Decision));
        }

        let report = engine.run(&session(), &mut state, &store, PromotionTrigger::AgentDecision);
        assert_eq!(report.promoted(), 2);
        assert_eq!(report.deferred, 1);
        assert_eq!(state.pending.agent_decision_count(), 1);

        let left = state.pending.ready_for_promotion(0.6);
        assert_eq!(left[0].content, "decision 2", "oldest decisions go first");

        let report = engine.run(&session(), &mut state, &store, PromotionTrigger::AgentDecision);
        assert_eq!(report.promoted(), 1);
        assert_eq!(state.pending.agent_decision_count(), 0);
    }

    #[test]
    fn working_context_promoted_once_per_value() {
        let engine = PromotionEngine::default();
        let store = InMemoryStore::default();
        let mut state = SessionState::default();
        state
            .context
            .put(ContextKey::Framework, json!("Phoenix"), PutOptions::tool());
        state.context.get(ContextKey::Framework);
        state.context.get(ContextKey::Framework);

        let report = engine.run(&session(), &mut state, &store, PromotionTrigger::ExplicitRequest);
        assert_eq!(report.promoted(), 1);
        let stored = store.get(&session(), report.memory_ids[0]).expect("stored");
        assert_eq!(stored.content, "framework: Phoenix");
        assert_eq!(stored.memory_type, MemoryType::Fact);
        assert_eq!(stored.source_type, SourceType::Tool);

        let again = engine.run(&session(), &mut state, &store, PromotionTrigger::ExplicitRequest);
        assert_eq!(again.promoted(), 0, "same (key, value) is not promoted twice");

        state
            .context
            .put(ContextKey::Framework, json!("Axum"), PutOptions::tool());
        state.context.get(ContextKey::Framework);
        let changed = engine.run(&session(), &mut state, &store, PromotionTrigger::ExplicitRequest);
        assert_eq!(changed.promoted(), 1);
    }

    #[test]
    fn fresh_context_item_below_threshold() {
        let engine = PromotionEngine::default();
        let store = InMemoryStore::default();
        let mut state = SessionState::default();
        state
            .context
            .put(ContextKey::Framework, json!("Phoenix"), PutOptions::tool());

        let report = engine.run(&session(), &mut state, &store, PromotionTrigger::Scheduled);
        assert_eq!(report.attempted, 0);
    }

    #[test]
    fn plan_writes_nothing_until_persisted() {
        let engine = engine_with(|c| c.include_working_context = false);
        let store = InMemoryStore::default();
        let mut state = SessionState::default();
        state
            .pending
            .add_implicit(PendingItem::new("ci runs on every push", MemoryType::Fact).with_importance(0.9));
        state
            .pending
            .add_agent_decision(PendingItem::new("vendor openssl", MemoryType::Decision));

        let batch = engine.plan(&session(), &state, PromotionTrigger::ExplicitRequest, Utc::now());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.deferred(), 0);
        assert_eq!(store.count(&session()).expect("count"), 0);
        assert_eq!(state.pending.len(), 1, "planning leaves staging untouched");

        let report = batch.persist(&store).apply(&mut state);
        assert_eq!(report.promoted(), 2);
        assert_eq!(store.count(&session()).expect("count"), 2);
        assert!(state.pending.is_empty());
    }

    #[test]
    fn render_value_forms() {
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&json!(["a", "b"])), r#"["a","b"]"#);
        assert_eq!(render_value(&json!(3)), "3");
    }

    #[test]
    fn trigger_names() {
        assert_eq!(PromotionTrigger::MemoryLimitReached.as_str(), "memory_limit_reached");
        assert!(PromotionTrigger::Scheduled.is_automatic());
        assert!(!PromotionTrigger::SessionClose.is_automatic());
    }
}
