//! Integration Tests — end-to-end flows through the synchronous core.
//!
//! Working context → staging → long-term store → ranked recall, against both
//! store backends.

use chrono::Utc;
use serde_json::json;

use mneme_core::access_log::{AccessLog, AccessType};
use mneme_core::config::{MnemeConfig, StoreConfig};
use mneme_core::embedding::TfIdfEmbedder;
use mneme_core::pending::{PendingItem, PendingMemories};
use mneme_core::retrieval::{MemoryView, RetrievalEngine, SearchMode};
use mneme_core::scoring::ImportanceScorer;
use mneme_core::store::{
    InMemoryStore, LongTermStore, NewMemory, QueryOptions, SqliteStore, open_store,
};
use mneme_core::taxonomy::{ContextKey, MemoryType, SourceType};
use mneme_core::types::SessionId;
use mneme_core::working_context::{PutOptions, WorkingContext};

fn session(name: &str) -> SessionId {
    SessionId::parse(name).expect("valid session id")
}

fn stage_to_store(store: &dyn LongTermStore, session_id: &SessionId, item: &PendingItem) -> bool {
    store
        .persist(NewMemory {
            session_id: session_id.clone(),
            content: item.content.clone(),
            memory_type: item.memory_type,
            confidence: item.confidence,
            source_type: item.source_type,
            evidence: item.evidence.clone(),
            rationale: item.rationale.clone(),
        })
        .is_ok()
}

// ---------------------------------------------------------------------------
// Working context → importance → staging → store → recall
// ---------------------------------------------------------------------------

#[test]
fn context_to_recall_lifecycle() {
    let s = session("lifecycle-1");
    let mut ctx = WorkingContext::default();
    let mut log = AccessLog::default();
    let scorer = ImportanceScorer::default();

    ctx.put(ContextKey::Framework, json!("Phoenix LiveView"), PutOptions::tool());
    log.record(ContextKey::Framework, AccessType::Write);
    for _ in 0..9 {
        assert!(ctx.get(ContextKey::Framework).is_some());
        log.record(ContextKey::Framework, AccessType::Read);
    }
    assert_eq!(log.frequency(ContextKey::Framework), 10);

    let item = ctx.get_item(ContextKey::Framework).expect("framework set");
    let score = scorer.score_context_item(item, Utc::now());
    assert!(score >= 0.6, "frequently read tool fact should qualify, got {score}");

    let mut pending = PendingMemories::default();
    let staged = PendingItem::new("Project uses Phoenix LiveView", MemoryType::Fact)
        .with_confidence(item.confidence)
        .with_source(SourceType::Tool)
        .with_importance(score);
    let staged_id = staged.id;
    pending.add_implicit(staged);

    let store = InMemoryStore::default();
    let ready = pending.ready_for_promotion(0.6);
    let persisted: Vec<_> = ready
        .iter()
        .filter(|i| stage_to_store(&store, &s, i))
        .map(|i| i.id)
        .collect();
    pending.clear_promoted(&persisted);
    assert!(pending.get(staged_id).is_none());

    let engine = RetrievalEngine::default();
    let embedder = TfIdfEmbedder::default();
    let candidates = store.query(&s, QueryOptions::default()).expect("query");
    let hits = engine
        .rank(SearchMode::Hybrid, Some("phoenix"), candidates, 5, &embedder)
        .hits;
    assert_eq!(hits.len(), 1);
    let view = MemoryView::from(&hits[0].memory);
    assert_eq!(view.memory_type, MemoryType::Fact);
    assert_eq!(view.content, "Project uses Phoenix LiveView");
}

// ---------------------------------------------------------------------------
// Supersede excludes from recall on both backends
// ---------------------------------------------------------------------------

fn supersede_round_trip(store: &dyn LongTermStore) {
    let s = session("supersede");
    let id = store
        .persist(NewMemory {
            session_id: s.clone(),
            content: "Deploys go through the staging cluster".into(),
            memory_type: MemoryType::ProcessConvention,
            confidence: 0.9,
            source_type: SourceType::User,
            evidence: vec!["runbook".into()],
            rationale: None,
        })
        .expect("persist");

    let engine = RetrievalEngine::default();
    let embedder = TfIdfEmbedder::default();
    let before = engine.rank(
        SearchMode::Text,
        Some("staging"),
        store.query(&s, QueryOptions::default()).expect("query"),
        10,
        &embedder,
    );
    assert_eq!(before.hits.len(), 1);

    store.supersede(&s, id, None).expect("supersede");
    store.supersede(&s, id, None).expect("supersede is idempotent");

    let after = engine.rank(
        SearchMode::Text,
        Some("staging"),
        store.query(&s, QueryOptions::default()).expect("query"),
        10,
        &embedder,
    );
    assert!(after.hits.is_empty());
    assert!(store.get(&s, id).expect("still retained").superseded);
}

#[test]
fn supersede_in_memory() {
    supersede_round_trip(&InMemoryStore::default());
}

#[test]
fn supersede_sqlite() {
    let store = SqliteStore::open_in_memory(100).expect("open");
    supersede_round_trip(&store);
}

// ---------------------------------------------------------------------------
// Store construction from config
// ---------------------------------------------------------------------------

#[test]
fn open_store_from_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sessions.db");
    let toml = format!(
        "[store]\nbackend = \"sqlite\"\npath = \"{}\"\nmax_memories_per_session = 3\n",
        path.display().to_string().replace('\\', "/")
    );
    let config = MnemeConfig::from_toml(&toml).expect("config");
    let store = open_store(&config.store).expect("open");
    let s = session("cfg");
    for n in 0..3 {
        store
            .persist(NewMemory {
                session_id: s.clone(),
                content: format!("memory {n}"),
                memory_type: MemoryType::Fact,
                confidence: 0.7,
                source_type: SourceType::Agent,
                evidence: vec![],
                rationale: None,
            })
            .expect("persist");
    }
    assert!(store
        .persist(NewMemory {
            session_id: s.clone(),
            content: "one too many".into(),
            memory_type: MemoryType::Fact,
            confidence: 0.7,
            source_type: SourceType::Agent,
            evidence: vec![],
            rationale: None,
        })
        .is_err());
    assert!(path.exists());

    let memory_store = open_store(&StoreConfig::default()).expect("memory backend");
    assert_eq!(memory_store.count(&s).expect("count"), 0);
}

// ---------------------------------------------------------------------------
// Sessions are isolated
// ---------------------------------------------------------------------------

#[test]
fn sessions_do_not_share_memories() {
    let store = SqliteStore::open_in_memory(100).expect("open");
    let a = session("alpha");
    let b = session("beta");
    let id = store
        .persist(NewMemory {
            session_id: a.clone(),
            content: "alpha secret".into(),
            memory_type: MemoryType::Fact,
            confidence: 0.9,
            source_type: SourceType::Agent,
            evidence: vec![],
            rationale: None,
        })
        .expect("persist");

    assert!(store.query(&b, QueryOptions::default()).expect("query").is_empty());
    assert!(store.get(&b, id).is_err());
    assert!(store.supersede(&b, id, None).is_err());
    assert!(!store.get(&a, id).expect("owner sees it").superseded);
}
