//! Mneme Benchmark Suite
//!
//! Hot-path targets:
//!   working_context_put_get ........... < 1μs
//!   access_log_record ................. < 1μs
//!   staging_insert_with_eviction_500 .. < 50μs
//!   tfidf_embed_sentence .............. < 20μs
//!   hybrid_rank_50 .................... < 1ms

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use mneme_core::access_log::{AccessLog, AccessType};
use mneme_core::embedding::{EmbeddingProvider, TfIdfEmbedder};
use mneme_core::pending::{PendingItem, PendingMemories};
use mneme_core::retrieval::{RetrievalEngine, SearchMode};
use mneme_core::store::{NewMemory, PersistedMemory};
use mneme_core::taxonomy::{ContextKey, MemoryType, SourceType};
use mneme_core::types::{MemoryId, SessionId};
use mneme_core::working_context::{PutOptions, WorkingContext};

const WORDS: &[&str] = &[
    "phoenix", "liveview", "ecto", "migration", "postgres", "redis", "tailwind", "deploy",
    "release", "branch", "test", "nextest", "cargo", "workspace", "module", "router",
    "handler", "schema", "index", "cache", "queue", "worker", "config", "secret",
];

fn sentence(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn candidates(rng: &mut StdRng, n: usize) -> Vec<PersistedMemory> {
    let session = SessionId::parse("bench").unwrap();
    (0..n)
        .map(|_| {
            PersistedMemory::from_new(
                NewMemory {
                    session_id: session.clone(),
                    content: sentence(rng, 12),
                    memory_type: MemoryType::Fact,
                    confidence: rng.gen_range(0.5..1.0),
                    source_type: SourceType::Agent,
                    evidence: Vec::new(),
                    rationale: None,
                },
                Utc::now(),
            )
        })
        .collect()
}

fn bench_working_context(c: &mut Criterion) {
    let mut ctx = WorkingContext::default();
    c.bench_function("working_context_put_get", |b| {
        b.iter(|| {
            ctx.put(ContextKey::Framework, json!("Phoenix"), PutOptions::tool());
            black_box(ctx.get(black_box(ContextKey::Framework)));
        });
    });
}

fn bench_access_log(c: &mut Criterion) {
    let mut log = AccessLog::new(1000);
    let ids: Vec<MemoryId> = (0..64).map(|_| MemoryId::new()).collect();
    let mut n = 0;
    c.bench_function("access_log_record", |b| {
        b.iter(|| {
            n = (n + 1) % ids.len();
            log.record(black_box(ids[n]), AccessType::Query);
        });
    });
}

/// Full staging pool: every insert evicts the lowest-scoring item.
fn bench_staging_eviction(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut pending = PendingMemories::new(500, 100);
    for _ in 0..500 {
        pending.add_implicit(
            PendingItem::new(sentence(&mut rng, 6), MemoryType::Fact)
                .with_importance(rng.gen_range(0.0..1.0)),
        );
    }
    c.bench_function("staging_insert_with_eviction_500", |b| {
        b.iter(|| {
            let item = PendingItem::new("staged candidate", MemoryType::Fact)
                .with_importance(rng.gen_range(0.0..1.0));
            black_box(pending.add_implicit(black_box(item)));
        });
    });
}

fn bench_embed(c: &mut Criterion) {
    let embedder = TfIdfEmbedder::default();
    let mut rng = StdRng::seed_from_u64(11);
    let text = sentence(&mut rng, 20);
    c.bench_function("tfidf_embed_sentence", |b| {
        b.iter(|| black_box(embedder.embed(black_box(&text)).unwrap()));
    });
}

fn bench_hybrid_rank(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let pool = candidates(&mut rng, 50);
    let engine = RetrievalEngine::default();
    let embedder = TfIdfEmbedder::default();

    c.bench_function("hybrid_rank_50", |b| {
        b.iter(|| {
            let ranking = engine.rank(
                SearchMode::Hybrid,
                black_box(Some("ecto migration postgres")),
                pool.clone(),
                10,
                &embedder,
            );
            black_box(ranking);
        });
    });
}

criterion_group!(
    benches,
    bench_working_context,
    bench_access_log,
    bench_staging_eviction,
    bench_embed,
    bench_hybrid_rank,
);
criterion_main!(benches);
