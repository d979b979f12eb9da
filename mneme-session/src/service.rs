//! Memory service — the public surface an agent talks to.
//!
//! `remember` and `forget` go through the session actor so they serialize
//! with promotion. `recall` reads the store directly and ranks on the
//! blocking pool, then hands query hits back to the actor for the access
//! log. Every operation emits one telemetry event and bumps the counters.

use std::sync::Arc;
use std::time::Instant;

use mneme_core::config::MnemeConfig;
use mneme_core::embedding::{EmbeddingProvider, TfIdfEmbedder};
use mneme_core::error::{MemoryError, Result};
use mneme_core::metrics::{CounterSnapshot, LatencyMonitor, MemoryCounters, spans};
use mneme_core::retrieval::{MemoryView, RetrievalEngine, SearchMode};
use mneme_core::store::{LongTermStore, NewMemory, QueryOptions, open_store};
use mneme_core::taxonomy::{MemoryType, SourceType};
use mneme_core::types::{MemoryId, SessionId};
use tracing::Instrument;

use crate::actions::{
    ForgetOptions, ForgetResponse, RecallPlan, RecallRequest, RememberOptions, RememberResponse,
    validate_remember,
};
use crate::actor::{SessionDeps, SessionHandle};
use crate::context_builder::{AssembledContext, ContextBuilder};
use crate::embedding_cache::CachedEmbedder;
use crate::promotion::{PromotionReport, PromotionTrigger};
use crate::registry::SessionRegistry;
use crate::telemetry::{NoopSink, TelemetryEvent, TelemetrySink, TracingSink};

/// Outcome of the recall pipeline before projection.
struct Recalled {
    memories: Vec<MemoryView>,
    fell_back: bool,
}

/// Entry point for per-session memory operations.
pub struct MemoryService {
    config: Arc<MnemeConfig>,
    store: Arc<dyn LongTermStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    engine: Arc<RetrievalEngine>,
    context: ContextBuilder,
    registry: SessionRegistry,
    sink: Arc<dyn TelemetrySink>,
    counters: Arc<MemoryCounters>,
    recall_latency: LatencyMonitor,
}

impl MemoryService {
    /// Service over `store` with the default sink for `config`.
    #[must_use]
    pub fn new(config: MnemeConfig, store: Arc<dyn LongTermStore>) -> Self {
        let sink: Arc<dyn TelemetrySink> = if config.telemetry.enabled {
            Arc::new(TracingSink::new(config.telemetry.log_slow_operations_ms))
        } else {
            Arc::new(NoopSink)
        };
        Self::with_sink(config, store, sink)
    }

    /// Service over `store`, sending telemetry to `sink`.
    #[must_use]
    pub fn with_sink(config: MnemeConfig, store: Arc<dyn LongTermStore>, sink: Arc<dyn TelemetrySink>) -> Self {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(CachedEmbedder::new(
            TfIdfEmbedder::new(config.recall.embedding_dimensions),
            config.recall.embedding_cache_size,
        ));
        let engine = Arc::new(RetrievalEngine::new(&config.recall));
        let context = ContextBuilder::new(config.context.clone());
        let recall_latency = LatencyMonitor::new(f64::from(config.telemetry.log_slow_operations_ms));
        let config = Arc::new(config);
        let counters = Arc::new(MemoryCounters::new());
        let registry = SessionRegistry::new(SessionDeps {
            config: Arc::clone(&config),
            store: Arc::clone(&store),
            sink: Arc::clone(&sink),
            counters: Arc::clone(&counters),
        });
        Self {
            config,
            store,
            embedder,
            engine,
            context,
            registry,
            sink,
            counters,
            recall_latency,
        }
    }

    /// Validate `config` and open the store it names.
    ///
    /// # Errors
    ///
    /// `config` for invalid settings; store-specific errors for a backend
    /// that cannot be opened.
    pub fn from_config(config: MnemeConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(&config.store)?;
        Ok(Self::new(config, store))
    }

    /// Replace the embedding provider used for semantic and hybrid recall.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &MnemeConfig {
        &self.config
    }

    /// Counter values right now.
    #[must_use]
    pub fn metrics(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Recall latency statistics.
    #[must_use]
    pub fn recall_latency(&self) -> &LatencyMonitor {
        &self.recall_latency
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn record_outcome<T>(&self, result: &Result<T>, success: &std::sync::atomic::AtomicU64) {
        match result {
            Ok(_) => MemoryCounters::incr(success),
            Err(_) => MemoryCounters::incr(&self.counters.operation_errors),
        }
    }

    // -- sessions -----------------------------------------------------------

    /// Handle for working-context and staging commands, starting the session
    /// if needed.
    ///
    /// # Errors
    ///
    /// `missing_session_id` or `invalid_session_id`.
    pub fn session(&self, session_id: &str) -> Result<SessionHandle> {
        let id = SessionId::parse(session_id)?;
        Ok(self.registry.get_or_start(&id))
    }

    /// Run promotion for `session_id` right away.
    ///
    /// # Errors
    ///
    /// Session-id errors, or `session_unavailable`.
    pub async fn promote_now(&self, session_id: &str) -> Result<PromotionReport> {
        self.session(session_id)?
            .promote(PromotionTrigger::ExplicitRequest)
            .await
    }

    /// Promote one last time and stop the session's actor.
    ///
    /// # Errors
    ///
    /// Session-id errors, or `session_unavailable` when nothing is running.
    pub async fn stop_session(&self, session_id: &str) -> Result<PromotionReport> {
        let id = SessionId::parse(session_id)?;
        self.registry.stop(&id).await
    }

    /// Stop every session. Returns how many stopped cleanly.
    pub async fn shutdown(&self) -> usize {
        self.registry.stop_all().await
    }

    // -- remember -----------------------------------------------------------

    /// Store `content` as a long-term memory.
    ///
    /// # Errors
    ///
    /// Session-id and validation errors before any store access;
    /// `session_memory_limit_exceeded` or `storage_failure` from the store.
    pub async fn remember(
        &self,
        session_id: &str,
        content: &str,
        options: RememberOptions,
    ) -> Result<RememberResponse> {
        let start = Instant::now();
        let id = SessionId::parse(session_id)?;
        let span = tracing::info_span!(spans::REMEMBER, session = %id);

        let requested_type = options
            .memory_type
            .as_deref()
            .and_then(|t| t.parse::<MemoryType>().ok());
        let result = self
            .remember_inner(&id, content, &options)
            .instrument(span)
            .await;

        self.record_outcome(&result, &self.counters.remembered);
        self.sink.emit(&TelemetryEvent::Remember {
            session_id: id,
            memory_type: result.as_ref().map(|r| r.memory_type).ok().or(requested_type),
            duration: start.elapsed(),
            error: result.as_ref().err().map(MemoryError::tag),
        });
        result
    }

    async fn remember_inner(
        &self,
        id: &SessionId,
        content: &str,
        options: &RememberOptions,
    ) -> Result<RememberResponse> {
        let valid = validate_remember(content, options, &self.config.remember)?;
        let memory_type = valid.memory_type;
        let handle = self.registry.get_or_start(id);
        let memory_id = handle
            .remember(NewMemory {
                session_id: id.clone(),
                content: valid.content,
                memory_type,
                confidence: valid.confidence,
                source_type: SourceType::Agent,
                evidence: Vec::new(),
                rationale: valid.rationale,
            })
            .await?;
        tracing::debug!(memory = %memory_id, memory_type = memory_type.as_str(), "remembered");
        Ok(RememberResponse {
            memory_id,
            memory_type,
            message: format!("Remembered {memory_type} memory."),
        })
    }

    // -- recall -------------------------------------------------------------

    /// Search the session's long-term memories.
    ///
    /// # Errors
    ///
    /// Session-id and validation errors before any store access;
    /// `storage_failure` from the store.
    pub async fn recall(&self, session_id: &str, request: RecallRequest) -> Result<Vec<MemoryView>> {
        let start = Instant::now();
        let id = SessionId::parse(session_id)?;
        let span = tracing::info_span!(spans::RECALL, session = %id);

        let requested_mode = request
            .search_mode
            .as_deref()
            .map_or(Some(SearchMode::default()), |m| m.parse::<SearchMode>().ok());
        let result = async {
            let plan = request.validate(&self.config.recall)?;
            self.recall_plan(&id, plan).await
        }
        .instrument(span)
        .await;

        let duration = start.elapsed();
        if self.recall_latency.record(duration.as_secs_f64() * 1000.0) {
            tracing::debug!(session = %id, "slow recall");
        }
        self.record_outcome(&result, &self.counters.recalls);
        let fell_back = result.as_ref().is_ok_and(|r| r.fell_back);
        if fell_back {
            MemoryCounters::incr(&self.counters.recall_fallbacks);
        }
        self.sink.emit(&TelemetryEvent::Recall {
            session_id: id,
            search_mode: requested_mode,
            result_count: result.as_ref().map_or(0, |r| r.memories.len()),
            fell_back,
            duration,
            error: result.as_ref().err().map(MemoryError::tag),
        });
        result.map(|r| r.memories)
    }

    async fn recall_plan(&self, id: &SessionId, plan: RecallPlan) -> Result<Recalled> {
        let handle = self.registry.get_or_start(id);
        let store = Arc::clone(&self.store);
        let engine = Arc::clone(&self.engine);
        let embedder = Arc::clone(&self.embedder);
        let session = id.clone();
        let rank_span = tracing::debug_span!(spans::RANK, mode = plan.mode.as_str());

        let (ranking, access_failures) = tokio::task::spawn_blocking(move || {
            let _entered = rank_span.enter();
            let fetch = engine.fetch_limit(plan.mode, plan.query.is_some(), plan.limit);
            let options = QueryOptions {
                min_confidence: plan.min_confidence,
                limit: fetch,
                include_superseded: false,
            };
            let candidates = match plan.memory_type {
                Some(memory_type) => store.query_by_type(&session, memory_type, options)?,
                None => store.query(&session, options)?,
            };
            let fetched = candidates.len();
            let ranking = engine.rank(
                plan.mode,
                plan.query.as_deref(),
                candidates,
                plan.limit,
                embedder.as_ref(),
            );

            let mut access_failures = 0_u64;
            for hit in &ranking.hits {
                if let Err(err) = store.record_access(&session, hit.memory.id) {
                    access_failures += 1;
                    tracing::warn!(memory = %hit.memory.id, error = %err, "record_access failed");
                }
            }
            tracing::debug!(fetched, returned = ranking.hits.len(), fell_back = ranking.fell_back, "ranked");
            Ok::<_, MemoryError>((ranking, access_failures))
        })
        .await
        .map_err(|e| MemoryError::Storage(format!("recall task failed: {e}")))??;

        MemoryCounters::add(&self.counters.access_log_failures, access_failures);

        let ids: Vec<MemoryId> = ranking.hits.iter().map(|hit| hit.memory.id).collect();
        if !ids.is_empty() {
            if let Err(err) = handle.record_query_hits(ids) {
                MemoryCounters::incr(&self.counters.access_log_failures);
                tracing::warn!(error = %err, "query access log skipped");
            }
        }

        Ok(Recalled {
            memories: ranking.hits.iter().map(|hit| MemoryView::from(&hit.memory)).collect(),
            fell_back: ranking.fell_back,
        })
    }

    // -- forget -------------------------------------------------------------

    /// Supersede a memory, optionally pointing at its replacement.
    ///
    /// # Errors
    ///
    /// Session-id and `reason_too_long` before any store access;
    /// `memory_not_found`, `replacement_not_found` or `storage_failure`.
    pub async fn forget(
        &self,
        session_id: &str,
        memory_id: MemoryId,
        options: ForgetOptions,
    ) -> Result<ForgetResponse> {
        let start = Instant::now();
        let id = SessionId::parse(session_id)?;
        let span = tracing::info_span!(spans::FORGET, session = %id, memory = %memory_id);

        let result = async {
            options.validate(&self.config.remember)?;
            let handle = self.registry.get_or_start(&id);
            handle.forget(memory_id, options.replacement_id).await?;
            tracing::debug!(reason = options.reason.as_deref(), "forgotten");
            Ok::<_, MemoryError>(ForgetResponse {
                forgotten: true,
                memory_id,
                message: match options.replacement_id {
                    Some(replacement) => format!("Memory {memory_id} superseded by {replacement}."),
                    None => format!("Memory {memory_id} forgotten."),
                },
            })
        }
        .instrument(span)
        .await;

        self.record_outcome(&result, &self.counters.forgotten);
        self.sink.emit(&TelemetryEvent::Forget {
            session_id: id,
            memory_id,
            replaced: options.replacement_id.is_some(),
            duration: start.elapsed(),
            error: result.as_ref().err().map(MemoryError::tag),
        });
        result
    }

    // -- context ------------------------------------------------------------

    /// Working context plus relevant memories, packed for a prompt.
    ///
    /// With a query, memories come from hybrid recall; without one, the
    /// newest memories above `context.min_confidence`. The working context
    /// is read with `peek`, so building context never skews promotion.
    ///
    /// # Errors
    ///
    /// Session-id errors, `query_too_long`, or store failures.
    pub async fn build_context(
        &self,
        session_id: &str,
        query: Option<&str>,
        token_budget: Option<usize>,
    ) -> Result<AssembledContext> {
        let id = SessionId::parse(session_id)?;
        let span = tracing::info_span!(spans::BUILD_CONTEXT, session = %id);

        async {
            let handle = self.registry.get_or_start(&id);
            let working = handle.context_snapshot().await?;

            let settings = self.context.config();
            let limit = settings.max_memories.clamp(1, self.config.recall.max_limit);
            let request = RecallRequest {
                query: query.map(str::to_string),
                search_mode: Some(SearchMode::Hybrid.as_str().to_string()),
                memory_type: None,
                min_confidence: Some(settings.min_confidence),
                limit: Some(limit),
            };
            let plan = request.validate(&self.config.recall)?;
            let memories = if settings.max_memories == 0 {
                Vec::new()
            } else {
                self.recall_plan(&id, plan).await?.memories
            };

            Ok::<_, MemoryError>(self.context.assemble(working, memories, token_budget))
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryService")
            .field("registry", &self.registry)
            .field("embedder", &self.embedder.model_name())
            .finish_non_exhaustive()
    }
}
