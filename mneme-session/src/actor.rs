//! Per-session actor.
//!
//! Each session runs as one tokio task that owns its [`SessionState`].
//! Callers talk to it through a cloneable [`SessionHandle`]: commands go
//! over a bounded `mpsc` channel, replies come back on a `oneshot`.
//! Working-context writes, staging, `remember`, `forget` and promotion all
//! run on the actor, so they never interleave for one session. Store I/O
//! is moved onto tokio's blocking pool and awaited, so a slow write holds
//! up its own session only.
//!
//! The actor also fires promotion on its own:
//! - every `promotion.interval_secs` (when `promotion.enabled`),
//! - when the implicit staging pool fills up,
//! - right after an agent decision is staged (when configured),
//! - once more on shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mneme_core::access_log::{AccessEntry, AccessKey, AccessType, AccessTypeCounts};
use mneme_core::config::MnemeConfig;
use mneme_core::error::{MemoryError, Result};
use mneme_core::metrics::{MemoryCounters, spans};
use mneme_core::pending::{PendingId, PendingItem};
use mneme_core::store::{LongTermStore, NewMemory, StoreError};
use mneme_core::taxonomy::ContextKey;
use mneme_core::types::{MemoryId, SessionId};
use mneme_core::working_context::{ContextItem, PutOptions};
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::Instrument;

use crate::promotion::{PromotionEngine, PromotionReport, PromotionTrigger};
use crate::state::SessionState;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

// ---------------------------------------------------------------------------
// Shared dependencies
// ---------------------------------------------------------------------------

/// What every session actor needs from the outside world.
#[derive(Clone)]
pub struct SessionDeps {
    /// Pipeline configuration.
    pub config: Arc<MnemeConfig>,
    /// Long-term store shared by all sessions.
    pub store: Arc<dyn LongTermStore>,
    /// Telemetry destination.
    pub sink: Arc<dyn TelemetrySink>,
    /// Process-wide counters.
    pub counters: Arc<MemoryCounters>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Staging counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingSummary {
    /// Implicit candidates staged.
    pub implicit: usize,
    /// Agent decisions staged.
    pub agent_decisions: usize,
}

/// Access statistics for one key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccessStats {
    /// Retained accesses.
    pub frequency: usize,
    /// Most recent access.
    pub last_access: Option<DateTime<Utc>>,
    /// Accesses by type.
    pub counts: AccessTypeCounts,
}

enum Command {
    PutContext {
        key: ContextKey,
        value: Value,
        options: PutOptions,
        reply: oneshot::Sender<()>,
    },
    GetContext {
        key: ContextKey,
        reply: oneshot::Sender<Option<Value>>,
    },
    PeekContext {
        key: ContextKey,
        reply: oneshot::Sender<Option<Value>>,
    },
    InspectContext {
        key: ContextKey,
        reply: oneshot::Sender<Option<ContextItem>>,
    },
    DeleteContext {
        key: ContextKey,
        reply: oneshot::Sender<bool>,
    },
    ContextSnapshot {
        reply: oneshot::Sender<Vec<ContextItem>>,
    },
    ClearContext {
        reply: oneshot::Sender<()>,
    },
    StageImplicit {
        item: PendingItem,
        reply: oneshot::Sender<Option<PendingItem>>,
    },
    StageAgentDecision {
        item: PendingItem,
        reply: oneshot::Sender<PendingId>,
    },
    UpdateScore {
        id: PendingId,
        score: f32,
        reply: oneshot::Sender<bool>,
    },
    InspectPending {
        id: PendingId,
        reply: oneshot::Sender<Option<PendingItem>>,
    },
    Summarize {
        reply: oneshot::Sender<PendingSummary>,
    },
    Stats {
        key: AccessKey,
        reply: oneshot::Sender<AccessStats>,
    },
    RecentAccesses {
        n: usize,
        reply: oneshot::Sender<Vec<AccessEntry>>,
    },
    Remember {
        memory: NewMemory,
        reply: oneshot::Sender<Result<MemoryId>>,
    },
    Forget {
        id: MemoryId,
        replacement: Option<MemoryId>,
        reply: oneshot::Sender<Result<()>>,
    },
    RecordQueryHits {
        ids: Vec<MemoryId>,
    },
    Promote {
        trigger: PromotionTrigger,
        reply: oneshot::Sender<PromotionReport>,
    },
    Stop {
        reply: oneshot::Sender<PromotionReport>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SessionHandle {
    /// Session this handle addresses.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Whether the actor is still accepting commands.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn unavailable(&self) -> MemoryError {
        MemoryError::SessionUnavailable(self.id.to_string())
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    // -- working context ----------------------------------------------------

    /// Write a working-context value. Logged as a write.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn put_context(&self, key: ContextKey, value: Value, options: PutOptions) -> Result<()> {
        self.request(|reply| Command::PutContext {
            key,
            value,
            options,
            reply,
        })
        .await
    }

    /// Read a working-context value. Counts as an access and is logged.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn get_context(&self, key: ContextKey) -> Result<Option<Value>> {
        self.request(|reply| Command::GetContext { key, reply }).await
    }

    /// Read a working-context value without touching any statistics.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn peek_context(&self, key: ContextKey) -> Result<Option<Value>> {
        self.request(|reply| Command::PeekContext { key, reply }).await
    }

    /// Full metadata for a working-context key, without touching statistics.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn context_item(&self, key: ContextKey) -> Result<Option<ContextItem>> {
        self.request(|reply| Command::InspectContext { key, reply }).await
    }

    /// Remove a working-context key. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn delete_context(&self, key: ContextKey) -> Result<bool> {
        self.request(|reply| Command::DeleteContext { key, reply }).await
    }

    /// Every working-context item, ordered by key.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn context_snapshot(&self) -> Result<Vec<ContextItem>> {
        self.request(|reply| Command::ContextSnapshot { reply }).await
    }

    /// Drop every working-context item.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn clear_context(&self) -> Result<()> {
        self.request(|reply| Command::ClearContext { reply }).await
    }

    // -- staging ------------------------------------------------------------

    /// Stage an implicit candidate. Returns the item evicted to make room.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn stage(&self, item: PendingItem) -> Result<Option<PendingItem>> {
        self.request(|reply| Command::StageImplicit { item, reply }).await
    }

    /// Stage an agent decision, bypassing the score threshold.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn stage_agent_decision(&self, item: PendingItem) -> Result<PendingId> {
        self.request(|reply| Command::StageAgentDecision { item, reply }).await
    }

    /// Re-score a staged implicit item. Returns whether it was found.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn update_score(&self, id: PendingId, score: f32) -> Result<bool> {
        self.request(|reply| Command::UpdateScore { id, score, reply }).await
    }

    /// Look up a staged item in either pool.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn pending_item(&self, id: PendingId) -> Result<Option<PendingItem>> {
        self.request(|reply| Command::InspectPending { id, reply }).await
    }

    /// Staging counts.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn pending_summary(&self) -> Result<PendingSummary> {
        self.request(|reply| Command::Summarize { reply }).await
    }

    // -- access log ---------------------------------------------------------

    /// Access statistics for a context key or memory id.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn access_stats(&self, key: impl Into<AccessKey>) -> Result<AccessStats> {
        let key = key.into();
        self.request(|reply| Command::Stats { key, reply }).await
    }

    /// The `n` most recent accesses, newest first.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn recent_accesses(&self, n: usize) -> Result<Vec<AccessEntry>> {
        self.request(|reply| Command::RecentAccesses { n, reply }).await
    }

    // -- promotion & lifecycle ----------------------------------------------

    /// Run promotion now.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn promote(&self, trigger: PromotionTrigger) -> Result<PromotionReport> {
        self.request(|reply| Command::Promote { trigger, reply }).await
    }

    /// Promote with the `session_pause` trigger. The session keeps running.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor has stopped.
    pub async fn pause(&self) -> Result<PromotionReport> {
        self.promote(PromotionTrigger::SessionPause).await
    }

    /// Run a final `session_close` promotion and stop the actor.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if the actor had already stopped.
    pub async fn stop(&self) -> Result<PromotionReport> {
        self.request(|reply| Command::Stop { reply }).await
    }

    // -- crate-internal -----------------------------------------------------

    pub(crate) async fn remember(&self, memory: NewMemory) -> Result<MemoryId> {
        self.request(|reply| Command::Remember { memory, reply }).await?
    }

    pub(crate) async fn forget(&self, id: MemoryId, replacement: Option<MemoryId>) -> Result<()> {
        self.request(|reply| Command::Forget {
            id,
            replacement,
            reply,
        })
        .await?
    }

    /// Fire-and-forget: log `query` accesses for recalled memories.
    ///
    /// Never waits for channel capacity. A full queue drops the hits and
    /// reports `session_unavailable`.
    pub(crate) fn record_query_hits(&self, ids: Vec<MemoryId>) -> Result<()> {
        self.tx
            .try_send(Command::RecordQueryHits { ids })
            .map_err(|err| match err {
                TrySendError::Full(_) => {
                    MemoryError::SessionUnavailable(format!("{} (command queue full)", self.id))
                }
                TrySendError::Closed(_) => self.unavailable(),
            })
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Start the actor for `id` on the current tokio runtime.
pub(crate) fn spawn(id: SessionId, deps: SessionDeps) -> SessionHandle {
    let (tx, rx) = mpsc::channel(deps.config.general.command_buffer.max(1));
    let actor = SessionActor {
        id: id.clone(),
        state: SessionState::new(&deps.config),
        engine: PromotionEngine::new(deps.config.promotion.clone()),
        deps,
    };
    tokio::spawn(actor.run(rx));
    SessionHandle { id, tx }
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

struct SessionActor {
    id: SessionId,
    state: SessionState,
    engine: PromotionEngine,
    deps: SessionDeps,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let period = Duration::from_secs(self.deps.config.promotion.interval_secs.max(1));
        let mut tick = time::interval_at(time::Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let scheduled = self.deps.config.promotion.enabled;

        tracing::debug!(session = %self.id, "session actor started");
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Stop { reply }) => {
                        let report = self.promote(PromotionTrigger::SessionClose).await;
                        let _ = reply.send(report);
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.promote(PromotionTrigger::SessionClose).await;
                        break;
                    }
                },
                _ = tick.tick(), if scheduled => {
                    self.promote(PromotionTrigger::Scheduled).await;
                }
            }
        }
        tracing::debug!(session = %self.id, "session actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        // A dropped reply receiver only means the caller gave up waiting.
        match command {
            Command::PutContext {
                key,
                value,
                options,
                reply,
            } => {
                self.state.context.put(key, value, options);
                self.state.access_log.record(key, AccessType::Write);
                let _ = reply.send(());
            }
            Command::GetContext { key, reply } => {
                let value = self.state.context.get(key).cloned();
                if value.is_some() {
                    self.state.access_log.record(key, AccessType::Read);
                }
                let _ = reply.send(value);
            }
            Command::PeekContext { key, reply } => {
                let _ = reply.send(self.state.context.peek(key).cloned());
            }
            Command::InspectContext { key, reply } => {
                let _ = reply.send(self.state.context.get_item(key).cloned());
            }
            Command::DeleteContext { key, reply } => {
                let _ = reply.send(self.state.context.delete(key));
            }
            Command::ContextSnapshot { reply } => {
                let _ = reply.send(self.state.context.to_list());
            }
            Command::ClearContext { reply } => {
                self.state.context.clear();
                let _ = reply.send(());
            }
            Command::StageImplicit { item, reply } => {
                let evicted = self.state.pending.add_implicit(item);
                if evicted.is_some() {
                    MemoryCounters::incr(&self.deps.counters.staged_evictions);
                }
                let full = self.state.pending.len() >= self.state.pending.max_items();
                let _ = reply.send(evicted);
                if full {
                    self.promote(PromotionTrigger::MemoryLimitReached).await;
                }
            }
            Command::StageAgentDecision { item, reply } => {
                let id = item.id;
                if self.state.pending.add_agent_decision(item).is_some() {
                    MemoryCounters::incr(&self.deps.counters.staged_evictions);
                }
                if self.deps.config.promotion.promote_agent_decisions_immediately {
                    self.promote(PromotionTrigger::AgentDecision).await;
                }
                let _ = reply.send(id);
            }
            Command::UpdateScore { id, score, reply } => {
                let _ = reply.send(self.state.pending.update_score(id, score));
            }
            Command::InspectPending { id, reply } => {
                let _ = reply.send(self.state.pending.get(id).cloned());
            }
            Command::Summarize { reply } => {
                let _ = reply.send(PendingSummary {
                    implicit: self.state.pending.len(),
                    agent_decisions: self.state.pending.agent_decision_count(),
                });
            }
            Command::Stats { key, reply } => {
                let log = &self.state.access_log;
                let _ = reply.send(AccessStats {
                    frequency: log.frequency(key),
                    last_access: log.recency(key),
                    counts: log.access_type_counts(key),
                });
            }
            Command::RecentAccesses { n, reply } => {
                let _ = reply.send(self.state.access_log.recent_accesses(n));
            }
            Command::Remember { memory, reply } => {
                let _ = reply.send(self.remember(memory).await);
            }
            Command::Forget {
                id,
                replacement,
                reply,
            } => {
                let _ = reply.send(self.forget(id, replacement).await);
            }
            Command::RecordQueryHits { ids } => {
                for id in ids {
                    self.state.access_log.record(id, AccessType::Query);
                }
            }
            Command::Promote { trigger, reply } => {
                let _ = reply.send(self.promote(trigger).await);
            }
            // Handled in the run loop.
            Command::Stop { .. } => {}
        }
    }

    /// Run `work` against the store on the blocking pool.
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn LongTermStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.deps.store);
        tokio::task::spawn_blocking(move || work(store.as_ref()))
            .await
            .map_err(|e| MemoryError::Storage(format!("store task failed: {e}")))?
    }

    async fn remember(&mut self, memory: NewMemory) -> Result<MemoryId> {
        let id = self
            .blocking(move |store| store.persist(memory).map_err(MemoryError::from))
            .await?;
        self.state.access_log.record(id, AccessType::Write);
        Ok(id)
    }

    async fn forget(&mut self, id: MemoryId, replacement: Option<MemoryId>) -> Result<()> {
        let session = self.id.clone();
        self.blocking(move |store| {
            store.get(&session, id).map_err(|err| match err {
                StoreError::NotFound(_) => MemoryError::MemoryNotFound(id),
                other => other.into(),
            })?;
            if let Some(replacement) = replacement {
                store.get(&session, replacement).map_err(|err| match err {
                    StoreError::NotFound(_) => MemoryError::ReplacementNotFound(replacement),
                    other => other.into(),
                })?;
            }
            store.supersede(&session, id, replacement)?;
            Ok(())
        })
        .await?;
        self.state.access_log.record(id, AccessType::Write);
        Ok(())
    }

    async fn promote(&mut self, trigger: PromotionTrigger) -> PromotionReport {
        let span = tracing::info_span!(spans::PROMOTION, session = %self.id, trigger = trigger.as_str());
        self.promote_inner(trigger).instrument(span).await
    }

    async fn promote_inner(&mut self, trigger: PromotionTrigger) -> PromotionReport {
        let batch = self.engine.plan(&self.id, &self.state, trigger, Utc::now());
        let report = if batch.is_empty() {
            batch.persist(self.deps.store.as_ref()).apply(&mut self.state)
        } else {
            let (attempted, deferred) = (batch.len(), batch.deferred());
            let started = std::time::Instant::now();
            let span = tracing::Span::current();
            let written = self
                .blocking(move |store| Ok(span.in_scope(|| batch.persist(store))))
                .await;
            match written {
                Ok(written) => written.apply(&mut self.state),
                Err(err) => {
                    // Nothing is cleared; every candidate stays staged.
                    tracing::error!(session = %self.id, error = %err, "promotion batch lost");
                    PromotionReport {
                        trigger,
                        memory_ids: Vec::new(),
                        attempted,
                        failures: attempted,
                        deferred,
                        duration: started.elapsed(),
                    }
                }
            }
        };

        if report.attempted == 0 && trigger.is_automatic() {
            return report;
        }

        let counters = &self.deps.counters;
        MemoryCounters::incr(&counters.promotion_runs);
        MemoryCounters::add(&counters.memories_promoted, as_count(report.promoted()));
        MemoryCounters::add(&counters.promotion_failures, as_count(report.failures));
        self.deps.sink.emit(&TelemetryEvent::PromotionCompleted {
            session_id: self.id.clone(),
            trigger,
            memory_ids: report.memory_ids.clone(),
            failures: report.failures,
            duration: report.duration,
        });
        report
    }
}
