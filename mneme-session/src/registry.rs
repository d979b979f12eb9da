//! Session registry — one actor per live session id.

use dashmap::DashMap;
use mneme_core::error::{MemoryError, Result};
use mneme_core::types::SessionId;

use crate::actor::{self, SessionDeps, SessionHandle};
use crate::promotion::PromotionReport;

/// Starts session actors on first use and stops them on request.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    deps: SessionDeps,
}

impl SessionRegistry {
    /// Empty registry. Actors started later share `deps`.
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps,
        }
    }

    /// Handle for `id`, starting its actor if none is running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn get_or_start(&self, id: &SessionId) -> SessionHandle {
        if let Some(handle) = self.sessions.get(id) {
            if handle.is_running() {
                return handle.clone();
            }
        }

        let mut entry = self.sessions.entry(id.clone()).or_insert_with(|| {
            tracing::info!(session = %id, "starting session");
            actor::spawn(id.clone(), self.deps.clone())
        });
        if !entry.is_running() {
            tracing::info!(session = %id, "restarting stopped session");
            *entry = actor::spawn(id.clone(), self.deps.clone());
        }
        entry.clone()
    }

    /// Handle for `id` if its actor is running.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions
            .get(id)
            .map(|handle| handle.clone())
            .filter(SessionHandle::is_running)
    }

    /// Stop `id` after a final `session_close` promotion.
    ///
    /// # Errors
    ///
    /// `session_unavailable` if no actor is running for `id`.
    pub async fn stop(&self, id: &SessionId) -> Result<PromotionReport> {
        let (_, handle) = self
            .sessions
            .remove(id)
            .ok_or_else(|| MemoryError::SessionUnavailable(id.to_string()))?;
        let report = handle.stop().await?;
        tracing::info!(session = %id, promoted = report.promoted(), "session stopped");
        Ok(report)
    }

    /// Stop every session. Returns how many shut down cleanly.
    pub async fn stop_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut stopped = 0;
        for id in ids {
            match self.stop(&id).await {
                Ok(_) => stopped += 1,
                Err(err) => tracing::warn!(session = %id, error = %err, "session stop failed"),
            }
        }
        stopped
    }

    /// Ids with a running actor.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|e| e.value().is_running())
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Shared dependencies handed to every actor.
    #[must_use]
    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mneme_core::config::MnemeConfig;
    use mneme_core::metrics::MemoryCounters;
    use mneme_core::store::InMemoryStore;
    use mneme_core::taxonomy::ContextKey;
    use mneme_core::working_context::PutOptions;
    use serde_json::json;

    use crate::telemetry::BufferSink;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(SessionDeps {
            config: Arc::new(MnemeConfig::default()),
            store: Arc::new(InMemoryStore::default()),
            sink: Arc::new(BufferSink::new()),
            counters: Arc::new(MemoryCounters::new()),
        })
    }

    fn id(raw: &str) -> SessionId {
        SessionId::parse(raw).expect("valid id")
    }

    #[tokio::test]
    async fn same_id_shares_one_actor() {
        let registry = registry();
        let a = registry.get_or_start(&id("s-1"));
        let b = registry.get_or_start(&id("s-1"));
        registry.get_or_start(&id("s-2"));
        assert_eq!(registry.len(), 2);

        a.put_context(ContextKey::Framework, json!("Phoenix"), PutOptions::default())
            .await
            .expect("put");
        let seen = b.peek_context(ContextKey::Framework).await.expect("peek");
        assert_eq!(seen, Some(json!("Phoenix")));
    }

    #[tokio::test]
    async fn stop_removes_and_restart_is_fresh() {
        let registry = registry();
        let s = id("s-stop");
        let handle = registry.get_or_start(&s);
        registry.stop(&s).await.expect("stop");
        assert!(registry.get(&s).is_none());
        assert!(handle.peek_context(ContextKey::Framework).await.is_err());
        assert_eq!(
            registry.stop(&s).await.expect_err("already stopped").tag(),
            "session_unavailable"
        );

        let fresh = registry.get_or_start(&s);
        assert!(fresh.is_running());
        assert_eq!(registry.active_sessions(), vec![s]);
    }

    #[tokio::test]
    async fn stop_all_drains_registry() {
        let registry = registry();
        for n in 0..3 {
            registry.get_or_start(&id(&format!("bulk-{n}")));
        }
        assert_eq!(registry.stop_all().await, 3);
        assert!(registry.is_empty());
    }
}
