//! Process-local [`LongTermStore`].

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use super::{
    DEFAULT_MAX_MEMORIES_PER_SESSION, LongTermStore, NewMemory, PersistedMemory, QueryOptions,
    StoreError,
};
use crate::taxonomy::MemoryType;
use crate::types::{MemoryId, SessionId};

/// Memories kept in a `RwLock`-guarded map, one insertion-ordered list per
/// session. Every mutation happens under a single write lock, so readers
/// never see a half-applied supersede.
#[derive(Debug)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<SessionId, Vec<PersistedMemory>>>,
    max_per_session: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MEMORIES_PER_SESSION)
    }
}

impl InMemoryStore {
    /// Empty store with the given per-session cap.
    #[must_use]
    pub fn new(max_per_session: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_per_session,
        }
    }

    fn collect<F>(&self, session_id: &SessionId, options: QueryOptions, filter: F) -> Vec<PersistedMemory>
    where
        F: Fn(&PersistedMemory) -> bool,
    {
        let sessions = self.sessions.read();
        sessions.get(session_id).map_or_else(Vec::new, |memories| {
            memories
                .iter()
                .rev()
                .filter(|m| options.admits(m) && filter(m))
                .take(options.limit)
                .cloned()
                .collect()
        })
    }
}

impl LongTermStore for InMemoryStore {
    fn persist(&self, memory: NewMemory) -> Result<MemoryId, StoreError> {
        if memory.content.trim().is_empty() {
            return Err(StoreError::ValidationFailure("content is empty".into()));
        }
        let mut sessions = self.sessions.write();
        let memories = sessions.entry(memory.session_id.clone()).or_default();
        if memories.len() >= self.max_per_session {
            return Err(StoreError::LimitExceeded {
                limit: self.max_per_session,
            });
        }
        let record = PersistedMemory::from_new(memory, Utc::now());
        let id = record.id;
        memories.push(record);
        Ok(id)
    }

    fn query(
        &self,
        session_id: &SessionId,
        options: QueryOptions,
    ) -> Result<Vec<PersistedMemory>, StoreError> {
        Ok(self.collect(session_id, options, |_| true))
    }

    fn query_by_type(
        &self,
        session_id: &SessionId,
        memory_type: MemoryType,
        options: QueryOptions,
    ) -> Result<Vec<PersistedMemory>, StoreError> {
        Ok(self.collect(session_id, options, |m| m.memory_type == memory_type))
    }

    fn get(&self, session_id: &SessionId, id: MemoryId) -> Result<PersistedMemory, StoreError> {
        self.sessions
            .read()
            .get(session_id)
            .and_then(|memories| memories.iter().find(|m| m.id == id))
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn supersede(
        &self,
        session_id: &SessionId,
        id: MemoryId,
        replacement: Option<MemoryId>,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        let memory = sessions
            .get_mut(session_id)
            .and_then(|memories| memories.iter_mut().find(|m| m.id == id))
            .ok_or(StoreError::NotFound(id))?;
        memory.superseded = true;
        memory.superseded_by = replacement;
        memory.superseded_at = Some(Utc::now());
        Ok(())
    }

    fn record_access(&self, session_id: &SessionId, id: MemoryId) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        let memory = sessions
            .get_mut(session_id)
            .and_then(|memories| memories.iter_mut().find(|m| m.id == id))
            .ok_or(StoreError::NotFound(id))?;
        memory.access_count = memory.access_count.saturating_add(1);
        memory.last_accessed = Some(Utc::now());
        Ok(())
    }

    fn count(&self, session_id: &SessionId) -> Result<usize, StoreError> {
        Ok(self.sessions.read().get(session_id).map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::SourceType;

    fn new_memory(session: &SessionId, content: &str, memory_type: MemoryType) -> NewMemory {
        NewMemory {
            session_id: session.clone(),
            content: content.to_string(),
            memory_type,
            confidence: 0.8,
            source_type: SourceType::Agent,
            evidence: vec![],
            rationale: None,
        }
    }

    fn session(name: &str) -> SessionId {
        SessionId::parse(name).expect("valid session id")
    }

    #[test]
    fn query_is_newest_first_and_session_scoped() {
        let store = InMemoryStore::default();
        let s1 = session("s1");
        let s2 = session("s2");
        let first = store.persist(new_memory(&s1, "first", MemoryType::Fact)).expect("persist");
        let second = store.persist(new_memory(&s1, "second", MemoryType::Fact)).expect("persist");
        store.persist(new_memory(&s2, "other", MemoryType::Fact)).expect("persist");

        let ids: Vec<_> = store
            .query(&s1, QueryOptions::default())
            .expect("query")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
        assert!(matches!(store.get(&s2, first), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn supersede_hides_from_query_but_not_get() {
        let store = InMemoryStore::default();
        let s = session("s");
        let old = store.persist(new_memory(&s, "old", MemoryType::Decision)).expect("persist");
        let new = store.persist(new_memory(&s, "new", MemoryType::Decision)).expect("persist");
        store.supersede(&s, old, Some(new)).expect("supersede");

        let visible = store.query_by_type(&s, MemoryType::Decision, QueryOptions::default()).expect("query");
        assert_eq!(visible.len(), 1);
        let record = store.get(&s, old).expect("still readable");
        assert!(record.superseded);
        assert_eq!(record.superseded_by, Some(new));
        assert_eq!(store.count(&s).expect("count"), 2);
    }

    #[test]
    fn limit_enforced_per_session() {
        let store = InMemoryStore::new(1);
        let s = session("s");
        store.persist(new_memory(&s, "one", MemoryType::Fact)).expect("persist");
        assert_eq!(
            store.persist(new_memory(&s, "two", MemoryType::Fact)),
            Err(StoreError::LimitExceeded { limit: 1 })
        );
        assert!(store.persist(new_memory(&session("t"), "two", MemoryType::Fact)).is_ok());
    }

    #[test]
    fn record_access_bumps_stats() {
        let store = InMemoryStore::default();
        let s = session("s");
        let id = store.persist(new_memory(&s, "hit", MemoryType::Fact)).expect("persist");
        store.record_access(&s, id).expect("record");
        let record = store.get(&s, id).expect("get");
        assert_eq!(record.access_count, 1);
        assert!(record.last_accessed.is_some());
    }
}
