//! Long-term memory store.
//!
//! The pipeline talks to durable storage only through [`LongTermStore`].
//! Two implementations ship with the crate:
//!
//! - [`InMemoryStore`] — process-local, for tests and ephemeral sessions.
//! - [`SqliteStore`] — single-file `SQLite` database.
//!
//! Records are soft-deleted via [`LongTermStore::supersede`]; nothing here
//! ever hard-deletes a memory.

mod memory;
mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::taxonomy::{MemoryType, SourceType};
use crate::types::{MemoryId, SessionId};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Default per-session cap on persisted memories.
pub const DEFAULT_MAX_MEMORIES_PER_SESSION: usize = 10_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`LongTermStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend failure. The reason is opaque to callers.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The session already holds `limit` memories.
    #[error("session memory limit reached ({limit})")]
    LimitExceeded {
        /// Configured cap.
        limit: usize,
    },

    /// The record was rejected before storage.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// No such memory in this session.
    #[error("memory not found: {0}")]
    NotFound(MemoryId),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageFailure(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Input to [`LongTermStore::persist`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    /// Owning session.
    pub session_id: SessionId,
    /// Memory text.
    pub content: String,
    /// Taxonomy type.
    pub memory_type: MemoryType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Provenance.
    pub source_type: SourceType,
    /// Supporting evidence.
    pub evidence: Vec<String>,
    /// Why it was stored.
    pub rationale: Option<String>,
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMemory {
    /// Unique id.
    pub id: MemoryId,
    /// Owning session.
    pub session_id: SessionId,
    /// Memory text.
    pub content: String,
    /// Taxonomy type.
    pub memory_type: MemoryType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Provenance.
    pub source_type: SourceType,
    /// Supporting evidence.
    pub evidence: Vec<String>,
    /// Why it was stored.
    pub rationale: Option<String>,
    /// When it was persisted.
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag.
    pub superseded: bool,
    /// Memory that replaced this one.
    pub superseded_by: Option<MemoryId>,
    /// When it was superseded.
    pub superseded_at: Option<DateTime<Utc>>,
    /// Times it was returned by recall.
    pub access_count: u32,
    /// Last recall hit.
    pub last_accessed: Option<DateTime<Utc>>,
}

impl PersistedMemory {
    /// Build a fresh record from a [`NewMemory`].
    #[must_use]
    pub fn from_new(memory: NewMemory, now: DateTime<Utc>) -> Self {
        Self {
            id: MemoryId::new(),
            session_id: memory.session_id,
            content: memory.content,
            memory_type: memory.memory_type,
            confidence: memory.confidence,
            source_type: memory.source_type,
            evidence: memory.evidence,
            rationale: memory.rationale,
            created_at: now,
            superseded: false,
            superseded_by: None,
            superseded_at: None,
            access_count: 0,
            last_accessed: None,
        }
    }
}

/// Filters for [`LongTermStore::query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    /// Drop memories below this confidence.
    pub min_confidence: f32,
    /// Maximum number of results.
    pub limit: usize,
    /// Include soft-deleted memories.
    pub include_superseded: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            limit: 50,
            include_superseded: false,
        }
    }
}

impl QueryOptions {
    /// Whether `memory` passes the confidence and superseded filters.
    #[must_use]
    pub fn admits(&self, memory: &PersistedMemory) -> bool {
        (self.include_superseded || !memory.superseded) && memory.confidence >= self.min_confidence
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Durable, session-scoped memory storage.
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// session actor.
pub trait LongTermStore: Send + Sync {
    /// Store a new memory and return its id.
    ///
    /// # Errors
    /// [`StoreError::LimitExceeded`] when the session is full,
    /// [`StoreError::ValidationFailure`] for rejected content,
    /// [`StoreError::StorageFailure`] for backend errors.
    fn persist(&self, memory: NewMemory) -> Result<MemoryId, StoreError>;

    /// Memories of a session, newest first.
    ///
    /// # Errors
    /// [`StoreError::StorageFailure`] for backend errors.
    fn query(
        &self,
        session_id: &SessionId,
        options: QueryOptions,
    ) -> Result<Vec<PersistedMemory>, StoreError>;

    /// Memories of one type, newest first.
    ///
    /// # Errors
    /// [`StoreError::StorageFailure`] for backend errors.
    fn query_by_type(
        &self,
        session_id: &SessionId,
        memory_type: MemoryType,
        options: QueryOptions,
    ) -> Result<Vec<PersistedMemory>, StoreError>;

    /// Fetch one memory, superseded or not.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the session has no such memory.
    fn get(&self, session_id: &SessionId, id: MemoryId) -> Result<PersistedMemory, StoreError>;

    /// Soft-delete a memory, optionally pointing at its replacement.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the session has no such memory.
    fn supersede(
        &self,
        session_id: &SessionId,
        id: MemoryId,
        replacement: Option<MemoryId>,
    ) -> Result<(), StoreError>;

    /// Bump the access statistics of a memory.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] or [`StoreError::StorageFailure`]. Callers
    /// treat this as best-effort.
    fn record_access(&self, session_id: &SessionId, id: MemoryId) -> Result<(), StoreError>;

    /// Number of memories held for a session, superseded ones included.
    ///
    /// # Errors
    /// [`StoreError::StorageFailure`] for backend errors.
    fn count(&self, session_id: &SessionId) -> Result<usize, StoreError>;
}

/// Open the backend named by `config.backend`.
///
/// # Errors
/// `MemoryError::Config` for an unknown backend name, or the backend's own
/// open error.
pub fn open_store(config: &StoreConfig) -> crate::error::Result<Arc<dyn LongTermStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new(config.max_memories_per_session))),
        "sqlite" => Ok(Arc::new(SqliteStore::open(&config.path, config)?)),
        other => Err(crate::error::MemoryError::Config(format!(
            "unknown store backend: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_options_filter() {
        let session = SessionId::parse("s1").expect("valid");
        let mut memory = PersistedMemory::from_new(
            NewMemory {
                session_id: session,
                content: "x".into(),
                memory_type: MemoryType::Fact,
                confidence: 0.4,
                source_type: SourceType::Agent,
                evidence: vec![],
                rationale: None,
            },
            Utc::now(),
        );
        let opts = QueryOptions { min_confidence: 0.5, ..QueryOptions::default() };
        assert!(!opts.admits(&memory));
        memory.confidence = 0.6;
        assert!(opts.admits(&memory));
        memory.superseded = true;
        assert!(!opts.admits(&memory));
        assert!(QueryOptions { include_superseded: true, ..opts }.admits(&memory));
    }

    #[test]
    fn unknown_backend_rejected() {
        let config = StoreConfig { backend: "redis".into(), ..StoreConfig::default() };
        assert!(open_store(&config).is_err());
    }
}
