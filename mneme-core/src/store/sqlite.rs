//! `SQLite`-backed [`LongTermStore`].
//!
//! One row per memory. Scalar fields get their own columns so filters run in
//! SQL; the evidence list is a JSON text column.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memories (
//!     seq            INTEGER PRIMARY KEY AUTOINCREMENT,
//!     id             TEXT NOT NULL UNIQUE,
//!     session_id     TEXT NOT NULL,
//!     content        TEXT NOT NULL,
//!     memory_type    TEXT NOT NULL,
//!     confidence     REAL NOT NULL,
//!     source_type    TEXT NOT NULL,
//!     evidence       TEXT NOT NULL,
//!     rationale      TEXT,
//!     created_at     TEXT NOT NULL,
//!     superseded     INTEGER NOT NULL DEFAULT 0,
//!     superseded_by  TEXT,
//!     superseded_at  TEXT,
//!     access_count   INTEGER NOT NULL DEFAULT 0,
//!     last_accessed  TEXT
//! );
//! ```
//!
//! - WAL mode for concurrent readers.
//! - `seq` gives a stable newest-first order even when timestamps tie.
//! - Supersede is a single `UPDATE`, so the flag and its metadata change
//!   together.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use tracing::{debug, info};

use super::{LongTermStore, NewMemory, PersistedMemory, QueryOptions, StoreError};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::taxonomy::{MemoryType, SourceType};
use crate::types::{MemoryId, SessionId};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memories (
        seq            INTEGER PRIMARY KEY AUTOINCREMENT,
        id             TEXT NOT NULL UNIQUE,
        session_id     TEXT NOT NULL,
        content        TEXT NOT NULL,
        memory_type    TEXT NOT NULL,
        confidence     REAL NOT NULL,
        source_type    TEXT NOT NULL,
        evidence       TEXT NOT NULL,
        rationale      TEXT,
        created_at     TEXT NOT NULL,
        superseded     INTEGER NOT NULL DEFAULT 0,
        superseded_by  TEXT,
        superseded_at  TEXT,
        access_count   INTEGER NOT NULL DEFAULT 0,
        last_accessed  TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_memories_session
        ON memories (session_id, superseded, seq);
";

const COLUMNS: &str = "id, session_id, content, memory_type, confidence, source_type, evidence, \
     rationale, created_at, superseded, superseded_by, superseded_at, access_count, last_accessed";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Raw column values, decoded into domain types outside the rusqlite closure.
struct RawRow {
    id: String,
    session_id: String,
    content: String,
    memory_type: String,
    confidence: f64,
    source_type: String,
    evidence: String,
    rationale: Option<String>,
    created_at: String,
    superseded: bool,
    superseded_by: Option<String>,
    superseded_at: Option<String>,
    access_count: i64,
    last_accessed: Option<String>,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            content: row.get(2)?,
            memory_type: row.get(3)?,
            confidence: row.get(4)?,
            source_type: row.get(5)?,
            evidence: row.get(6)?,
            rationale: row.get(7)?,
            created_at: row.get(8)?,
            superseded: row.get(9)?,
            superseded_by: row.get(10)?,
            superseded_at: row.get(11)?,
            access_count: row.get(12)?,
            last_accessed: row.get(13)?,
        })
    }

    fn decode(self) -> std::result::Result<PersistedMemory, StoreError> {
        let corrupt = |what: &str, detail: String| {
            StoreError::StorageFailure(format!("corrupt {what} column: {detail}"))
        };
        let parse_id = |raw: &str| {
            raw.parse::<MemoryId>()
                .map_err(|e| corrupt("id", e.to_string()))
        };

        #[allow(clippy::cast_possible_truncation)]
        let confidence = self.confidence as f32;

        Ok(PersistedMemory {
            id: parse_id(&self.id)?,
            session_id: SessionId::parse(&self.session_id)
                .map_err(|e| corrupt("session_id", e.to_string()))?,
            content: self.content,
            memory_type: self
                .memory_type
                .parse::<MemoryType>()
                .map_err(|e| corrupt("memory_type", e.to_string()))?,
            confidence,
            source_type: self
                .source_type
                .parse::<SourceType>()
                .map_err(|e| corrupt("source_type", e.to_string()))?,
            evidence: serde_json::from_str(&self.evidence)
                .map_err(|e| corrupt("evidence", e.to_string()))?,
            rationale: self.rationale,
            created_at: parse_time(&self.created_at)?,
            superseded: self.superseded,
            superseded_by: self.superseded_by.as_deref().map(parse_id).transpose()?,
            superseded_at: self.superseded_at.as_deref().map(parse_time).transpose()?,
            access_count: u32::try_from(self.access_count).unwrap_or(u32::MAX),
            last_accessed: self.last_accessed.as_deref().map(parse_time).transpose()?,
        })
    }
}

fn parse_time(raw: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::StorageFailure(format!("corrupt timestamp: {e}")))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Handle to an open `SQLite` database holding long-term memories.
///
/// The connection is serialized behind a mutex; every trait call is one short
/// critical section.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    max_per_session: usize,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("max_per_session", &self.max_per_session)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::MemoryError::Database`] on `SQLite` failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "sqlite memory store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            max_per_session: config.max_memories_per_session,
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`crate::MemoryError::Database`] on `SQLite` failures.
    pub fn open_in_memory(max_per_session: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_per_session,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn select(
        &self,
        sql: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> std::result::Result<Vec<PersistedMemory>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(bind, RawRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.decode()?);
        }
        Ok(out)
    }
}

impl LongTermStore for SqliteStore {
    fn persist(&self, memory: NewMemory) -> std::result::Result<MemoryId, StoreError> {
        if memory.content.trim().is_empty() {
            return Err(StoreError::ValidationFailure("content is empty".into()));
        }
        let start = Instant::now();
        let evidence = serde_json::to_string(&memory.evidence)
            .map_err(|e| StoreError::ValidationFailure(e.to_string()))?;
        let record = PersistedMemory::from_new(memory, Utc::now());

        let conn = self.conn.lock();
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE session_id = ?1",
            params![record.session_id.as_str()],
            |row| row.get(0),
        )?;
        if usize::try_from(existing).unwrap_or(usize::MAX) >= self.max_per_session {
            return Err(StoreError::LimitExceeded {
                limit: self.max_per_session,
            });
        }

        conn.execute(
            &format!(
                "INSERT INTO memories ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, NULL, 0, NULL)"
            ),
            params![
                record.id.to_string(),
                record.session_id.as_str(),
                record.content,
                record.memory_type.as_str(),
                f64::from(record.confidence),
                record.source_type.as_str(),
                evidence,
                record.rationale,
                record.created_at.to_rfc3339(),
            ],
        )?;

        debug!(
            session = %record.session_id,
            id = %record.id,
            memory_type = %record.memory_type,
            elapsed_us = start.elapsed().as_micros(),
            "persisted memory"
        );
        Ok(record.id)
    }

    fn query(
        &self,
        session_id: &SessionId,
        options: QueryOptions,
    ) -> std::result::Result<Vec<PersistedMemory>, StoreError> {
        self.select(
            &format!(
                "SELECT {COLUMNS} FROM memories
                 WHERE session_id = ?1 AND confidence >= ?2 AND (?3 OR superseded = 0)
                 ORDER BY seq DESC LIMIT ?4"
            ),
            &[
                &session_id.as_str(),
                &f64::from(options.min_confidence),
                &options.include_superseded,
                &sql_limit(options.limit),
            ],
        )
    }

    fn query_by_type(
        &self,
        session_id: &SessionId,
        memory_type: MemoryType,
        options: QueryOptions,
    ) -> std::result::Result<Vec<PersistedMemory>, StoreError> {
        self.select(
            &format!(
                "SELECT {COLUMNS} FROM memories
                 WHERE session_id = ?1 AND confidence >= ?2 AND (?3 OR superseded = 0)
                   AND memory_type = ?5
                 ORDER BY seq DESC LIMIT ?4"
            ),
            &[
                &session_id.as_str(),
                &f64::from(options.min_confidence),
                &options.include_superseded,
                &sql_limit(options.limit),
                &memory_type.as_str(),
            ],
        )
    }

    fn get(
        &self,
        session_id: &SessionId,
        id: MemoryId,
    ) -> std::result::Result<PersistedMemory, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLUMNS} FROM memories WHERE session_id = ?1 AND id = ?2"
        ))?;
        let raw = stmt
            .query_row(params![session_id.as_str(), id.to_string()], RawRow::read)
            .optional()?;
        raw.ok_or(StoreError::NotFound(id))?.decode()
    }

    fn supersede(
        &self,
        session_id: &SessionId,
        id: MemoryId,
        replacement: Option<MemoryId>,
    ) -> std::result::Result<(), StoreError> {
        let changed = self.conn.lock().execute(
            "UPDATE memories
             SET superseded = 1, superseded_by = ?3, superseded_at = ?4
             WHERE session_id = ?1 AND id = ?2",
            params![
                session_id.as_str(),
                id.to_string(),
                replacement.map(|r| r.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn record_access(
        &self,
        session_id: &SessionId,
        id: MemoryId,
    ) -> std::result::Result<(), StoreError> {
        let changed = self.conn.lock().execute(
            "UPDATE memories
             SET access_count = access_count + 1, last_accessed = ?3
             WHERE session_id = ?1 AND id = ?2",
            params![session_id.as_str(), id.to_string(), Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn count(&self, session_id: &SessionId) -> std::result::Result<usize, StoreError> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM memories WHERE session_id = ?1",
            params![session_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str) -> SessionId {
        SessionId::parse(name).expect("valid session id")
    }

    fn new_memory(session: &SessionId, content: &str) -> NewMemory {
        NewMemory {
            session_id: session.clone(),
            content: content.to_string(),
            memory_type: MemoryType::ArchitecturalDecision,
            confidence: 0.85,
            source_type: SourceType::Tool,
            evidence: vec!["ADR-7".to_string(), "design review".to_string()],
            rationale: Some("keeps the write path simple".to_string()),
        }
    }

    #[test]
    fn round_trip_persist_get() {
        let store = SqliteStore::open_in_memory(100).expect("open");
        let s = session("sess-1");
        let id = store.persist(new_memory(&s, "Use a single writer task")).expect("persist");

        let loaded = store.get(&s, id).expect("get");
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.content, "Use a single writer task");
        assert_eq!(loaded.memory_type, MemoryType::ArchitecturalDecision);
        assert_eq!(loaded.source_type, SourceType::Tool);
        assert_eq!(loaded.evidence, vec!["ADR-7", "design review"]);
        assert!((loaded.confidence - 0.85).abs() < 1e-6);
        assert!(!loaded.superseded);
    }

    #[test]
    fn query_filters_and_orders() {
        let store = SqliteStore::open_in_memory(100).expect("open");
        let s = session("sess-1");
        let a = store.persist(new_memory(&s, "first")).expect("persist");
        let b = store.persist(new_memory(&s, "second")).expect("persist");
        let mut low = new_memory(&s, "low confidence");
        low.confidence = 0.2;
        store.persist(low).expect("persist");

        let opts = QueryOptions { min_confidence: 0.5, ..QueryOptions::default() };
        let ids: Vec<_> = store.query(&s, opts).expect("query").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![b, a]);

        let typed = store
            .query_by_type(&s, MemoryType::Fact, QueryOptions::default())
            .expect("query");
        assert!(typed.is_empty());
    }

    #[test]
    fn supersede_is_soft() {
        let store = SqliteStore::open_in_memory(100).expect("open");
        let s = session("sess-1");
        let old = store.persist(new_memory(&s, "old")).expect("persist");
        let new = store.persist(new_memory(&s, "new")).expect("persist");
        store.supersede(&s, old, Some(new)).expect("supersede");

        let visible = store.query(&s, QueryOptions::default()).expect("query");
        assert_eq!(visible.len(), 1);
        let all = store
            .query(&s, QueryOptions { include_superseded: true, ..QueryOptions::default() })
            .expect("query");
        assert_eq!(all.len(), 2);

        let record = store.get(&s, old).expect("get");
        assert!(record.superseded);
        assert_eq!(record.superseded_by, Some(new));
        assert!(record.superseded_at.is_some());

        let missing = MemoryId::new();
        assert_eq!(store.supersede(&s, missing, None), Err(StoreError::NotFound(missing)));
    }

    #[test]
    fn limit_and_count() {
        let store = SqliteStore::open_in_memory(2).expect("open");
        let s = session("sess-1");
        store.persist(new_memory(&s, "one")).expect("persist");
        store.persist(new_memory(&s, "two")).expect("persist");
        assert_eq!(
            store.persist(new_memory(&s, "three")),
            Err(StoreError::LimitExceeded { limit: 2 })
        );
        assert_eq!(store.count(&s).expect("count"), 2);
        assert_eq!(store.count(&session("other")).expect("count"), 0);
    }

    #[test]
    fn record_access_updates_row() {
        let store = SqliteStore::open_in_memory(100).expect("open");
        let s = session("sess-1");
        let id = store.persist(new_memory(&s, "hit")).expect("persist");
        store.record_access(&s, id).expect("record");
        store.record_access(&s, id).expect("record");
        let record = store.get(&s, id).expect("get");
        assert_eq!(record.access_count, 2);
        assert!(record.last_accessed.is_some());
        assert!(matches!(
            store.record_access(&s, MemoryId::new()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn file_based_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("mneme.db");
        let config = StoreConfig::default();
        let s = session("sess-1");

        let id = {
            let store = SqliteStore::open(&db_path, &config).expect("open");
            assert_eq!(store.db_path(), db_path.as_path());
            store.persist(new_memory(&s, "survives restart")).expect("persist")
        };

        let reopened = SqliteStore::open(&db_path, &config).expect("reopen");
        assert_eq!(reopened.get(&s, id).expect("get").content, "survives restart");
        assert_eq!(reopened.count(&s).expect("count"), 1);
    }
}
