//! Bounded, newest-first log of working-context and memory accesses.
//!
//! Feeds the recency / frequency signals of the importance scorer. The log
//! never fails: absent keys simply report zero or `None`.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::taxonomy::ContextKey;
use crate::types::MemoryId;

/// Default cap on retained entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// What was accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccessKey {
    /// A working-context slot.
    Context(ContextKey),
    /// A persisted long-term memory (recall hits).
    Memory(MemoryId),
}

impl From<ContextKey> for AccessKey {
    fn from(key: ContextKey) -> Self {
        Self::Context(key)
    }
}

impl From<MemoryId> for AccessKey {
    fn from(id: MemoryId) -> Self {
        Self::Memory(id)
    }
}

/// Kind of access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Value was read.
    Read,
    /// Value was written.
    Write,
    /// Value was returned by a recall query.
    Query,
}

/// A single immutable log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    /// What was accessed.
    pub key: AccessKey,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// How it was accessed.
    pub access_type: AccessType,
}

/// Per-type access counts for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTypeCounts {
    /// Number of reads.
    pub read: usize,
    /// Number of writes.
    pub write: usize,
    /// Number of query hits.
    pub query: usize,
}

/// Ring buffer of [`AccessEntry`], index 0 newest.
#[derive(Debug, Clone)]
pub struct AccessLog {
    entries: VecDeque<AccessEntry>,
    max_entries: usize,
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl AccessLog {
    /// Create an empty log holding at most `max_entries` (minimum 1).
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: VecDeque::with_capacity(max_entries.min(DEFAULT_MAX_ENTRIES)),
            max_entries,
        }
    }

    /// Record an access now.
    pub fn record(&mut self, key: impl Into<AccessKey>, access_type: AccessType) {
        self.record_at(key, access_type, Utc::now());
    }

    /// Record an access with an explicit timestamp.
    pub fn record_at(
        &mut self,
        key: impl Into<AccessKey>,
        access_type: AccessType,
        timestamp: DateTime<Utc>,
    ) {
        self.entries.push_front(AccessEntry {
            key: key.into(),
            timestamp,
            access_type,
        });
        if self.entries.len() > self.max_entries {
            self.entries.pop_back();
        }
    }

    /// Number of retained entries for `key`, across all access types.
    #[must_use]
    pub fn frequency(&self, key: impl Into<AccessKey>) -> usize {
        let key = key.into();
        self.entries.iter().filter(|e| e.key == key).count()
    }

    /// Timestamp of the most recent access to `key`.
    #[must_use]
    pub fn recency(&self, key: impl Into<AccessKey>) -> Option<DateTime<Utc>> {
        let key = key.into();
        self.entries.iter().find(|e| e.key == key).map(|e| e.timestamp)
    }

    /// The `n` newest entries, newest first.
    #[must_use]
    pub fn recent_accesses(&self, n: usize) -> Vec<AccessEntry> {
        self.entries.iter().take(n).cloned().collect()
    }

    /// All retained entries for `key`, newest first.
    #[must_use]
    pub fn entries_for(&self, key: impl Into<AccessKey>) -> Vec<AccessEntry> {
        let key = key.into();
        self.entries.iter().filter(|e| e.key == key).cloned().collect()
    }

    /// Distinct keys present in the log.
    #[must_use]
    pub fn unique_keys(&self) -> HashSet<AccessKey> {
        self.entries.iter().map(|e| e.key).collect()
    }

    /// Read / write / query counts for `key`.
    #[must_use]
    pub fn access_type_counts(&self, key: impl Into<AccessKey>) -> AccessTypeCounts {
        let key = key.into();
        self.entries
            .iter()
            .filter(|e| e.key == key)
            .fold(AccessTypeCounts::default(), |mut acc, e| {
                match e.access_type {
                    AccessType::Read => acc.read += 1,
                    AccessType::Write => acc.write += 1,
                    AccessType::Query => acc.query += 1,
                }
                acc
            })
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Configured capacity.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}
