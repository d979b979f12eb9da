//! # Mneme Core Library
//!
//! Session-scoped memory primitives for coding agents.
//!
//! A session's memory flows through three stages:
//!
//! - **Working context** — what the agent understands right now, keyed by a
//!   closed set of [`ContextKey`]s.
//! - **Staging** — [`PendingMemories`], a bounded area where candidates wait
//!   until the promotion engine decides they deserve durable storage.
//! - **Long-term store** — anything implementing [`LongTermStore`], searched
//!   by text, TF-IDF similarity, or a blend of both.
//!
//! The async orchestration (per-session actors, promotion scheduling,
//! remember / recall / forget) lives in `mneme-session`; everything here is
//! synchronous and runtime-agnostic.
//!
//! ## Performance Contract
//!
//! - Working-context put / get: O(1)
//! - Access-log record: O(1)
//! - Staging insert with eviction: O(n) over ≤ 500 items
//! - Hybrid ranking of 50 candidates: < 1ms

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod access_log;
pub mod config;
pub mod embedding;
pub mod error;
pub mod metrics;
pub mod pending;
pub mod retrieval;
pub mod scoring;
pub mod store;
pub mod taxonomy;
pub mod types;
pub mod working_context;

pub use access_log::{AccessEntry, AccessKey, AccessLog, AccessType};
pub use config::MnemeConfig;
pub use embedding::{EmbeddingProvider, TfIdfEmbedder};
pub use error::{MemoryError, Result};
pub use pending::{PendingId, PendingItem, PendingMemories};
pub use retrieval::{MemoryView, Ranking, RetrievalEngine, SearchMode};
pub use scoring::ImportanceScorer;
pub use store::{InMemoryStore, LongTermStore, NewMemory, PersistedMemory, SqliteStore, StoreError};
pub use taxonomy::{
    ConfidenceLevel, ContextKey, ContextSource, MemoryCategory, MemoryType, SourceType,
    SuggestedBy,
};
pub use types::*;
pub use working_context::{ContextItem, PutOptions, WorkingContext};
