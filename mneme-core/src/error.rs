//! Error types for the Mneme core library.
//!
//! Every variant carries a stable tag (see [`MemoryError::tag`]) so callers
//! can surface short deterministic messages instead of raw error chains.

use thiserror::Error;

use crate::store::StoreError;
use crate::types::MemoryId;

/// Top-level error type for all Mneme operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// No session identifier was supplied.
    #[error("Missing session id")]
    MissingSessionId,

    /// The session identifier failed validation.
    #[error("Invalid session id: must match [A-Za-z0-9_-] and be 1-128 chars")]
    InvalidSessionId,

    /// Content was empty after trimming.
    #[error("Content is empty")]
    EmptyContent,

    /// Content contained characters that cannot be stored.
    #[error("Invalid content: {reason}")]
    InvalidContent {
        /// Why the content was rejected.
        reason: String,
    },

    /// Content exceeded the configured length limit.
    #[error("Content too long: {len} chars (max: {max})")]
    ContentTooLong {
        /// Length of the rejected content, in chars.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Memory type name is not part of the taxonomy.
    #[error("Invalid memory type: {0}")]
    InvalidMemoryType(String),

    /// Context key name is not registered.
    #[error("Invalid context key: {0}")]
    InvalidContextKey(String),

    /// Recall limit below 1.
    #[error("Limit too small: {limit} (min: 1)")]
    LimitTooSmall {
        /// Requested limit.
        limit: usize,
    },

    /// Recall limit above the configured maximum.
    #[error("Limit too large: {limit} (max: {max})")]
    LimitTooLarge {
        /// Requested limit.
        limit: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Query string exceeded the configured length limit.
    #[error("Query too long: {len} chars (max: {max})")]
    QueryTooLong {
        /// Length of the rejected query.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Search mode name is not one of text / semantic / hybrid.
    #[error("Invalid search mode: {0}")]
    InvalidSearchMode(String),

    /// The target memory does not exist in this session.
    #[error("Memory not found: {0}")]
    MemoryNotFound(MemoryId),

    /// The replacement memory given to `forget` does not exist.
    #[error("Replacement memory not found: {0}")]
    ReplacementNotFound(MemoryId),

    /// Forget reason exceeded the configured length limit.
    #[error("Reason too long: {len} chars (max: {max})")]
    ReasonTooLong {
        /// Length of the rejected reason.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// The session already holds the maximum number of long-term memories.
    #[error("Session memory limit exceeded (limit: {limit})")]
    SessionMemoryLimitExceeded {
        /// Configured per-session limit.
        limit: usize,
    },

    /// Opaque failure reported by the long-term store.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Text produced no indexable tokens, so no embedding exists for it.
    #[error("Text has no indexable tokens")]
    EmptyEmbedding,

    /// The session actor is gone (stopped or panicked).
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `SQLite` persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Stable machine-readable tag for this error.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MissingSessionId => "missing_session_id",
            Self::InvalidSessionId => "invalid_session_id",
            Self::EmptyContent => "empty_content",
            Self::InvalidContent { .. } => "invalid_content",
            Self::ContentTooLong { .. } => "content_too_long",
            Self::InvalidMemoryType(_) => "invalid_memory_type",
            Self::InvalidContextKey(_) => "invalid_context_key",
            Self::LimitTooSmall { .. } => "limit_too_small",
            Self::LimitTooLarge { .. } => "limit_too_large",
            Self::QueryTooLong { .. } => "query_too_long",
            Self::InvalidSearchMode(_) => "invalid_search_mode",
            Self::MemoryNotFound(_) => "memory_not_found",
            Self::ReplacementNotFound(_) => "replacement_not_found",
            Self::ReasonTooLong { .. } => "reason_too_long",
            Self::SessionMemoryLimitExceeded { .. } => "session_memory_limit_exceeded",
            Self::Storage(_) => "storage_failure",
            Self::EmptyEmbedding => "empty_embedding",
            Self::SessionUnavailable(_) => "session_unavailable",
            Self::Config(_) => "config",
            Self::Database(_) => "database",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    /// Short user-facing message derived from the tag.
    ///
    /// Never includes store internals or error chains.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingSessionId => "A session id is required.",
            Self::InvalidSessionId => "The session id is not valid.",
            Self::EmptyContent => "Memory content cannot be empty.",
            Self::InvalidContent { .. } => "Memory content contains invalid characters.",
            Self::ContentTooLong { .. } => "Memory content is too long.",
            Self::InvalidMemoryType(_) => "Unknown memory type.",
            Self::InvalidContextKey(_) => "Unknown context key.",
            Self::LimitTooSmall { .. } => "Limit must be at least 1.",
            Self::LimitTooLarge { .. } => "Limit is too large.",
            Self::QueryTooLong { .. } => "Query is too long.",
            Self::InvalidSearchMode(_) => "Search mode must be text, semantic or hybrid.",
            Self::MemoryNotFound(_) => "Memory not found.",
            Self::ReplacementNotFound(_) => "Replacement memory not found.",
            Self::ReasonTooLong { .. } => "Reason is too long.",
            Self::SessionMemoryLimitExceeded { .. } => "This session has reached its memory limit.",
            Self::Storage(_) | Self::Database(_) | Self::Serialization(_) | Self::Io(_) => {
                "Memory storage is unavailable."
            }
            Self::EmptyEmbedding => "Text has no searchable terms.",
            Self::SessionUnavailable(_) => "Session is not running.",
            Self::Config(_) => "Memory configuration is invalid.",
        }
    }
}

impl From<StoreError> for MemoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::MemoryNotFound(id),
            StoreError::LimitExceeded { limit } => Self::SessionMemoryLimitExceeded { limit },
            StoreError::ValidationFailure(reason) => Self::InvalidContent { reason },
            StoreError::StorageFailure(reason) => Self::Storage(reason),
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MemoryError>;
