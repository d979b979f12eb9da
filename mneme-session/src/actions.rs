//! Request shapes for `remember`, `recall` and `forget`, and their validation.
//!
//! Requests arrive from an agent's tool calls, so enum-valued fields are
//! plain strings until validated. Every check here runs before the store is
//! touched.

use mneme_core::config::{RecallConfig, RememberConfig};
use mneme_core::error::{MemoryError, Result};
use mneme_core::retrieval::SearchMode;
use mneme_core::taxonomy::MemoryType;
use mneme_core::types::{MemoryId, clamp_to_unit};
use serde::{Deserialize, Serialize};

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn has_forbidden_chars(s: &str) -> bool {
    s.chars().any(|c| c.is_control() && !c.is_whitespace())
}

// ---------------------------------------------------------------------------
// Remember
// ---------------------------------------------------------------------------

/// Optional fields of a `remember` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RememberOptions {
    /// Memory type name. Defaults to `fact`.
    pub memory_type: Option<String>,
    /// Confidence, clamped to `[0, 1]`. Defaults to `remember.default_confidence`.
    pub confidence: Option<f32>,
    /// Why this is worth remembering.
    pub rationale: Option<String>,
}

impl RememberOptions {
    /// Set the memory type.
    #[must_use]
    pub fn memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type.as_str().to_string());
        self
    }

    /// Set the confidence.
    #[must_use]
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set the rationale.
    #[must_use]
    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// A `remember` call that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRemember {
    /// Trimmed content.
    pub content: String,
    /// Parsed type.
    pub memory_type: MemoryType,
    /// Clamped confidence.
    pub confidence: f32,
    /// Trimmed rationale, if non-empty.
    pub rationale: Option<String>,
}

/// Validate `content` and `options` against `config`.
///
/// # Errors
///
/// `empty_content`, `content_too_long`, `invalid_content` or
/// `invalid_memory_type`.
pub fn validate_remember(
    content: &str,
    options: &RememberOptions,
    config: &RememberConfig,
) -> Result<ValidRemember> {
    let content = content.trim();
    if content.is_empty() {
        return Err(MemoryError::EmptyContent);
    }
    let len = char_len(content);
    if len > config.max_content_len {
        return Err(MemoryError::ContentTooLong {
            len,
            max: config.max_content_len,
        });
    }
    if has_forbidden_chars(content) {
        return Err(MemoryError::InvalidContent {
            reason: "control characters are not allowed".into(),
        });
    }

    let memory_type = match options.memory_type.as_deref() {
        Some(name) => name.parse::<MemoryType>()?,
        None => MemoryType::Fact,
    };

    let rationale = match options.rationale.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => {
            let len = char_len(r);
            if len > config.max_rationale_len {
                return Err(MemoryError::ContentTooLong {
                    len,
                    max: config.max_rationale_len,
                });
            }
            if has_forbidden_chars(r) {
                return Err(MemoryError::InvalidContent {
                    reason: "control characters are not allowed in rationale".into(),
                });
            }
            Some(r.to_string())
        }
        _ => None,
    };

    Ok(ValidRemember {
        content: content.to_string(),
        memory_type,
        confidence: clamp_to_unit(options.confidence.unwrap_or(config.default_confidence)),
        rationale,
    })
}

/// Result of a successful `remember`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RememberResponse {
    /// Id of the new memory.
    pub memory_id: MemoryId,
    /// Type it was stored as.
    pub memory_type: MemoryType,
    /// Human-readable confirmation.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Recall
// ---------------------------------------------------------------------------

/// A `recall` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallRequest {
    /// Search text. Absent or blank lists the newest memories.
    pub query: Option<String>,
    /// `text`, `semantic` or `hybrid`. Defaults to `hybrid`.
    pub search_mode: Option<String>,
    /// Restrict to one memory type.
    pub memory_type: Option<String>,
    /// Minimum confidence, clamped. Defaults to `recall.default_min_confidence`.
    pub min_confidence: Option<f32>,
    /// Maximum results. Defaults to `recall.default_limit`.
    pub limit: Option<usize>,
}

impl RecallRequest {
    /// Request matching `query`.
    #[must_use]
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    /// Set the search mode.
    #[must_use]
    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = Some(mode.as_str().to_string());
        self
    }

    /// Restrict to one type.
    #[must_use]
    pub fn of_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type.as_str().to_string());
        self
    }

    /// Set the minimum confidence.
    #[must_use]
    pub fn min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    /// Set the result limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check the request against `config`.
    ///
    /// # Errors
    ///
    /// `limit_too_small`, `limit_too_large`, `query_too_long`,
    /// `invalid_search_mode` or `invalid_memory_type`.
    pub fn validate(&self, config: &RecallConfig) -> Result<RecallPlan> {
        let limit = self.limit.unwrap_or(config.default_limit);
        if limit == 0 {
            return Err(MemoryError::LimitTooSmall { limit });
        }
        if limit > config.max_limit {
            return Err(MemoryError::LimitTooLarge {
                limit,
                max: config.max_limit,
            });
        }

        let query = match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let len = char_len(q);
                if len > config.max_query_len {
                    return Err(MemoryError::QueryTooLong {
                        len,
                        max: config.max_query_len,
                    });
                }
                Some(q.to_string())
            }
            _ => None,
        };

        let mode = match self.search_mode.as_deref() {
            Some(name) => name.parse::<SearchMode>()?,
            None => SearchMode::default(),
        };
        let memory_type = self
            .memory_type
            .as_deref()
            .map(str::parse::<MemoryType>)
            .transpose()?;

        Ok(RecallPlan {
            query,
            mode,
            memory_type,
            min_confidence: clamp_to_unit(self.min_confidence.unwrap_or(config.default_min_confidence)),
            limit,
        })
    }
}

/// A validated `recall`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallPlan {
    /// Trimmed, non-empty query.
    pub query: Option<String>,
    /// Ranking mode.
    pub mode: SearchMode,
    /// Type filter.
    pub memory_type: Option<MemoryType>,
    /// Confidence floor.
    pub min_confidence: f32,
    /// Result count, in `[1, max_limit]`.
    pub limit: usize,
}

// ---------------------------------------------------------------------------
// Forget
// ---------------------------------------------------------------------------

/// Optional fields of a `forget` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgetOptions {
    /// Why the memory no longer holds.
    pub reason: Option<String>,
    /// Memory that replaces it.
    pub replacement_id: Option<MemoryId>,
}

impl ForgetOptions {
    /// Set the reason.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the replacement.
    #[must_use]
    pub fn replaced_by(mut self, id: MemoryId) -> Self {
        self.replacement_id = Some(id);
        self
    }

    /// Check the reason length.
    ///
    /// # Errors
    ///
    /// `reason_too_long`.
    pub fn validate(&self, config: &RememberConfig) -> Result<()> {
        if let Some(reason) = &self.reason {
            let len = char_len(reason.trim());
            if len > config.max_reason_len {
                return Err(MemoryError::ReasonTooLong {
                    len,
                    max: config.max_reason_len,
                });
            }
        }
        Ok(())
    }
}

/// Result of a successful `forget`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgetResponse {
    /// Always `true`; failures are errors.
    pub forgotten: bool,
    /// The superseded memory.
    pub memory_id: MemoryId,
    /// Human-readable confirmation.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
