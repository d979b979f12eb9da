//! Memory retrieval — text, semantic and hybrid ranking of recall candidates.
//!
//! Candidates come from the long-term store already filtered by type,
//! confidence and supersession. The engine only orders and truncates them:
//!
//! - **text**: case-insensitive substring filter, store order kept.
//! - **semantic**: TF-IDF cosine against the query, below-floor hits dropped.
//! - **hybrid**: cosine for every candidate plus a fixed bonus for substring
//!   matches. No floor.
//!
//! Semantic and hybrid fall back to text when the query has no indexable
//! terms.

pub mod similarity;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RecallConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::MemoryError;
use crate::store::PersistedMemory;
use crate::taxonomy::MemoryType;
use crate::types::{MemoryId, RetrievalScore};

/// Similarity below which semantic hits are dropped.
pub const DEFAULT_SEMANTIC_FLOOR: f32 = 0.2;
/// Bonus added to substring matches in hybrid mode.
pub const DEFAULT_HYBRID_TEXT_BONUS: f32 = 0.5;

/// How recall ranks candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Substring matching only.
    Text,
    /// Cosine similarity only.
    Semantic,
    /// Cosine similarity boosted by substring matches.
    #[default]
    Hybrid,
}

impl SearchMode {
    /// Snake-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether this mode embeds the query.
    #[must_use]
    pub fn is_semantic(self) -> bool {
        matches!(self, Self::Semantic | Self::Hybrid)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(MemoryError::InvalidSearchMode(other.to_string())),
        }
    }
}

/// Public projection of a recalled memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryView {
    /// Memory id.
    pub id: MemoryId,
    /// Memory text.
    pub content: String,
    /// Taxonomy type.
    pub memory_type: MemoryType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// When the memory was stored.
    pub timestamp: DateTime<Utc>,
}

impl From<&PersistedMemory> for MemoryView {
    fn from(memory: &PersistedMemory) -> Self {
        Self {
            id: memory.id,
            content: memory.content.clone(),
            memory_type: memory.memory_type,
            confidence: memory.confidence,
            timestamp: memory.created_at,
        }
    }
}

/// A ranked recall hit.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    /// The memory.
    pub memory: PersistedMemory,
    /// Final ranking score. Text mode uses 1.0 for every hit.
    pub score: RetrievalScore,
    /// Whether the content contains the query verbatim.
    pub text_match: bool,
}

/// Output of [`RetrievalEngine::rank`].
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// Hits, best first.
    pub hits: Vec<RankedMemory>,
    /// The query had no indexable terms and text matching was used instead.
    pub fell_back: bool,
}

/// Orders recall candidates.
pub struct RetrievalEngine {
    semantic_floor: f32,
    hybrid_text_bonus: f32,
    overfetch_factor: usize,
    max_limit: usize,
}

impl Default for RetrievalEngine {
    fn default() -> Self {
        Self::new(&RecallConfig::default())
    }
}

impl RetrievalEngine {
    /// Engine with ranking constants from `config`.
    #[must_use]
    pub fn new(config: &RecallConfig) -> Self {
        Self {
            semantic_floor: config.semantic_floor,
            hybrid_text_bonus: config.hybrid_text_bonus,
            overfetch_factor: config.overfetch_factor.max(1),
            max_limit: config.max_limit,
        }
    }

    /// How many candidates to fetch from the store for a request.
    #[must_use]
    pub fn fetch_limit(&self, mode: SearchMode, has_query: bool, limit: usize) -> usize {
        if has_query && mode.is_semantic() {
            limit
                .saturating_mul(self.overfetch_factor)
                .min(self.max_limit)
                .max(limit)
        } else {
            limit
        }
    }

    /// Rank `candidates` for `query` and keep the best `limit`.
    ///
    /// Never fails: a query without indexable terms degrades to text mode.
    pub fn rank(
        &self,
        mode: SearchMode,
        query: Option<&str>,
        candidates: Vec<PersistedMemory>,
        limit: usize,
        embedder: &dyn EmbeddingProvider,
    ) -> Ranking {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let Some(query) = query else {
            let hits = candidates
                .into_iter()
                .take(limit)
                .map(|memory| RankedMemory {
                    memory,
                    score: RetrievalScore::new(1.0),
                    text_match: false,
                })
                .collect();
            return Ranking { hits, fell_back: false };
        };

        let ranked = match mode {
            SearchMode::Text => Ok(Self::rank_text(query, candidates, limit)),
            SearchMode::Semantic | SearchMode::Hybrid => {
                match embedder.embed(query) {
                    Ok(query_vec) => {
                        let bonus = if mode == SearchMode::Hybrid {
                            Some(self.hybrid_text_bonus)
                        } else {
                            None
                        };
                        Ok(self.rank_similarity(query, &query_vec, candidates, limit, bonus, embedder))
                    }
                    Err(err) => Err((err, candidates)),
                }
            }
        };

        match ranked {
            Ok(hits) => Ranking { hits, fell_back: false },
            Err((err, candidates)) => {
                tracing::debug!(mode = %mode, error = %err, "query not embeddable, falling back to text");
                Ranking {
                    hits: Self::rank_text(query, candidates, limit),
                    fell_back: true,
                }
            }
        }
    }

    fn rank_text(query: &str, candidates: Vec<PersistedMemory>, limit: usize) -> Vec<RankedMemory> {
        let needle = query.to_lowercase();
        candidates
            .into_iter()
            .filter(|m| similarity::contains_ignore_case(&m.content, &needle))
            .take(limit)
            .map(|memory| RankedMemory {
                memory,
                score: RetrievalScore::new(1.0),
                text_match: true,
            })
            .collect()
    }

    fn rank_similarity(
        &self,
        query: &str,
        query_vec: &crate::types::Embedding,
        candidates: Vec<PersistedMemory>,
        limit: usize,
        text_bonus: Option<f32>,
        embedder: &dyn EmbeddingProvider,
    ) -> Vec<RankedMemory> {
        let needle = query.to_lowercase();
        let mut ranked: Vec<RankedMemory> = candidates
            .into_iter()
            .filter_map(|memory| {
                let sim = similarity::content_similarity(embedder, query_vec, &memory.content);
                let text_match = similarity::contains_ignore_case(&memory.content, &needle);
                let score = match text_bonus {
                    Some(bonus) if text_match => sim + bonus,
                    Some(_) => sim,
                    None if sim >= self.semantic_floor => sim,
                    None => return None,
                };
                Some(RankedMemory {
                    memory,
                    score: RetrievalScore::new(score),
                    text_match,
                })
            })
            .collect();
        // Stable: equal scores keep the store's newest-first order.
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked.truncate(limit);
        ranked
    }
}
