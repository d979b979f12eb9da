//! Importance scoring for staged and working-context memories.
//!
//! Score = w₁·Recency + w₂·Frequency + w₃·Confidence + w₄·Salience
//!
//! Where:
//!   Recency    = 1 / (1 + hours_since_last_access / 24)
//!   Frequency  = min(access_count / 10, 1)
//!   Confidence = stated confidence (0–1)
//!   Salience   = 1.0 for high-salience types, 0.3 for the rest, 0 if untyped

use chrono::{DateTime, Utc};

use crate::config::ImportanceWeights;
use crate::taxonomy::MemoryType;
use crate::types::clamp_to_unit;
use crate::working_context::ContextItem;

/// Access count at which the frequency factor saturates.
pub const FREQUENCY_CAP: f32 = 10.0;

/// Salience for types outside the high-salience set.
const BASELINE_SALIENCE: f32 = 0.3;

/// Per-factor contributions, each already weighted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImportanceBreakdown {
    /// Weighted recency.
    pub recency: f32,
    /// Weighted frequency.
    pub frequency: f32,
    /// Weighted confidence.
    pub confidence: f32,
    /// Weighted salience.
    pub salience: f32,
}

impl ImportanceBreakdown {
    /// Total score, clamped to `[0, 1]`.
    #[must_use]
    pub fn total(&self) -> f32 {
        clamp_to_unit(self.recency + self.frequency + self.confidence + self.salience)
    }
}

/// Computes importance scores from access statistics.
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    weights: ImportanceWeights,
}

impl ImportanceScorer {
    /// Scorer with the given weights.
    #[must_use]
    pub fn new(weights: ImportanceWeights) -> Self {
        Self { weights }
    }

    /// Weighted breakdown for raw signals.
    #[must_use]
    pub fn breakdown(
        &self,
        last_accessed: DateTime<Utc>,
        access_count: u32,
        confidence: f32,
        memory_type: Option<MemoryType>,
        now: DateTime<Utc>,
    ) -> ImportanceBreakdown {
        let w = &self.weights;
        ImportanceBreakdown {
            recency: w.recency * recency(last_accessed, now),
            frequency: w.frequency * frequency(access_count),
            confidence: w.confidence * clamp_to_unit(confidence),
            salience: w.salience * memory_type.map_or(0.0, salience),
        }
    }

    /// Score a working-context item.
    #[must_use]
    pub fn score_context_item(&self, item: &ContextItem, now: DateTime<Utc>) -> f32 {
        self.breakdown(
            item.last_accessed,
            item.access_count,
            item.confidence,
            item.suggested_type,
            now,
        )
        .total()
    }
}

/// Hyperbolic recency: 1.0 now, 0.5 after a day, 0.25 after three days.
#[must_use]
pub fn recency(last_accessed: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let hours = (now - last_accessed).num_seconds().max(0) as f32 / 3600.0;
    1.0 / (1.0 + hours / 24.0)
}

/// Access frequency normalised against [`FREQUENCY_CAP`].
#[must_use]
pub fn frequency(access_count: u32) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let count = access_count as f32;
    (count / FREQUENCY_CAP).min(1.0)
}

/// How much a memory type matters on its own.
#[must_use]
pub fn salience(memory_type: MemoryType) -> f32 {
    let high = memory_type.is_decision()
        || memory_type.is_convention()
        || matches!(
            memory_type,
            MemoryType::LessonLearned
                | MemoryType::Risk
                | MemoryType::Discovery
                | MemoryType::Bug
                | MemoryType::RootCause
        );
    if high { 1.0 } else { BASELINE_SALIENCE }
}
