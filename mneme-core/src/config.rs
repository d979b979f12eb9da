//! Configuration for the Mneme memory pipeline.
//!
//! Maps directly to `mneme.toml`. Every field has a serde default, so an
//! empty document yields [`MnemeConfig::default`].

use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Top-level Mneme configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(Default)]
pub struct MnemeConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Working-context sizing.
    #[serde(default)]
    pub working_context: WorkingContextConfig,
    /// Access log sizing.
    #[serde(default)]
    pub access_log: AccessLogConfig,
    /// Staging area capacities.
    #[serde(default)]
    pub pending: PendingConfig,
    /// Promotion engine schedule and thresholds.
    #[serde(default)]
    pub promotion: PromotionConfig,
    /// Recall validation and ranking constants.
    #[serde(default)]
    pub recall: RecallConfig,
    /// Remember / forget validation limits.
    #[serde(default)]
    pub remember: RememberConfig,
    /// Prompt context assembly.
    #[serde(default)]
    pub context: ContextConfig,
    /// Long-term store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Telemetry & observability.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MnemeConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `MemoryError::Config` if the TOML is invalid or fails
    /// [`MnemeConfig::validate`].
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| MemoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `MemoryError::Config` describing the first violated constraint.
    pub fn validate(&self) -> crate::error::Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(MemoryError::Config(format!("{name} must be within [0, 1], got {v}")))
            }
        };

        if self.access_log.max_entries == 0 {
            return Err(MemoryError::Config("access_log.max_entries must be > 0".into()));
        }
        if self.pending.max_items == 0 || self.pending.max_agent_decisions == 0 {
            return Err(MemoryError::Config("pending capacities must be > 0".into()));
        }
        unit("pending.default_importance", self.pending.default_importance)?;
        unit("promotion.threshold", self.promotion.threshold)?;
        unit("recall.semantic_floor", self.recall.semantic_floor)?;
        unit("recall.default_min_confidence", self.recall.default_min_confidence)?;
        if self.recall.max_limit == 0 {
            return Err(MemoryError::Config("recall.max_limit must be > 0".into()));
        }
        if self.recall.default_limit == 0 || self.recall.default_limit > self.recall.max_limit {
            return Err(MemoryError::Config(
                "recall.default_limit must be within [1, max_limit]".into(),
            ));
        }
        let w = &self.promotion.weights;
        let sum = w.recency + w.frequency + w.confidence + w.salience;
        if (sum - 1.0).abs() > 0.01 {
            return Err(MemoryError::Config(format!(
                "promotion.weights must sum to 1.0, got {sum:.3}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
    /// Capacity of each session actor's command channel.
    #[serde(default = "default_64")]
    pub command_buffer: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            command_buffer: 64,
        }
    }
}

/// Working-context configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingContextConfig {
    /// Token budget reserved for the working context in assembled prompts.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

impl Default for WorkingContextConfig {
    fn default() -> Self {
        Self { token_budget: 12_000 }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogConfig {
    /// Hard cap on retained entries; the oldest is dropped beyond it.
    #[serde(default = "default_1000")]
    pub max_entries: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

/// Staging area configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfig {
    /// Capacity of the implicit (score-evicted) map.
    #[serde(default = "default_500")]
    pub max_items: usize,
    /// Capacity of the agent-decision (FIFO) list.
    #[serde(default = "default_100")]
    pub max_agent_decisions: usize,
    /// Importance score given to implicit items that do not specify one.
    #[serde(default = "default_0_5")]
    pub default_importance: f32,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            max_items: 500,
            max_agent_decisions: 100,
            default_importance: 0.5,
        }
    }
}

/// Promotion engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Whether the periodic promotion tick runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between scheduled promotion runs.
    #[serde(default = "default_30_u64")]
    pub interval_secs: u64,
    /// Minimum importance score for implicit items.
    #[serde(default = "default_0_6")]
    pub threshold: f32,
    /// Upper bound on items persisted per run.
    #[serde(default = "default_20")]
    pub max_promotions_per_run: usize,
    /// Run promotion as soon as the agent stages a decision.
    #[serde(default = "default_true")]
    pub promote_agent_decisions_immediately: bool,
    /// Consider working-context items with a suggested type.
    #[serde(default = "default_true")]
    pub include_working_context: bool,
    /// Importance scorer weights.
    #[serde(default)]
    pub weights: ImportanceWeights,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            threshold: 0.6,
            max_promotions_per_run: 20,
            promote_agent_decisions_immediately: true,
            include_working_context: true,
            weights: ImportanceWeights::default(),
        }
    }
}

/// Importance scoring weights. Must sum to ~1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceWeights {
    /// Weight for recency of last access.
    #[serde(default = "default_0_2")]
    pub recency: f32,
    /// Weight for access frequency.
    #[serde(default = "default_0_3")]
    pub frequency: f32,
    /// Weight for stated confidence.
    #[serde(default = "default_0_25")]
    pub confidence: f32,
    /// Weight for memory-type salience.
    #[serde(default = "default_0_25")]
    pub salience: f32,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            recency: 0.20,
            frequency: 0.30,
            confidence: 0.25,
            salience: 0.25,
        }
    }
}

/// Recall configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Largest accepted `limit`.
    #[serde(default = "default_50")]
    pub max_limit: usize,
    /// Limit used when the caller gives none.
    #[serde(default = "default_10")]
    pub default_limit: usize,
    /// Minimum confidence used when the caller gives none.
    #[serde(default = "default_0_5")]
    pub default_min_confidence: f32,
    /// Longest accepted query, in chars.
    #[serde(default = "default_1000")]
    pub max_query_len: usize,
    /// Semantic / hybrid modes fetch `limit × overfetch_factor` candidates.
    #[serde(default = "default_3")]
    pub overfetch_factor: usize,
    /// Similarity below which semantic results are dropped.
    #[serde(default = "default_0_2")]
    pub semantic_floor: f32,
    /// Bonus added to verbatim matches in hybrid mode.
    #[serde(default = "default_0_5")]
    pub hybrid_text_bonus: f32,
    /// Embedding dimensionality for the TF-IDF embedder.
    #[serde(default = "default_512")]
    pub embedding_dimensions: usize,
    /// Entries kept in the term-vector cache.
    #[serde(default = "default_1024")]
    pub embedding_cache_size: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            max_limit: 50,
            default_limit: 10,
            default_min_confidence: 0.5,
            max_query_len: 1000,
            overfetch_factor: 3,
            semantic_floor: 0.2,
            hybrid_text_bonus: 0.5,
            embedding_dimensions: 512,
            embedding_cache_size: 1024,
        }
    }
}

/// Remember / forget validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberConfig {
    /// Longest accepted content, in chars.
    #[serde(default = "default_2000")]
    pub max_content_len: usize,
    /// Longest accepted rationale, in chars.
    #[serde(default = "default_2000")]
    pub max_rationale_len: usize,
    /// Longest accepted forget reason, in chars.
    #[serde(default = "default_500")]
    pub max_reason_len: usize,
    /// Confidence used when the caller gives none.
    #[serde(default = "default_0_8")]
    pub default_confidence: f32,
}

impl Default for RememberConfig {
    fn default() -> Self {
        Self {
            max_content_len: 2000,
            max_rationale_len: 2000,
            max_reason_len: 500,
            default_confidence: 0.8,
        }
    }
}

/// Prompt context assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total token budget for an assembled context.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Share of the budget reserved for the working context.
    #[serde(default = "default_0_4")]
    pub working_share: f32,
    /// Maximum long-term memories included.
    #[serde(default = "default_10")]
    pub max_memories: usize,
    /// Minimum confidence of included memories.
    #[serde(default = "default_0_5")]
    pub min_confidence: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 12_000,
            working_share: 0.4,
            max_memories: 10,
            min_confidence: 0.5,
        }
    }
}

/// Long-term store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: "memory" or "sqlite".
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// Database path for the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Per-session cap on persisted memories.
    #[serde(default = "default_10000")]
    pub max_memories_per_session: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: "mneme.db".to_string(),
            wal_mode: true,
            max_memories_per_session: 10_000,
        }
    }
}

/// Telemetry and observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit one event per operation.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log any operation exceeding this threshold (ms) at warn level.
    #[serde(default = "default_250_0")]
    pub log_slow_operations_ms: f32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_slow_operations_ms: 250.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_memory_backend() -> String { "memory".to_string() }
fn default_db_path() -> String { "mneme.db".to_string() }
fn default_0_2() -> f32 { 0.2 }
fn default_0_25() -> f32 { 0.25 }
fn default_0_3() -> f32 { 0.3 }
fn default_0_4() -> f32 { 0.4 }
fn default_0_5() -> f32 { 0.5 }
fn default_0_6() -> f32 { 0.6 }
fn default_0_8() -> f32 { 0.8 }
fn default_250_0() -> f32 { 250.0 }
fn default_3() -> usize { 3 }
fn default_10() -> usize { 10 }
fn default_20() -> usize { 20 }
fn default_30_u64() -> u64 { 30 }
fn default_50() -> usize { 50 }
fn default_64() -> usize { 64 }
fn default_100() -> usize { 100 }
fn default_500() -> usize { 500 }
fn default_512() -> usize { 512 }
fn default_1000() -> usize { 1000 }
fn default_1024() -> usize { 1024 }
fn default_2000() -> usize { 2000 }
fn default_10000() -> usize { 10_000 }
fn default_token_budget() -> usize { 12_000 }
