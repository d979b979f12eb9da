//! Telemetry — one event per memory operation, plus tracing initialisation.
//!
//! Every `remember`, `recall`, `forget` and promotion run produces exactly
//! one [`TelemetryEvent`]. Events go to a [`TelemetrySink`]; the default
//! [`TracingSink`] turns them into structured `tracing` records, flagging
//! anything slower than `telemetry.log_slow_operations_ms`.

use std::time::Duration;

use mneme_core::config::GeneralConfig;
use mneme_core::error::{MemoryError, Result};
use mneme_core::retrieval::SearchMode;
use mneme_core::taxonomy::MemoryType;
use mneme_core::types::{MemoryId, SessionId};
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::promotion::PromotionTrigger;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A completed memory operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// `remember` finished.
    Remember {
        /// Session the memory belongs to.
        session_id: SessionId,
        /// Type requested, if it parsed.
        memory_type: Option<MemoryType>,
        /// Wall-clock duration.
        duration: Duration,
        /// Error tag on failure.
        error: Option<&'static str>,
    },
    /// `recall` finished.
    Recall {
        /// Session searched.
        session_id: SessionId,
        /// Mode requested, if it parsed.
        search_mode: Option<SearchMode>,
        /// Memories returned.
        result_count: usize,
        /// Semantic ranking degraded to text.
        fell_back: bool,
        /// Wall-clock duration.
        duration: Duration,
        /// Error tag on failure.
        error: Option<&'static str>,
    },
    /// `forget` finished.
    Forget {
        /// Session the memory belongs to.
        session_id: SessionId,
        /// Target memory.
        memory_id: MemoryId,
        /// A replacement was recorded.
        replaced: bool,
        /// Wall-clock duration.
        duration: Duration,
        /// Error tag on failure.
        error: Option<&'static str>,
    },
    /// A promotion run finished.
    PromotionCompleted {
        /// Session promoted.
        session_id: SessionId,
        /// What started the run.
        trigger: PromotionTrigger,
        /// Ids of the memories written.
        memory_ids: Vec<MemoryId>,
        /// Items that failed to persist.
        failures: usize,
        /// Wall-clock duration.
        duration: Duration,
    },
}

impl TelemetryEvent {
    /// Operation name used as the `op` log field.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Remember { .. } => "remember",
            Self::Recall { .. } => "recall",
            Self::Forget { .. } => "forget",
            Self::PromotionCompleted { .. } => "promotion",
        }
    }

    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Remember { session_id, .. }
            | Self::Recall { session_id, .. }
            | Self::Forget { session_id, .. }
            | Self::PromotionCompleted { session_id, .. } => session_id,
        }
    }

    /// How long the operation took.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Remember { duration, .. }
            | Self::Recall { duration, .. }
            | Self::Forget { duration, .. }
            | Self::PromotionCompleted { duration, .. } => *duration,
        }
    }

    /// Whether the operation succeeded. A promotion run always completes.
    #[must_use]
    pub fn success(&self) -> bool {
        match self {
            Self::Remember { error, .. } | Self::Recall { error, .. } | Self::Forget { error, .. } => {
                error.is_none()
            }
            Self::PromotionCompleted { .. } => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives telemetry events. Must not block.
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: &TelemetryEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    slow_threshold: Duration,
}

impl TracingSink {
    /// Sink warning about operations slower than `slow_ms`.
    #[must_use]
    pub fn new(slow_ms: f32) -> Self {
        Self {
            slow_threshold: Duration::from_secs_f32(slow_ms.max(0.0) / 1000.0),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(250.0)
    }
}

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &TelemetryEvent) {
        let session = event.session_id();
        let elapsed_us = event.duration().as_micros();
        let op = event.operation();

        match event {
            TelemetryEvent::Remember { memory_type, error, .. } => {
                tracing::info!(
                    op,
                    session = %session,
                    memory_type = memory_type.map(MemoryType::as_str),
                    success = error.is_none(),
                    error = *error,
                    elapsed_us,
                    "memory operation"
                );
            }
            TelemetryEvent::Recall {
                search_mode,
                result_count,
                fell_back,
                error,
                ..
            } => {
                tracing::info!(
                    op,
                    session = %session,
                    mode = search_mode.map(SearchMode::as_str),
                    results = result_count,
                    fell_back,
                    success = error.is_none(),
                    error = *error,
                    elapsed_us,
                    "memory operation"
                );
            }
            TelemetryEvent::Forget {
                memory_id,
                replaced,
                error,
                ..
            } => {
                tracing::info!(
                    op,
                    session = %session,
                    memory = %memory_id,
                    replaced,
                    success = error.is_none(),
                    error = *error,
                    elapsed_us,
                    "memory operation"
                );
            }
            TelemetryEvent::PromotionCompleted {
                trigger,
                memory_ids,
                failures,
                ..
            } => {
                tracing::info!(
                    op,
                    session = %session,
                    trigger = trigger.as_str(),
                    promoted = memory_ids.len(),
                    failures,
                    elapsed_us,
                    "promotion completed"
                );
            }
        }

        if event.duration() > self.slow_threshold {
            tracing::warn!(op, session = %session, elapsed_us, "slow memory operation");
        }
    }
}

/// Keeps events in memory. Useful for embedding applications that forward
/// events elsewhere, and for tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl BufferSink {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Remove and return every buffered event.
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl TelemetrySink for BufferSink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Discards everything. Used when `telemetry.enabled = false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: &TelemetryEvent) {}
}

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `general.log_level` when set.
///
/// # Errors
///
/// Returns [`MemoryError::Config`] if the level does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(general: &GeneralConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&general.log_level)
            .map_err(|e| MemoryError::Config(format!("log_level: {e}")))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if general.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.map_err(|e| MemoryError::Config(format!("tracing subscriber: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
