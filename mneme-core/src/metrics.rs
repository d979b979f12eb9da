//! Runtime metrics for the memory pipeline.
//!
//! Lock-free `AtomicU64` counters for hot-path events, a latency monitor
//! for recall / promotion timings, and Prometheus text export.
//! Histograms use `parking_lot::Mutex`; they are read rarely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters (lock-free)
// ---------------------------------------------------------------------------

/// Atomic counters, incremented in the hot path and read on export.
#[derive(Debug)]
pub struct MemoryCounters {
    /// Successful `remember` calls.
    pub remembered: AtomicU64,
    /// Successful `recall` calls.
    pub recalls: AtomicU64,
    /// Recalls that fell back from semantic/hybrid to text.
    pub recall_fallbacks: AtomicU64,
    /// Successful `forget` calls.
    pub forgotten: AtomicU64,
    /// Operations rejected by validation or the store.
    pub operation_errors: AtomicU64,
    /// Promotion runs completed.
    pub promotion_runs: AtomicU64,
    /// Items persisted by promotion.
    pub memories_promoted: AtomicU64,
    /// Items whose promotion failed.
    pub promotion_failures: AtomicU64,
    /// Staged items evicted for capacity.
    pub staged_evictions: AtomicU64,
    /// Best-effort access-log writes that failed.
    pub access_log_failures: AtomicU64,
}

impl MemoryCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remembered: AtomicU64::new(0),
            recalls: AtomicU64::new(0),
            recall_fallbacks: AtomicU64::new(0),
            forgotten: AtomicU64::new(0),
            operation_errors: AtomicU64::new(0),
            promotion_runs: AtomicU64::new(0),
            memories_promoted: AtomicU64::new(0),
            promotion_failures: AtomicU64::new(0),
            staged_evictions: AtomicU64::new(0),
            access_log_failures: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            remembered: self.remembered.load(Ordering::Relaxed),
            recalls: self.recalls.load(Ordering::Relaxed),
            recall_fallbacks: self.recall_fallbacks.load(Ordering::Relaxed),
            forgotten: self.forgotten.load(Ordering::Relaxed),
            operation_errors: self.operation_errors.load(Ordering::Relaxed),
            promotion_runs: self.promotion_runs.load(Ordering::Relaxed),
            memories_promoted: self.memories_promoted.load(Ordering::Relaxed),
            promotion_failures: self.promotion_failures.load(Ordering::Relaxed),
            staged_evictions: self.staged_evictions.load(Ordering::Relaxed),
            access_log_failures: self.access_log_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemoryCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    /// Successful `remember` calls.
    pub remembered: u64,
    /// Successful `recall` calls.
    pub recalls: u64,
    /// Text fallbacks during recall.
    pub recall_fallbacks: u64,
    /// Successful `forget` calls.
    pub forgotten: u64,
    /// Rejected operations.
    pub operation_errors: u64,
    /// Promotion runs.
    pub promotion_runs: u64,
    /// Promoted items.
    pub memories_promoted: u64,
    /// Failed promotions.
    pub promotion_failures: u64,
    /// Staging evictions.
    pub staged_evictions: u64,
    /// Failed access-log writes.
    pub access_log_failures: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 10] = [
            ("mneme_remembered_total", "Memories stored via remember", self.remembered),
            ("mneme_recalls_total", "Recall requests served", self.recalls),
            ("mneme_recall_fallbacks_total", "Recalls degraded to text mode", self.recall_fallbacks),
            ("mneme_forgotten_total", "Memories superseded via forget", self.forgotten),
            ("mneme_operation_errors_total", "Rejected operations", self.operation_errors),
            ("mneme_promotion_runs_total", "Promotion runs completed", self.promotion_runs),
            ("mneme_memories_promoted_total", "Staged items persisted", self.memories_promoted),
            ("mneme_promotion_failures_total", "Staged items that failed to persist", self.promotion_failures),
            ("mneme_staged_evictions_total", "Staged items evicted for capacity", self.staged_evictions),
            ("mneme_access_log_failures_total", "Best-effort access records dropped", self.access_log_failures),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Latency Monitor
// ---------------------------------------------------------------------------

const HISTORY_LEN: usize = 256;

/// Tracks recent operation latencies against a slow-operation threshold.
///
/// ```rust
/// # use mneme_core::metrics::LatencyMonitor;
/// let monitor = LatencyMonitor::new(250.0);
/// {
///     let _guard = monitor.begin();
///     // ... recall work ...
/// }
/// assert_eq!(monitor.count(), 1);
/// ```
#[derive(Debug)]
pub struct LatencyMonitor {
    slow_ms: f64,
    history: Mutex<LatencyHistory>,
}

#[derive(Debug)]
struct LatencyHistory {
    timings: Vec<f64>,
    write_idx: usize,
    count: u64,
    slow: u64,
}

impl LatencyMonitor {
    /// Monitor flagging operations slower than `slow_ms`.
    #[must_use]
    pub fn new(slow_ms: f64) -> Self {
        Self {
            slow_ms,
            history: Mutex::new(LatencyHistory {
                timings: vec![0.0; HISTORY_LEN],
                write_idx: 0,
                count: 0,
                slow: 0,
            }),
        }
    }

    /// Start timing. The guard records on drop.
    pub fn begin(&self) -> LatencyGuard<'_> {
        LatencyGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a timing (milliseconds). Returns whether it was slow.
    pub fn record(&self, ms: f64) -> bool {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % HISTORY_LEN;
        h.count += 1;
        let slow = ms > self.slow_ms;
        if slow {
            h.slow += 1;
        }
        slow
    }

    /// Operations recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.history.lock().count
    }

    /// Operations over the threshold so far.
    #[must_use]
    pub fn slow_count(&self) -> u64 {
        self.history.lock().slow
    }

    /// P50 / P95 / P99 / max over the retained window (milliseconds).
    #[must_use]
    pub fn percentiles(&self) -> LatencyPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).unwrap_or(usize::MAX).min(HISTORY_LEN);
        if n == 0 {
            return LatencyPercentiles::default();
        }
        let mut sorted: Vec<f64> = h.timings[..n].to_vec();
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let idx = ((n as f64) * q) as usize;
            sorted[idx.min(n - 1)]
        };
        LatencyPercentiles {
            p50: at(0.50),
            p95: at(0.95),
            p99: at(0.99),
            max: sorted[n - 1],
        }
    }
}

/// RAII guard recording elapsed time on drop.
pub struct LatencyGuard<'a> {
    monitor: &'a LatencyMonitor,
    start: Instant,
}

impl Drop for LatencyGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Percentile statistics in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// Largest retained timing.
    pub max: f64,
}

// ---------------------------------------------------------------------------
// Tracing Span Names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::info_span!`.
pub mod spans {
    /// `remember` operation.
    pub const REMEMBER: &str = "mneme::remember";
    /// `recall` operation.
    pub const RECALL: &str = "mneme::recall";
    /// Recall ranking on the blocking pool.
    pub const RANK: &str = "mneme::recall::rank";
    /// `forget` operation.
    pub const FORGET: &str = "mneme::forget";
    /// Promotion run.
    pub const PROMOTION: &str = "mneme::promotion";
    /// Context assembly.
    pub const BUILD_CONTEXT: &str = "mneme::context";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_default_zero() {
        assert_eq!(MemoryCounters::new().snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn counters_increment_and_snapshot() {
        let c = MemoryCounters::new();
        MemoryCounters::add(&c.remembered, 5);
        MemoryCounters::incr(&c.recall_fallbacks);
        MemoryCounters::add(&c.memories_promoted, 3);

        let snap = c.snapshot();
        assert_eq!(snap.remembered, 5);
        assert_eq!(snap.recall_fallbacks, 1);
        assert_eq!(snap.memories_promoted, 3);
        assert_eq!(snap.forgotten, 0);
    }

    #[test]
    fn prometheus_format_valid() {
        let c = MemoryCounters::new();
        MemoryCounters::add(&c.recalls, 42);
        let prom = c.snapshot().to_prometheus();
        assert!(prom.contains("mneme_recalls_total 42"));
        assert!(prom.contains("# TYPE mneme_recalls_total counter"));
        assert!(prom.contains("# HELP"));
    }

    #[test]
    fn latency_monitor_flags_slow() {
        let monitor = LatencyMonitor::new(10.0);
        assert!(!monitor.record(2.0));
        assert!(monitor.record(20.0));
        assert_eq!(monitor.count(), 2);
        assert_eq!(monitor.slow_count(), 1);
    }

    #[test]
    fn percentiles_are_ordered() {
        let monitor = LatencyMonitor::new(100.0);
        for i in 0..100_u32 {
            monitor.record(f64::from(i) * 0.5);
        }
        let pct = monitor.percentiles();
        assert!(pct.p50 > 0.0);
        assert!(pct.p95 >= pct.p50);
        assert!(pct.p99 >= pct.p95);
        assert!(pct.max >= pct.p99);
    }

    #[test]
    fn guard_records_on_drop() {
        let monitor = LatencyMonitor::new(1000.0);
        {
            let _guard = monitor.begin();
        }
        assert_eq!(monitor.count(), 1);
    }
}
