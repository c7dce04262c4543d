//! Metric primitives shared across the engine: duration histograms and
//! atomic gauges. Registries and exporters live with the server, not here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Records wall-clock durations with microsecond resolution.
///
/// Backed by an HDR histogram covering 1µs to 1h at two significant
/// figures. Recording saturates at the upper bound rather than failing.
pub struct DurationHistogram {
    inner: Mutex<Histogram<u64>>,
}

impl DurationHistogram {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, 3_600_000_000, 2)
            .expect("duration histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    /// Record one observation.
    pub fn record(&self, duration: Duration) {
        let micros = duration.as_micros().min(u128::from(u64::MAX)) as u64;
        let mut inner = self.inner.lock().unwrap();
        inner.saturating_record(micros.max(1));
    }

    /// Percentile snapshot for dashboards and status dumps.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let inner = self.inner.lock().unwrap();
        HistogramSnapshot {
            count: inner.len(),
            p50_micros: inner.value_at_quantile(0.50),
            p95_micros: inner.value_at_quantile(0.95),
            p99_micros: inner.value_at_quantile(0.99),
            max_micros: inner.max(),
        }
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DurationHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("DurationHistogram")
            .field("count", &snap.count)
            .field("p50_micros", &snap.p50_micros)
            .field("p99_micros", &snap.p99_micros)
            .finish()
    }
}

/// Point-in-time view of a [`DurationHistogram`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub p50_micros: u64,
    pub p95_micros: u64,
    pub p99_micros: u64,
    pub max_micros: u64,
}

/// A non-negative gauge updatable from any thread.
#[derive(Debug, Default)]
pub struct AtomicGauge {
    value: AtomicU64,
}

impl AtomicGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        let prev = self.value.fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "gauge decremented below zero");
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}
