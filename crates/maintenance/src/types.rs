use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::HistogramSnapshot;

use crate::op::OpStats;
use crate::tracker::InflightCounts;

/// Maintenance manager configuration, typically parsed from the server's
/// TOML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerOptions {
    /// Worker parallelism. Must be at least 1.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Tick cadence in milliseconds. Zero is clamped to 1.
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u32,
    /// Absolute memory ceiling in bytes. Negative derives the pressure
    /// target from installed memory instead.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: i64,
    /// Write-ahead-log retention SLA in seconds.
    #[serde(default = "default_max_ts_anchored_secs")]
    pub max_ts_anchored_secs: i64,
    /// Completion-history ring capacity. Must be at least 1.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_num_threads() -> usize {
    4
}
fn default_polling_interval_ms() -> u32 {
    250
}
fn default_memory_limit() -> i64 {
    -1
}
fn default_max_ts_anchored_secs() -> i64 {
    7200
}
fn default_history_size() -> usize {
    8
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            polling_interval_ms: default_polling_interval_ms(),
            memory_limit: default_memory_limit(),
            max_ts_anchored_secs: default_max_ts_anchored_secs(),
            history_size: default_history_size(),
        }
    }
}

impl ManagerOptions {
    /// Tick interval as a [`Duration`], clamping zero to one millisecond.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.polling_interval_ms.max(1)))
    }
}

/// History entry for one finished op.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedOp {
    pub name: String,
    /// Wall-clock duration of the `perform()` call.
    pub duration: Duration,
    /// When the `perform()` call started.
    pub started_at: DateTime<Utc>,
}

/// Snapshot of one registered op for the status dump.
#[derive(Debug, Clone, Serialize)]
pub struct OpStatusSnapshot {
    pub name: String,
    /// Most recent per-tick stats snapshot.
    pub stats: OpStats,
    /// In-flight invocations of this op right now.
    pub running: u32,
    pub durations: HistogramSnapshot,
}

/// Structured report consumed by the RPC and HTTP layers.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceStatus {
    /// Registered ops with their most recent stats.
    pub ops: Vec<OpStatusSnapshot>,
    /// Recently completed ops, oldest first.
    pub completed: Vec<CompletedOp>,
    /// Completions since init; monotonically increasing.
    pub completed_total: u64,
    /// Ops currently executing across all workers.
    pub running_ops: usize,
    /// Memory pressure threshold in bytes, computed at init.
    pub mem_target: u64,
    /// In-flight counts per op kind.
    pub inflight: InflightCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options = ManagerOptions::default();
        assert_eq!(options.num_threads, 4);
        assert_eq!(options.polling_interval_ms, 250);
        assert_eq!(options.memory_limit, -1);
        assert_eq!(options.max_ts_anchored_secs, 7200);
        assert_eq!(options.history_size, 8);
    }

    #[test]
    fn zero_polling_interval_is_clamped() {
        let options = ManagerOptions {
            polling_interval_ms: 0,
            ..ManagerOptions::default()
        };
        assert_eq!(options.polling_interval(), Duration::from_millis(1));
    }

    #[test]
    fn options_deserialize_with_partial_fields() {
        let options: ManagerOptions = serde_json::from_str(r#"{"num_threads": 2}"#).unwrap();
        assert_eq!(options.num_threads, 2);
        assert_eq!(options.history_size, 8);
    }
}
