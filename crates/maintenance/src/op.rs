use serde::Serialize;
use strata_core::{AtomicGauge, DurationHistogram};

/// Self-reported statistics for one op, snapshotted every scheduling tick.
///
/// All fields are advisory inputs to the selection policy; none of them
/// change what the op actually does when it runs.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OpStats {
    /// Whether `prepare()` is expected to succeed right now.
    pub runnable: bool,
    /// Approximate bytes of RAM that running this op would release.
    pub ram_anchored: u64,
    /// Age in seconds of the oldest write-ahead-log position this op
    /// retains. Zero if the op holds nothing back.
    pub ts_anchored_secs: i64,
    /// Unitless read-path or compaction benefit. Zero means "run only
    /// under pressure".
    pub perf_improvement: f64,
}

impl OpStats {
    /// Zero all fields.
    pub fn clear(&mut self) {
        *self = OpStats::default();
    }
}

/// Broad category of maintenance work, used for the typed in-flight
/// counters exposed by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Flush,
    Compaction,
    GarbageCollection,
    Other,
}

/// A registered unit of deferrable background work (flush, compaction,
/// log GC, ...).
///
/// The manager polls each registered op for statistics once per tick and
/// uses them to decide what, if anything, to run next. Registrants own the
/// op object and must unregister it before dropping it.
pub trait MaintenanceOp: Send + Sync {
    /// Unique identifier. Used for logging, history entries, and
    /// deterministic tie-breaking; must be non-empty and unique within a
    /// manager.
    fn name(&self) -> &str;

    /// Category for the in-flight tracker.
    fn kind(&self) -> OpKind {
        OpKind::Other
    }

    /// Refresh `stats`. Runs under the manager lock every tick, so this
    /// must be cheap and must never block.
    fn update_stats(&self, stats: &mut OpStats);

    /// Set up whatever state must be held while the op is queued (row
    /// locks and the like). Runs on the scheduler thread without the
    /// manager lock; keep it short. Returning false aborts the dispatch;
    /// the op stays registered and is reconsidered on a later tick.
    fn prepare(&self) -> bool;

    /// Do the work. Runs on a worker thread without the manager lock and
    /// may take a long time. Errors are the op's own business to log and
    /// recover from; the manager records a completion either way.
    fn perform(&self);

    /// Histogram recording the wall-clock duration of each `perform()`.
    fn duration_histogram(&self) -> &DurationHistogram;

    /// Gauge mirroring how many invocations of this op are in flight.
    fn running_gauge(&self) -> &AtomicGauge;
}
