use std::fmt;
use std::sync::atomic::Ordering;

use super::core::{ManagerShared, ManagerState};

/// Why an op was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Trigger {
    WalRetention,
    MemoryPressure,
    PerfImprovement,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trigger::WalRetention => "wal_retention",
            Trigger::MemoryPressure => "memory_pressure",
            Trigger::PerfImprovement => "perf_improvement",
        };
        f.write_str(label)
    }
}

impl ManagerShared {
    /// Pick the op to run next, or `None` to idle until the next tick.
    ///
    /// Trigger precedence: log retention beats memory pressure beats perf
    /// improvement. The first two are bounded-backlog guards; the third is
    /// opportunistic work for when the system has slack. Ties on a
    /// trigger's metric go to the lexicographically smallest name, which
    /// falls out of the registry's iteration order.
    pub(super) fn find_best_op(&self, state: &ManagerState) -> Option<(String, Trigger)> {
        let mut anchored_total: u64 = 0;
        let mut most_ram: Option<(&str, u64)> = None;
        let mut oldest_ts: Option<(&str, i64)> = None;
        let mut best_perf: Option<(&str, f64)> = None;

        for (name, record) in &state.ops {
            let stats = &record.stats;
            if !stats.runnable {
                continue;
            }
            anchored_total = anchored_total.saturating_add(stats.ram_anchored);
            if most_ram.map_or(true, |(_, best)| stats.ram_anchored > best) {
                most_ram = Some((name, stats.ram_anchored));
            }
            if oldest_ts.map_or(true, |(_, best)| stats.ts_anchored_secs > best) {
                oldest_ts = Some((name, stats.ts_anchored_secs));
            }
            if best_perf.map_or(true, |(_, best)| stats.perf_improvement > best) {
                best_perf = Some((name, stats.perf_improvement));
            }
        }

        if let Some((name, age)) = oldest_ts {
            if age >= self.options.max_ts_anchored_secs {
                return Some((name.to_string(), Trigger::WalRetention));
            }
        }

        // Anchored bytes count toward pressure: they are exactly the
        // memory a dispatch would release.
        let used = self.memory.used();
        if used.saturating_add(anchored_total) >= self.mem_target.load(Ordering::Relaxed) {
            if let Some((name, ram)) = most_ram {
                if ram > 0 {
                    return Some((name.to_string(), Trigger::MemoryPressure));
                }
            }
        }

        if let Some((name, perf)) = best_perf {
            if perf > 0.0 {
                return Some((name.to_string(), Trigger::PerfImprovement));
            }
        }

        None
    }
}
