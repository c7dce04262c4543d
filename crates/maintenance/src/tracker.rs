//! Typed in-flight accounting for maintenance work.
//!
//! The pending map is the source of truth; the per-kind counters are
//! derived views read under the same lock. Shutdown drains through
//! [`InflightTracker::wait_for_all_to_finish`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use crate::op::OpKind;

/// In-flight op counts broken down by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InflightCounts {
    pub all: u64,
    pub flush: u64,
    pub compaction: u64,
    pub garbage_collection: u64,
    pub other: u64,
}

impl InflightCounts {
    fn increment(&mut self, kind: OpKind) {
        self.all += 1;
        match kind {
            OpKind::Flush => self.flush += 1,
            OpKind::Compaction => self.compaction += 1,
            OpKind::GarbageCollection => self.garbage_collection += 1,
            OpKind::Other => self.other += 1,
        }
    }

    fn decrement(&mut self, kind: OpKind) {
        assert!(self.all > 0, "in-flight count underflow");
        self.all -= 1;
        let slot = match kind {
            OpKind::Flush => &mut self.flush,
            OpKind::Compaction => &mut self.compaction,
            OpKind::GarbageCollection => &mut self.garbage_collection,
            OpKind::Other => &mut self.other,
        };
        assert!(*slot > 0, "in-flight count underflow for {:?}", kind);
        *slot -= 1;
    }
}

struct TrackerState {
    /// Running invocations per op name. An op may appear with a count
    /// above 1 if its implementation permits concurrent runs.
    pending: HashMap<String, u32>,
    counts: InflightCounts,
}

/// Tracks which maintenance ops are currently executing, by name and kind.
pub struct InflightTracker {
    state: Mutex<TrackerState>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                pending: HashMap::new(),
                counts: InflightCounts::default(),
            }),
        }
    }

    /// Record that an invocation of `name` started executing.
    pub fn add(&self, name: &str, kind: OpKind) {
        let mut state = self.state.lock().unwrap();
        *state.pending.entry(name.to_string()).or_insert(0) += 1;
        state.counts.increment(kind);
    }

    /// Record that an invocation of `name` finished. Fatal if the op was
    /// never tracked.
    pub fn release(&self, name: &str, kind: OpKind) {
        let mut state = self.state.lock().unwrap();
        match state.pending.get_mut(name) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                state.pending.remove(name);
            }
            None => panic!("released untracked maintenance op {name}"),
        }
        state.counts.decrement(kind);
    }

    /// Names of ops with at least one invocation in flight, sorted.
    pub fn pending_ops(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.pending.keys().cloned().collect();
        names.sort();
        names
    }

    /// Total in-flight invocations.
    pub fn num_pending(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.pending.values().map(|count| *count as usize).sum()
    }

    pub fn counts(&self) -> InflightCounts {
        self.state.lock().unwrap().counts
    }

    /// Block until nothing is in flight.
    ///
    /// Polls with multiplicative backoff and logs a warning roughly once
    /// per second naming the ops still running.
    pub fn wait_for_all_to_finish(&self) {
        const COMPLAIN_INTERVAL_MS: u128 = 1000;
        let start = Instant::now();
        let mut wait = Duration::from_micros(250);
        let mut complaints: u128 = 0;
        loop {
            let pending = self.pending_ops();
            if pending.is_empty() {
                break;
            }
            std::thread::sleep(wait);
            let waited = start.elapsed();
            if waited.as_millis() / COMPLAIN_INTERVAL_MS > complaints {
                warn!(
                    "waiting for {} maintenance ops to finish ({}ms elapsed): {:?}",
                    pending.len(),
                    waited.as_millis(),
                    pending
                );
                complaints += 1;
            }
            wait = (wait * 5 / 4).min(Duration::from_secs(1));
        }
    }
}

impl Default for InflightTracker {
    fn default() -> Self {
        Self::new()
    }
}
