use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use strata_core::{MemoryProbe, Result, StrataError};

use crate::op::{MaintenanceOp, OpStats};
use crate::tracker::InflightTracker;
use crate::types::{CompletedOp, MaintenanceStatus, ManagerOptions, OpStatusSnapshot};

use super::execution::run_scheduler;

/// Per-op run accounting, shared between the registry entry and any
/// in-flight dispatches.
///
/// The counter is only read or written with the manager lock held; it is
/// atomic so the struct can be shared through an `Arc` without a second
/// lock, which keeps blocking unregister working after the registry entry
/// has been removed.
pub(super) struct OpRunState {
    pub(super) running: AtomicU32,
    /// Signalled (with the manager lock held) when `running` drops to zero.
    pub(super) quiesce: Condvar,
}

impl OpRunState {
    fn new() -> Self {
        Self {
            running: AtomicU32::new(0),
            quiesce: Condvar::new(),
        }
    }
}

pub(super) struct OpRecord {
    pub(super) op: Arc<dyn MaintenanceOp>,
    /// Stats snapshot refreshed each tick while the manager lock is held.
    pub(super) stats: OpStats,
    pub(super) run: Arc<OpRunState>,
}

/// Mutable manager state guarded by the single manager lock.
pub(super) struct ManagerState {
    /// Registered ops keyed by name. BTreeMap iteration order makes
    /// selection tie-breaks deterministic.
    pub(super) ops: BTreeMap<String, OpRecord>,
    /// Ops currently executing across all workers.
    pub(super) running_ops: usize,
    /// Circular buffer of recent completions; writes go to
    /// `completed_total % history_size`.
    pub(super) completed: Vec<CompletedOp>,
    pub(super) completed_total: u64,
    pub(super) shutdown: bool,
}

/// State shared between the manager handle, the scheduler thread, and
/// worker closures.
pub(super) struct ManagerShared {
    pub(super) state: Mutex<ManagerState>,
    /// Wakes the scheduler thread on registration, completion, and
    /// shutdown; also signalled when completions land.
    pub(super) state_cv: Condvar,
    pub(super) options: ManagerOptions,
    pub(super) memory: Arc<dyn MemoryProbe>,
    pub(super) tracker: InflightTracker,
    /// Memory pressure threshold in bytes; computed during `init`.
    pub(super) mem_target: AtomicU64,
}

impl ManagerShared {
    /// Acquire the manager lock, recovering from poisoning.
    ///
    /// A panic on a fatal-path assertion may poison the mutex; shutdown
    /// and observers still need the state to drain and report.
    pub(super) fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Schedules background maintenance ops (flushes, compactions, log GC)
/// over a bounded worker pool.
///
/// One dedicated scheduler thread polls registered ops for stats each tick
/// and dispatches at most one op per tick; `perform()` runs on the worker
/// pool. The manager never owns op objects: registrants keep ownership and
/// must call [`unregister_op`](Self::unregister_op) before dropping one.
pub struct MaintenanceManager {
    pub(super) shared: Arc<ManagerShared>,
    scheduler: Option<JoinHandle<()>>,
}

impl MaintenanceManager {
    /// Create a manager. No threads start until [`init`](Self::init).
    pub fn new(options: ManagerOptions, memory: Arc<dyn MemoryProbe>) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                state: Mutex::new(ManagerState {
                    ops: BTreeMap::new(),
                    running_ops: 0,
                    completed: Vec::new(),
                    completed_total: 0,
                    shutdown: false,
                }),
                state_cv: Condvar::new(),
                options,
                memory,
                tracker: InflightTracker::new(),
                mem_target: AtomicU64::new(0),
            }),
            scheduler: None,
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.shared.options
    }

    /// Start the worker pool and the scheduler thread.
    pub fn init(&mut self) -> Result<()> {
        let options = &self.shared.options;
        assert!(options.num_threads >= 1, "num_threads must be at least 1");
        assert!(options.history_size >= 1, "history_size must be at least 1");
        assert!(self.scheduler.is_none(), "maintenance manager already initialized");

        let mem_target = self.calculate_mem_target();
        self.shared.mem_target.store(mem_target, Ordering::Relaxed);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_threads)
            .thread_name(|i| format!("maintenance-worker-{i}"))
            .build()
            .map_err(|e| StrataError::WorkerPool(e.to_string()))?;

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("maintenance-scheduler".to_string())
            .spawn(move || run_scheduler(shared, pool))?;
        self.scheduler = Some(handle);

        info!(
            threads = self.shared.options.num_threads,
            mem_target, "maintenance manager started"
        );
        Ok(())
    }

    /// Stop scheduling and wait for in-flight ops to finish.
    ///
    /// Running `perform()` calls are not interrupted; this blocks until
    /// they complete. After return no further ops will be dispatched.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.lock_state();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            self.shared.state_cv.notify_all();
        }

        if let Some(handle) = self.scheduler.take() {
            if handle.join().is_err() {
                warn!("maintenance scheduler thread panicked");
            }
        }

        // The scheduler is gone, so nothing new gets tracked; drain what
        // is still running.
        self.shared.tracker.wait_for_all_to_finish();
        info!("maintenance manager stopped");
    }

    /// Register an op. Fatal on duplicate names, empty names, or
    /// registration after shutdown. Callable from any thread.
    pub fn register_op(&self, op: Arc<dyn MaintenanceOp>) {
        let name = op.name().to_string();
        assert!(!name.is_empty(), "maintenance op name must not be empty");

        let mut state = self.shared.lock_state();
        assert!(!state.shutdown, "register_op called after shutdown");
        if state.ops.contains_key(&name) {
            panic!("maintenance op {name} is already registered");
        }
        state.ops.insert(
            name.clone(),
            OpRecord {
                op,
                stats: OpStats::default(),
                run: Arc::new(OpRunState::new()),
            },
        );
        debug!(op = %name, "registered maintenance op");
        self.shared.state_cv.notify_all();
    }

    /// Remove an op from scheduling consideration.
    ///
    /// If the op is currently running this blocks until it finishes; on
    /// return the caller may safely drop the op. Fatal if the op is not
    /// registered. Must not be called from the op's own `perform()`.
    pub fn unregister_op(&self, op: &Arc<dyn MaintenanceOp>) {
        let name = op.name();
        let mut state = self.shared.lock_state();
        let record = match state.ops.remove(name) {
            Some(record) => record,
            None => panic!("maintenance op {name} is not registered"),
        };
        assert!(
            Arc::ptr_eq(&record.op, op),
            "maintenance op {name} was registered by a different instance"
        );

        let run = record.run;
        while run.running.load(Ordering::SeqCst) > 0 {
            state = run
                .quiesce
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        drop(state);
        debug!(op = %name, "unregistered maintenance op");
    }

    /// Snapshot registered ops, the completion history, and in-flight
    /// counts. Usable before init and after shutdown.
    pub fn status_dump(&self) -> MaintenanceStatus {
        let state = self.shared.lock_state();

        let ops = state
            .ops
            .iter()
            .map(|(name, record)| OpStatusSnapshot {
                name: name.clone(),
                stats: record.stats,
                running: record.run.running.load(Ordering::SeqCst),
                durations: record.op.duration_histogram().snapshot(),
            })
            .collect();

        // Ring entries in insertion order, oldest first.
        let capacity = self.shared.options.history_size as u64;
        let completed = if state.completed_total <= capacity {
            state.completed.clone()
        } else {
            let split = (state.completed_total % capacity) as usize;
            let mut entries = Vec::with_capacity(state.completed.len());
            entries.extend_from_slice(&state.completed[split..]);
            entries.extend_from_slice(&state.completed[..split]);
            entries
        };

        MaintenanceStatus {
            ops,
            completed,
            completed_total: state.completed_total,
            running_ops: state.running_ops,
            mem_target: self.shared.mem_target.load(Ordering::Relaxed),
            inflight: self.shared.tracker.counts(),
        }
    }

    fn calculate_mem_target(&self) -> u64 {
        let options = &self.shared.options;
        if options.memory_limit >= 0 {
            options.memory_limit as u64
        } else {
            // No explicit ceiling: target 60% of installed memory.
            self.shared.memory.total_memory() / 5 * 3
        }
    }
}

impl Drop for MaintenanceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
