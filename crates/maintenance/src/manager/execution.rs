use std::sync::atomic::Ordering;
use std::sync::{Arc, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::op::MaintenanceOp;
use crate::types::CompletedOp;

use super::core::{ManagerShared, ManagerState, OpRecord, OpRunState};
use super::scheduling::Trigger;

/// Scheduler thread body: the tick loop.
///
/// Each tick refreshes every op's stats under the manager lock, selects at
/// most one op, and dispatches it. `prepare()` runs here (without the
/// lock); `perform()` runs on the worker pool.
pub(super) fn run_scheduler(shared: Arc<ManagerShared>, pool: rayon::ThreadPool) {
    let interval = shared.options.polling_interval();
    let mut state = shared.lock_state();
    let mut next_tick_at = Instant::now() + interval;

    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        if now < next_tick_at {
            let (guard, _) = shared
                .state_cv
                .wait_timeout(state, next_tick_at - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
            if state.shutdown {
                break;
            }
        }

        // With the pool saturated there is no point polling stats.
        if state.running_ops < shared.options.num_threads {
            for record in state.ops.values_mut() {
                let OpRecord { op, stats, .. } = record;
                op.update_stats(stats);
            }

            if let Some((name, trigger)) = shared.find_best_op(&state) {
                state = dispatch_op(&shared, state, &pool, &name, trigger);
            }
        }

        next_tick_at = Instant::now() + interval;
    }

    debug!("maintenance scheduler thread exiting");
}

/// Launch `name`: bump counters under the lock, run `prepare()` without
/// it, then hand `perform()` to the pool. Returns the reacquired guard.
fn dispatch_op<'a>(
    shared: &'a Arc<ManagerShared>,
    mut state: MutexGuard<'a, ManagerState>,
    pool: &rayon::ThreadPool,
    name: &str,
    trigger: Trigger,
) -> MutexGuard<'a, ManagerState> {
    let record = state.ops.get(name).expect("selected op vanished from registry");
    let op = Arc::clone(&record.op);
    let run = Arc::clone(&record.run);

    run.running.fetch_add(1, Ordering::SeqCst);
    op.running_gauge().increment();
    state.running_ops += 1;
    drop(state);

    if !op.prepare() {
        debug!(op = %name, "prepare refused, dispatch aborted");
        let mut state = shared.lock_state();
        retire_invocation(&mut state, &op, &run);
        shared.state_cv.notify_all();
        return state;
    }

    info!(op = %name, trigger = %trigger, "launching maintenance op");
    let kind = op.kind();
    shared.tracker.add(name, kind);

    let worker_shared = Arc::clone(shared);
    let history_size = shared.options.history_size as u64;
    let name = name.to_string();
    pool.spawn(move || {
        let started_at = Utc::now();
        let start = Instant::now();
        op.perform();
        let duration = start.elapsed();

        op.duration_histogram().record(duration);
        info!(
            op = %name,
            "maintenance op finished in {:.3}s",
            duration.as_secs_f64()
        );

        {
            let mut state = worker_shared.lock_state();
            retire_invocation(&mut state, &op, &run);

            let entry = CompletedOp {
                name: name.clone(),
                duration,
                started_at,
            };
            let index = (state.completed_total % history_size) as usize;
            if index == state.completed.len() {
                state.completed.push(entry);
            } else {
                assert!(
                    index < state.completed.len(),
                    "completion ring index out of range"
                );
                state.completed[index] = entry;
            }
            state.completed_total += 1;
            worker_shared.state_cv.notify_all();
        }

        worker_shared.tracker.release(&name, kind);
    });

    shared.lock_state()
}

/// Undo the counter bumps from dispatch. Caller holds the manager lock.
fn retire_invocation(state: &mut ManagerState, op: &Arc<dyn MaintenanceOp>, run: &OpRunState) {
    let prev = run.running.fetch_sub(1, Ordering::SeqCst);
    assert!(prev > 0, "maintenance op running count underflow");
    if prev == 1 {
        run.quiesce.notify_all();
    }
    op.running_gauge().decrement();
    assert!(state.running_ops > 0, "manager running_ops underflow");
    state.running_ops -= 1;
}
