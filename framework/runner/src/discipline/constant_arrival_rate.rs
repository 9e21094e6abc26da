use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::context::{RunnerContext, UserValuesConstraint};
use crate::discipline::{
    finish_vu, run_iteration, start_vu, IterationOutcome, VuHooks, DROPPED_ITERATIONS,
};
use crate::options::ConstantArrivalRate;

const MAX_TICK_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct PoolState {
    queue: VecDeque<u64>,
    idle: usize,
    closed: bool,
}

/// Hands scheduled iterations to VUs that are waiting for work.
#[derive(Debug, Default)]
struct Pool {
    state: Mutex<PoolState>,
    ready: Condvar,
}

impl Pool {
    /// Offer an iteration to an idle VU. Returns false if every VU is busy.
    fn offer(&self, iteration: u64) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.idle <= state.queue.len() {
            return false;
        }
        state.queue.push_back(iteration);
        self.ready.notify_one();
        true
    }

    /// Block until an iteration is available. Returns `None` once the pool is closed and drained.
    fn next_job(&self) -> Option<u64> {
        let mut state = self.state.lock();
        state.idle += 1;
        loop {
            if let Some(iteration) = state.queue.pop_front() {
                state.idle -= 1;
                return Some(iteration);
            }
            if state.closed {
                state.idle -= 1;
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }
}

pub(crate) fn run_constant_arrival_rate<RV: UserValuesConstraint, V: UserValuesConstraint>(
    config: &ConstantArrivalRate,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
) -> anyhow::Result<()> {
    let pool = Arc::new(Pool::default());
    let mut handles = Vec::with_capacity(config.max_vus);

    for _ in 0..config.pre_allocated_vus {
        let vu_id = handles.len() + 1;
        handles.push(spawn_vu(vu_id, None, &pool, &runner_context, hooks)?);
    }

    let total = config.total_iterations();
    log::info!(
        "Starting {} iterations at {} per {:?} over {:?} with {} of up to {} VUs",
        total,
        config.rate,
        config.time_unit,
        config.duration,
        config.pre_allocated_vus,
        config.max_vus
    );

    let mut shutdown_listener = runner_context.shutdown_listener();
    let metrics = runner_context.metrics().clone();
    let start = Instant::now();
    let mut dropped = 0u64;

    'dispatch: for iteration in 0..total {
        let offset = Duration::from_nanos(
            (config.time_unit.as_nanos() * iteration as u128 / config.rate as u128) as u64,
        );
        let due = start + offset;
        loop {
            if shutdown_listener.should_shutdown() {
                break 'dispatch;
            }
            let now = Instant::now();
            if now >= due {
                break;
            }
            std::thread::sleep((due - now).min(MAX_TICK_WAIT));
        }

        if pool.offer(iteration) {
            continue;
        }

        if handles.len() < config.max_vus {
            let vu_id = handles.len() + 1;
            match spawn_vu(vu_id, Some(iteration), &pool, &runner_context, hooks) {
                Ok(handle) => {
                    log::debug!("All VUs busy, started VU {vu_id}");
                    handles.push(handle);
                    continue;
                }
                Err(e) => log::error!("Could not start another VU: {e:?}"),
            }
        }

        log::debug!("Dropped iteration {iteration}, all {} VUs are busy", handles.len());
        metrics.add_counter(DROPPED_ITERATIONS, 1);
        dropped += 1;
    }

    pool.close();
    log::debug!("Dispatch finished, waiting for {} VUs", handles.len());

    for handle in handles {
        if handle.join().is_err() {
            log::error!("A VU thread panicked");
        }
    }

    if dropped > 0 {
        log::warn!(
            "Dropped {dropped} iterations because all {} VUs were busy, consider raising maxVUs",
            config.max_vus
        );
    }

    Ok(())
}

fn spawn_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    vu_id: usize,
    first_iteration: Option<u64>,
    pool: &Arc<Pool>,
    runner_context: &Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
) -> anyhow::Result<JoinHandle<()>> {
    let pool = pool.clone();
    let runner_context = runner_context.clone();

    let handle = std::thread::Builder::new()
        .name(format!("vu-{vu_id}"))
        .spawn(move || {
            let Some(mut context) = start_vu(vu_id, &runner_context, &hooks) else {
                return;
            };

            let mut next = first_iteration.or_else(|| pool.next_job());
            while let Some(iteration) = next {
                log::trace!("VU {vu_id} running scheduled iteration {iteration}");
                if run_iteration(&mut context, &hooks) == IterationOutcome::Bailed {
                    break;
                }
                next = pool.next_job();
            }

            finish_vu(context, &hooks);
        })?;

    Ok(handle)
}
