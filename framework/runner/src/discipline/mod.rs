//! Strategies for dispatching iterations to virtual users.

mod constant_arrival_rate;
mod shared_iterations;

use std::sync::Arc;
use std::time::Instant;

use delivery_tunnel_core::prelude::{ShutdownSignalError, WorkerBailError};

use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::VuHookMut;
use crate::options::ExecutorConfig;

pub(crate) use constant_arrival_rate::run_constant_arrival_rate;
pub(crate) use shared_iterations::run_shared_iterations;

/// Counter of iterations that ran to completion or failed.
pub const ITERATIONS: &str = "iterations";
/// Trend of iteration wall time, in milliseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Counter of scheduled iterations that could not be started because every VU was busy.
pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
/// Counter of iterations whose behaviour returned an error.
pub const ITERATION_ERRORS: &str = "iteration_errors";

pub(crate) struct VuHooks<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub setup: Option<VuHookMut<RV, V>>,
    pub behaviour: VuHookMut<RV, V>,
    pub teardown: Option<VuHookMut<RV, V>>,
}

// Derive would require `RV: Clone` and `V: Clone`.
impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for VuHooks<RV, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Copy for VuHooks<RV, V> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IterationOutcome {
    Completed,
    Failed,
    /// The behaviour asked for this VU to stop.
    Bailed,
    /// Interrupted by the shutdown signal, not recorded.
    Cancelled,
}

pub(crate) fn drive<RV: UserValuesConstraint, V: UserValuesConstraint>(
    config: &ExecutorConfig,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
) -> anyhow::Result<()> {
    match config {
        ExecutorConfig::ConstantArrivalRate(c) => {
            run_constant_arrival_rate(c, runner_context, hooks)
        }
        ExecutorConfig::SharedIterations(s) => run_shared_iterations(s, runner_context, hooks),
    }
}

/// Create the context for a new VU and run its setup hook. Returns `None` if the setup failed.
pub(crate) fn start_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    vu_id: usize,
    runner_context: &Arc<RunnerContext<RV>>,
    hooks: &VuHooks<RV, V>,
) -> Option<VuContext<RV, V>> {
    let mut context = VuContext::new(
        vu_id,
        runner_context.clone(),
        runner_context.shutdown_listener(),
    );

    if let Some(setup) = hooks.setup {
        if let Err(e) = setup(&mut context) {
            log::error!("VU {vu_id} setup failed, it will not run any iterations: {e:?}");
            return None;
        }
    }

    Some(context)
}

pub(crate) fn finish_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    mut context: VuContext<RV, V>,
    hooks: &VuHooks<RV, V>,
) {
    if let Some(teardown) = hooks.teardown {
        if let Err(e) = teardown(&mut context) {
            log::error!("VU {} teardown failed: {e:?}", context.vu_id());
        }
    }
}

/// Run the behaviour once and record it.
pub(crate) fn run_iteration<RV: UserValuesConstraint, V: UserValuesConstraint>(
    context: &mut VuContext<RV, V>,
    hooks: &VuHooks<RV, V>,
) -> IterationOutcome {
    let started = Instant::now();
    let result = (hooks.behaviour)(context);
    let elapsed = started.elapsed();

    let outcome = match result {
        Ok(()) => IterationOutcome::Completed,
        Err(e) if e.is::<ShutdownSignalError>() => IterationOutcome::Cancelled,
        Err(e) if e.is::<WorkerBailError>() => {
            log::warn!("VU {} is bailing: {e}", context.vu_id());
            IterationOutcome::Bailed
        }
        Err(e) => {
            log::error!(
                "VU {} iteration {} failed: {e:?}",
                context.vu_id(),
                context.iteration()
            );
            IterationOutcome::Failed
        }
    };

    if outcome != IterationOutcome::Cancelled {
        let metrics = context.runner_context().metrics();
        metrics.add_counter(ITERATIONS, 1);
        metrics.add_trend(ITERATION_DURATION, elapsed.as_micros() as f64 / 1000.0);
        if outcome == IterationOutcome::Failed {
            metrics.add_counter(ITERATION_ERRORS, 1);
        }
    }

    context.advance_iteration();
    outcome
}
