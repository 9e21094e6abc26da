use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::context::{RunnerContext, UserValuesConstraint};
use crate::discipline::{finish_vu, run_iteration, start_vu, IterationOutcome, VuHooks};
use crate::options::SharedIterations;

pub(crate) fn run_shared_iterations<RV: UserValuesConstraint, V: UserValuesConstraint>(
    config: &SharedIterations,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
) -> anyhow::Result<()> {
    log::info!(
        "Sharing {} iterations between {} VUs for at most {:?}",
        config.iterations,
        config.vus,
        config.max_duration
    );

    let next_iteration = Arc::new(AtomicU64::new(0));
    let cutoff = Instant::now() + config.max_duration;
    let iterations = config.iterations;

    let mut handles = Vec::with_capacity(config.vus);
    for vu_id in 1..=config.vus {
        let runner_context = runner_context.clone();
        let next_iteration = next_iteration.clone();

        let handle = std::thread::Builder::new()
            .name(format!("vu-{vu_id}"))
            .spawn(move || {
                let Some(mut context) = start_vu(vu_id, &runner_context, &hooks) else {
                    return;
                };

                loop {
                    if context.shutdown_listener().should_shutdown() {
                        break;
                    }
                    if Instant::now() >= cutoff {
                        log::debug!("VU {vu_id} reached the maximum duration");
                        break;
                    }
                    if next_iteration.fetch_add(1, Ordering::AcqRel) >= iterations {
                        break;
                    }
                    if run_iteration(&mut context, &hooks) == IterationOutcome::Bailed {
                        break;
                    }
                }

                finish_vu(context, &hooks);
            })?;
        handles.push(handle);
    }

    for handle in handles {
        if handle.join().is_err() {
            log::error!("A VU thread panicked");
        }
    }

    let claimed = next_iteration.load(Ordering::Acquire).min(iterations);
    if claimed < iterations {
        log::warn!("Only {claimed} of {iterations} iterations were started before the run ended");
    }

    Ok(())
}
