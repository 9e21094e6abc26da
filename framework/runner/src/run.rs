use std::sync::Arc;

use anyhow::Context;
use delivery_tunnel_instruments::{print_summary, MetricsAggregator, RunReport};

use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::ScenarioDefinitionBuilder;
use crate::discipline::{drive, VuHooks};
use crate::executor::Executor;
use crate::progress::start_progress;
use crate::shutdown::start_shutdown_listener;

/// Run a scenario to completion and return its evaluated metrics.
///
/// A failing global setup aborts the run with an error. Every other hook failure is logged and
/// the run continues. Whether the thresholds passed is reported through [RunReport::passed].
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunReport> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario {} with the {} executor for run {}",
        definition.name,
        definition.executor.name(),
        definition.cli.run_id
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let metrics = Arc::new(
        MetricsAggregator::with_thresholds(&definition.thresholds)
            .context("Invalid threshold configuration")?,
    );

    let mut runner_context = RunnerContext::new(
        executor,
        metrics.clone(),
        shutdown_handle.clone(),
        definition.cli.clone(),
        definition.executor.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context).context("Scenario setup failed")?;
    }

    let runner_context = Arc::new(runner_context);
    let planned_runtime = definition.executor.planned_runtime();

    if !definition.cli.no_progress {
        start_progress(planned_runtime, shutdown_handle.new_listener());
    }

    // In-flight iterations get the graceful stop period to finish, after which they are cancelled.
    let hard_deadline = planned_runtime + definition.executor.graceful_stop();
    {
        let shutdown_handle = shutdown_handle.clone();
        let mut listener = shutdown_handle.new_listener();
        runner_context.executor().spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(hard_deadline) => {
                    log::warn!("Graceful stop period elapsed, cancelling in-flight iterations");
                    shutdown_handle.shutdown();
                }
                _ = listener.wait_for_shutdown() => {}
            }
        });
    }

    let hooks = VuHooks {
        setup: definition.setup_vu_fn,
        behaviour: definition.behaviour,
        teardown: definition.teardown_vu_fn,
    };
    let driven = drive(&definition.executor, runner_context.clone(), hooks);

    // Stops the timer and the progress bar.
    shutdown_handle.shutdown();

    if let Some(teardown_fn) = definition.teardown_fn {
        // Best effort, the summary should still be reported.
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {e:?}");
        }
    }

    driven?;

    let report = metrics.evaluate();
    print_summary(&report);

    for failed in report.failed_thresholds() {
        log::error!(
            "Threshold {} on {} failed, observed {:?}",
            failed.expression,
            failed.metric,
            failed.observed
        );
    }

    Ok(report)
}
