use std::time::Duration;

use delivery_tunnel_harness::prelude::*;

fn setup(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    load_environment_config(ctx)?;
    configure_run(ctx)?;
    configure_clients(ctx)?;
    connect_correlation_store(ctx)?;
    start_verifier(ctx)?;
    Ok(())
}

fn agent_behaviour(ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>) -> HookResult {
    verify_next_event(ctx)?;
    Ok(())
}

fn main() -> TunnelResult<()> {
    let builder =
        ScenarioDefinitionBuilder::<HarnessRunnerContext, HarnessVuContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        );

    // Iterations beyond the number of published events find the store empty and do nothing.
    let iterations = builder.cli().max_iterations;

    let builder = builder
        .with_default_executor(
            "verify",
            ExecutorConfig::SharedIterations(SharedIterations::new(
                iterations,
                10,
                Duration::from_secs(300),
            )),
        )
        .with_default_threshold(CHECKS, &["rate>=1.0"])
        .with_default_threshold(EVENT_VERIFICATION_RATE, &["rate>=1.0"])
        .with_default_threshold(END_TO_END_EVENT_LATENCY, &["p(95)<1000"])
        .with_default_threshold(RECEIVE_LATENCY, &["p(95)<500"])
        .with_default_threshold(INTERNAL_OUTPOST_EVENT_LATENCY, &["p(95)<500"])
        .with_scenario_config("events-verify")
        .use_setup(setup)
        .use_behaviour(agent_behaviour)
        .use_vu_teardown(log_vu_summary)
        .use_teardown(cleanup_correlation_keys);

    let report = run(builder)?;
    if !report.passed() {
        anyhow::bail!("Verify phase failed its thresholds");
    }

    Ok(())
}
