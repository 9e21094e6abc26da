use std::time::Duration;

use delivery_tunnel_harness::prelude::*;

fn setup(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    load_environment_config(ctx)?;
    configure_run(ctx)?;
    configure_clients(ctx)?;
    use_in_process_store(ctx)?;
    Ok(())
}

fn agent_behaviour(ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>) -> HookResult {
    publish_and_verify_event(ctx)?;
    Ok(())
}

fn main() -> TunnelResult<()> {
    let builder =
        ScenarioDefinitionBuilder::<HarnessRunnerContext, HarnessVuContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_default_executor(
            "events",
            ExecutorConfig::SharedIterations(SharedIterations::new(
                1,
                1,
                Duration::from_secs(30),
            )),
        )
        .with_default_threshold(HTTP_REQ_DURATION, &["p(95)<1000"])
        .with_default_threshold(HTTP_REQ_FAILED, &["rate<0.01"])
        .with_scenario_config("events")
        .use_setup(setup)
        .use_behaviour(agent_behaviour)
        .use_vu_teardown(log_vu_summary);

    let report = run(builder)?;
    if !report.passed() {
        anyhow::bail!("Events scenario failed its thresholds");
    }

    Ok(())
}
