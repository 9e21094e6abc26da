use std::time::Duration;

use delivery_tunnel_harness::prelude::*;

fn setup(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    load_environment_config(ctx)?;
    configure_run(ctx)?;
    configure_clients(ctx)?;
    connect_correlation_store(ctx)?;
    provision_tenant_and_destination(ctx)?;
    reset_correlation_keys(ctx)?;
    start_publisher(ctx)?;
    Ok(())
}

fn agent_behaviour(ctx: &mut VuContext<HarnessRunnerContext, HarnessVuContext>) -> HookResult {
    publish_event(ctx)?;
    Ok(())
}

fn main() -> TunnelResult<()> {
    let builder =
        ScenarioDefinitionBuilder::<HarnessRunnerContext, HarnessVuContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_default_executor(
            "events",
            ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate::new(
                100,
                Duration::from_secs(30),
                10,
                100,
            )),
        )
        .with_default_threshold(HTTP_REQ_DURATION, &["p(95)<1000"])
        .with_default_threshold(HTTP_REQ_FAILED, &["rate<0.01"])
        .with_default_threshold(EVENT_PUBLISH_SUCCESS_RATE, &["rate>=1.0"])
        .with_scenario_config("events-throughput")
        .use_setup(setup)
        .use_behaviour(agent_behaviour)
        .use_vu_teardown(log_vu_summary)
        .use_teardown(report_published_events);

    let report = run(builder)?;
    if !report.passed() {
        anyhow::bail!("Publish phase failed its thresholds");
    }

    Ok(())
}
