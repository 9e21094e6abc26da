use std::time::Duration;

use delivery_tunnel_harness::prelude::*;

fn setup(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    load_environment_config(ctx)?;
    configure_run(ctx)?;
    configure_clients(ctx)?;
    Ok(())
}

fn main() -> TunnelResult<()> {
    let builder =
        ScenarioDefinitionBuilder::<HarnessRunnerContext, HarnessVuContext>::new_with_init(
            env!("CARGO_PKG_NAME"),
        )
        .with_default_executor(
            "health",
            ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate::new(
                10,
                Duration::from_secs(30),
                1,
                1,
            )),
        )
        .with_scenario_config("health")
        .use_setup(setup)
        .use_behaviour(check_health);

    let report = run(builder)?;
    if !report.passed() {
        log::error!("Health check thresholds failed");
        anyhow::bail!("Health scenario failed its thresholds");
    }

    Ok(())
}
