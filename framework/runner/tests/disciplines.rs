use std::path::PathBuf;
use std::time::{Duration, Instant};

use delivery_tunnel_runner::prelude::{
    run, ConstantArrivalRate, ExecutorConfig, ExecutorOverrides, HookResult,
    ScenarioDefinitionBuilder, ScenarioOptions, SharedIterations, TunnelScenarioCli,
    UserValuesConstraint, VuContext, DROPPED_ITERATIONS, ITERATIONS,
};

#[derive(Default, Debug)]
struct Shared {}

impl UserValuesConstraint for Shared {}

#[derive(Default, Debug)]
struct PerVu {}

impl UserValuesConstraint for PerVu {}

fn sample_cli_cfg() -> TunnelScenarioCli {
    TunnelScenarioCli {
        environment: "local".to_string(),
        scenario: "basic".to_string(),
        api_key: "test-api-key".to_string(),
        run_id: "discipline-test".to_string(),
        max_iterations: 50,
        config_dir: PathBuf::from("config"),
        no_progress: true,
    }
}

fn noop(_ctx: &mut VuContext<Shared, PerVu>) -> HookResult {
    Ok(())
}

fn slow(_ctx: &mut VuContext<Shared, PerVu>) -> HookResult {
    std::thread::sleep(Duration::from_millis(200));
    Ok(())
}

fn builder(name: &str, executor: ExecutorConfig) -> ScenarioDefinitionBuilder<Shared, PerVu> {
    ScenarioDefinitionBuilder::<Shared, PerVu>::new(name, sample_cli_cfg())
        .with_default_executor("default", executor)
}

#[test]
fn shared_iterations_runs_each_iteration_once() {
    let scenario = builder(
        "shared_iterations_runs_each_iteration_once",
        ExecutorConfig::SharedIterations(SharedIterations::new(50, 5, Duration::from_secs(30))),
    )
    .use_behaviour(noop);

    let report = run(scenario).unwrap();
    assert_eq!(Some(50), report.counter(ITERATIONS));
}

#[test]
fn arrival_rate_issues_every_scheduled_iteration() {
    let scenario = builder(
        "arrival_rate_issues_every_scheduled_iteration",
        ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate::new(
            100,
            Duration::from_secs(1),
            10,
            100,
        )),
    )
    .use_behaviour(noop);

    let report = run(scenario).unwrap();
    assert_eq!(Some(100), report.counter(ITERATIONS));
    assert_eq!(None, report.counter(DROPPED_ITERATIONS));
}

#[test]
fn arrival_rate_drops_iterations_when_vus_are_exhausted() {
    let scenario = builder(
        "arrival_rate_drops_iterations_when_vus_are_exhausted",
        ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate::new(
            50,
            Duration::from_secs(1),
            1,
            2,
        )),
    )
    .use_behaviour(slow);

    let report = run(scenario).unwrap();
    let iterations = report.counter(ITERATIONS).unwrap_or_default();
    let dropped = report.counter(DROPPED_ITERATIONS).unwrap_or_default();

    assert!(dropped > 0);
    assert_eq!(50, iterations + dropped);
}

#[test]
fn graceful_stop_cancels_in_flight_iterations() {
    fn stuck(ctx: &mut VuContext<Shared, PerVu>) -> HookResult {
        ctx.runner_context().executor().execute_in_place(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
    }

    let mut config = SharedIterations::new(10, 2, Duration::from_millis(200));
    config.graceful_stop = Duration::from_millis(100);

    let started = Instant::now();
    let report = run(builder(
        "graceful_stop_cancels_in_flight_iterations",
        ExecutorConfig::SharedIterations(config),
    )
    .use_behaviour(stuck))
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    // Cancelled iterations are not recorded.
    assert_eq!(None, report.counter(ITERATIONS));
}

#[test]
fn failing_threshold_fails_the_run() {
    let scenario = builder(
        "failing_threshold_fails_the_run",
        ExecutorConfig::SharedIterations(SharedIterations::new(10, 2, Duration::from_secs(30))),
    )
    .with_default_threshold(ITERATIONS, &["count<5"])
    .use_behaviour(noop);

    let report = run(scenario).unwrap();
    assert!(!report.passed());
    assert_eq!(1, report.failed_thresholds().count());
}

#[test]
fn options_override_defaults() {
    let mut options = ScenarioOptions::default();
    options
        .thresholds
        .insert(ITERATIONS.to_string(), vec!["count==3".to_string()]);
    options.scenarios.insert(
        "default".to_string(),
        ExecutorOverrides {
            iterations: Some(3),
            ..Default::default()
        },
    );

    let scenario = builder(
        "options_override_defaults",
        ExecutorConfig::SharedIterations(SharedIterations::new(10, 2, Duration::from_secs(30))),
    )
    .with_default_threshold(ITERATIONS, &["count<1"])
    .with_options(options)
    .use_behaviour(noop);

    let report = run(scenario).unwrap();
    assert_eq!(Some(3), report.counter(ITERATIONS));
    assert!(report.passed());
}
