mod common;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use common::FakeDeliveryPipeline;
use delivery_tunnel_harness::prelude::*;
use pretty_assertions::assert_eq;

struct Fixture {
    addr: SocketAddr,
    store: Arc<InMemoryCorrelationStore>,
}

fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| Fixture {
        addr: common::serve_in_background(FakeDeliveryPipeline::delivering()),
        store: Arc::new(InMemoryCorrelationStore::new()),
    })
}

fn cli(run_id: &str) -> TunnelScenarioCli {
    TunnelScenarioCli {
        environment: "local".to_string(),
        scenario: "basic".to_string(),
        api_key: "test-api-key".to_string(),
        run_id: run_id.to_string(),
        max_iterations: 1000,
        config_dir: PathBuf::from("config"),
        no_progress: true,
    }
}

fn setup(ctx: &mut RunnerContext<HarnessRunnerContext>) -> HookResult {
    let fixture = fixture();
    ctx.get_mut()
        .set_environment(common::environment(fixture.addr));
    ctx.get_mut().set_store(fixture.store.clone());

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

fn get_string(key: &str) -> Option<String> {
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(fixture().store.get_string(key))
        .unwrap()
}

#[test]
fn every_accepted_event_is_queued_for_verification() {
    let run_id = "publish-100";
    let scenario = ScenarioDefinitionBuilder::<HarnessRunnerContext, HarnessVuContext>::new(
        run_id,
        cli(run_id),
    )
    .with_default_executor(
        "events",
        ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate::new(
            100,
            Duration::from_secs(1),
            10,
            100,
        )),
    )
    .with_default_threshold(EVENT_PUBLISH_SUCCESS_RATE, &["rate>=1.0"])
    .use_setup(setup)
    .use_behaviour(agent_behaviour)
    .use_vu_teardown(log_vu_summary)
    .use_teardown(report_published_events);

    let report = run(scenario).unwrap();

    assert_eq!(Some(100), report.counter(EVENTS_PUBLISHED));
    assert_eq!(None, report.counter(DROPPED_ITERATIONS));
    assert_eq!(
        Some(&MetricSummary::Rate {
            passes: 100,
            total: 100
        }),
        report.metrics.get(EVENT_PUBLISH_SUCCESS_RATE)
    );
    assert_eq!(1, report.checks["tenant created"].passes);
    assert_eq!(1, report.checks["destination created"].passes);
    assert!(report.passed());

    let keys = CorrelationKeys::new(run_id);
    let queued = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(fixture().store.list_len(&keys.list()))
        .unwrap();
    assert_eq!(100, queued);
    assert_eq!(Some("100".to_string()), get_string(&keys.count()));
}
