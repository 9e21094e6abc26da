use std::path::PathBuf;
use std::time::Duration;

use delivery_tunnel_harness::prelude::*;
use pretty_assertions::assert_eq;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

#[test]
fn local_environment_loads() {
    let env = load_environment(&config_dir(), "local").unwrap();

    assert_eq!("local", env.name);
    assert_eq!(Duration::from_secs(5), env.mock_webhook.verification_poll_timeout);
    assert!(env.redis.starts_with("redis://"));
}

#[test]
fn scenario_files_apply_to_their_executors() {
    let cases = [
        ("events-throughput", "basic", "events"),
        ("events-throughput", "burst", "events"),
        ("events-verify", "basic", "verify"),
        ("events", "basic", "events"),
        ("health", "basic", "health"),
    ];

    for (test, scenario, executor_name) in cases {
        let options = load_scenario_options(&config_dir(), test, scenario).unwrap();
        let overrides = options
            .scenarios
            .get(executor_name)
            .unwrap_or_else(|| panic!("{test}/{scenario} has no `{executor_name}` options"));

        let defaults = match test {
            "events-verify" | "events" => ExecutorConfig::SharedIterations(
                SharedIterations::new(1000, 10, Duration::from_secs(300)),
            ),
            _ => ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate::new(
                1,
                Duration::from_secs(1),
                1,
                1,
            )),
        };
        let executor = defaults.apply(overrides).unwrap();
        executor.validate().unwrap();
    }
}
