use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptionsError {
    #[error("executor `{executor}` requires `{field}` to be set")]
    MissingField {
        executor: &'static str,
        field: &'static str,
    },
    #[error("unknown executor `{0}`")]
    UnknownExecutor(String),
    #[error("invalid executor options: {0}")]
    Invalid(String),
}

/// Issue a fixed number of iterations per time unit, regardless of how long each one takes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantArrivalRate {
    pub rate: u64,
    pub time_unit: Duration,
    pub duration: Duration,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
    pub graceful_stop: Duration,
}

impl ConstantArrivalRate {
    pub fn new(rate: u64, duration: Duration, pre_allocated_vus: usize, max_vus: usize) -> Self {
        Self {
            rate,
            time_unit: Duration::from_secs(1),
            duration,
            pre_allocated_vus,
            max_vus,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    /// Time between two scheduled iterations.
    pub fn interval(&self) -> Duration {
        self.time_unit.div_f64(self.rate as f64)
    }

    /// Number of iterations scheduled over the whole duration.
    pub fn total_iterations(&self) -> u64 {
        (self.duration.as_nanos() * self.rate as u128 / self.time_unit.as_nanos()) as u64
    }
}

/// Share a fixed number of iterations between a fixed pool of workers.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedIterations {
    pub iterations: u64,
    pub vus: usize,
    pub max_duration: Duration,
    pub graceful_stop: Duration,
}

impl SharedIterations {
    pub fn new(iterations: u64, vus: usize, max_duration: Duration) -> Self {
        Self {
            iterations,
            vus,
            max_duration,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorConfig {
    ConstantArrivalRate(ConstantArrivalRate),
    SharedIterations(SharedIterations),
}

impl ExecutorConfig {
    pub const CONSTANT_ARRIVAL_RATE: &'static str = "constant-arrival-rate";
    pub const SHARED_ITERATIONS: &'static str = "shared-iterations";

    pub fn name(&self) -> &'static str {
        match self {
            ExecutorConfig::ConstantArrivalRate(_) => Self::CONSTANT_ARRIVAL_RATE,
            ExecutorConfig::SharedIterations(_) => Self::SHARED_ITERATIONS,
        }
    }

    /// How long the executor keeps starting new iterations.
    pub fn planned_runtime(&self) -> Duration {
        match self {
            ExecutorConfig::ConstantArrivalRate(c) => c.duration,
            ExecutorConfig::SharedIterations(s) => s.max_duration,
        }
    }

    /// How long in-flight iterations may keep running once no new ones are started.
    pub fn graceful_stop(&self) -> Duration {
        match self {
            ExecutorConfig::ConstantArrivalRate(c) => c.graceful_stop,
            ExecutorConfig::SharedIterations(s) => s.graceful_stop,
        }
    }

    /// Apply overrides field by field. Naming a different executor replaces the configuration, in
    /// which case every field that executor needs must be supplied.
    pub fn apply(&self, overrides: &ExecutorOverrides) -> Result<ExecutorConfig, OptionsError> {
        let switching = overrides
            .executor
            .as_deref()
            .is_some_and(|name| name != self.name());

        let merged = if switching {
            match overrides.executor.as_deref() {
                Some(Self::CONSTANT_ARRIVAL_RATE) => {
                    let executor = Self::CONSTANT_ARRIVAL_RATE;
                    ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate {
                        rate: required(executor, "rate", overrides.rate)?,
                        time_unit: overrides.time_unit.unwrap_or(Duration::from_secs(1)),
                        duration: required(executor, "duration", overrides.duration)?,
                        pre_allocated_vus: required(
                            executor,
                            "preAllocatedVUs",
                            overrides.pre_allocated_vus,
                        )?,
                        max_vus: required(executor, "maxVUs", overrides.max_vus)?,
                        graceful_stop: overrides.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
                    })
                }
                Some(Self::SHARED_ITERATIONS) => {
                    let executor = Self::SHARED_ITERATIONS;
                    ExecutorConfig::SharedIterations(SharedIterations {
                        iterations: required(executor, "iterations", overrides.iterations)?,
                        vus: required(executor, "vus", overrides.vus)?,
                        max_duration: required(executor, "maxDuration", overrides.max_duration)?,
                        graceful_stop: overrides.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
                    })
                }
                other => {
                    return Err(OptionsError::UnknownExecutor(
                        other.unwrap_or_default().to_string(),
                    ))
                }
            }
        } else {
            match self {
                ExecutorConfig::ConstantArrivalRate(c) => {
                    ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate {
                        rate: overrides.rate.unwrap_or(c.rate),
                        time_unit: overrides.time_unit.unwrap_or(c.time_unit),
                        duration: overrides.duration.unwrap_or(c.duration),
                        pre_allocated_vus: overrides
                            .pre_allocated_vus
                            .unwrap_or(c.pre_allocated_vus),
                        max_vus: overrides.max_vus.unwrap_or(c.max_vus),
                        graceful_stop: overrides.graceful_stop.unwrap_or(c.graceful_stop),
                    })
                }
                ExecutorConfig::SharedIterations(s) => {
                    ExecutorConfig::SharedIterations(SharedIterations {
                        iterations: overrides.iterations.unwrap_or(s.iterations),
                        vus: overrides.vus.unwrap_or(s.vus),
                        max_duration: overrides.max_duration.unwrap_or(s.max_duration),
                        graceful_stop: overrides.graceful_stop.unwrap_or(s.graceful_stop),
                    })
                }
            }
        };

        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        match self {
            ExecutorConfig::ConstantArrivalRate(c) => {
                if c.rate == 0 || c.time_unit.is_zero() {
                    return Err(OptionsError::Invalid(
                        "rate and timeUnit must be greater than zero".to_string(),
                    ));
                }
                if c.max_vus == 0 || c.max_vus < c.pre_allocated_vus {
                    return Err(OptionsError::Invalid(format!(
                        "maxVUs ({}) must be at least 1 and not less than preAllocatedVUs ({})",
                        c.max_vus, c.pre_allocated_vus
                    )));
                }
            }
            ExecutorConfig::SharedIterations(s) => {
                if s.vus == 0 {
                    return Err(OptionsError::Invalid(
                        "vus must be greater than zero".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn required<T>(
    executor: &'static str,
    field: &'static str,
    value: Option<T>,
) -> Result<T, OptionsError> {
    value.ok_or(OptionsError::MissingField { executor, field })
}

/// Partial executor options as found in a scenario file. Every field is optional so that a file
/// only needs to name what it changes.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorOverrides {
    pub executor: Option<String>,
    pub rate: Option<u64>,
    #[serde(default, with = "humantime_serde")]
    pub time_unit: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
    #[serde(rename = "preAllocatedVUs")]
    pub pre_allocated_vus: Option<usize>,
    #[serde(rename = "maxVUs")]
    pub max_vus: Option<usize>,
    pub iterations: Option<u64>,
    pub vus: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub max_duration: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub graceful_stop: Option<Duration>,
}

/// Threshold and executor overrides for one scenario.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioOptions {
    pub thresholds: BTreeMap<String, Vec<String>>,
    pub scenarios: BTreeMap<String, ExecutorOverrides>,
}

#[derive(Debug, Default, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    options: Option<ScenarioOptions>,
}

/// Load `{config_dir}/scenarios/{test}/{scenario}.json`.
pub fn load_scenario_options(
    config_dir: &Path,
    test: &str,
    scenario: &str,
) -> anyhow::Result<ScenarioOptions> {
    let path = config_dir
        .join("scenarios")
        .join(test)
        .join(format!("{scenario}.json"));

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let file: ScenarioFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))?;

    Ok(file.options.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn publish_defaults() -> ExecutorConfig {
        ExecutorConfig::ConstantArrivalRate(ConstantArrivalRate::new(
            100,
            Duration::from_secs(30),
            10,
            100,
        ))
    }

    #[test]
    fn arrival_rate_schedule() {
        let config = ConstantArrivalRate::new(100, Duration::from_secs(1), 10, 100);
        assert_eq!(Duration::from_millis(10), config.interval());
        assert_eq!(100, config.total_iterations());

        let mut per_minute = ConstantArrivalRate::new(30, Duration::from_secs(120), 1, 1);
        per_minute.time_unit = Duration::from_secs(60);
        assert_eq!(60, per_minute.total_iterations());
    }

    #[test]
    fn overrides_merge_field_by_field() {
        let overrides: ExecutorOverrides =
            serde_json::from_str(r#"{ "rate": 500, "duration": "1m", "maxVUs": 200 }"#).unwrap();

        let merged = publish_defaults().apply(&overrides).unwrap();

        let mut expected = ConstantArrivalRate::new(500, Duration::from_secs(60), 10, 200);
        expected.graceful_stop = DEFAULT_GRACEFUL_STOP;
        assert_eq!(ExecutorConfig::ConstantArrivalRate(expected), merged);
    }

    #[test]
    fn switching_executor_requires_its_fields() {
        let overrides: ExecutorOverrides =
            serde_json::from_str(r#"{ "executor": "shared-iterations", "vus": 5 }"#).unwrap();

        assert_eq!(
            Err(OptionsError::MissingField {
                executor: ExecutorConfig::SHARED_ITERATIONS,
                field: "iterations",
            }),
            publish_defaults().apply(&overrides)
        );

        let overrides: ExecutorOverrides = serde_json::from_str(
            r#"{ "executor": "shared-iterations", "vus": 5, "iterations": 20, "maxDuration": "5m" }"#,
        )
        .unwrap();
        assert_eq!(
            ExecutorConfig::SharedIterations(SharedIterations::new(
                20,
                5,
                Duration::from_secs(300)
            )),
            publish_defaults().apply(&overrides).unwrap()
        );
    }

    #[test]
    fn reject_invalid_pool_sizes() {
        let overrides = ExecutorOverrides {
            pre_allocated_vus: Some(50),
            max_vus: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            publish_defaults().apply(&overrides),
            Err(OptionsError::Invalid(_))
        ));
    }

    #[test]
    fn load_options_from_scenario_file() {
        let dir = tempfile::tempdir().unwrap();
        let scenario_dir = dir.path().join("scenarios").join("events-throughput");
        std::fs::create_dir_all(&scenario_dir).unwrap();
        std::fs::write(
            scenario_dir.join("basic.json"),
            r#"{
                "options": {
                    "thresholds": { "http_req_duration": ["p(95)<2000"] },
                    "scenarios": { "events": { "rate": 10, "timeUnit": "1s", "duration": "10s" } }
                }
            }"#,
        )
        .unwrap();

        let options = load_scenario_options(dir.path(), "events-throughput", "basic").unwrap();
        assert_eq!(
            vec!["p(95)<2000".to_string()],
            options.thresholds["http_req_duration"]
        );
        assert_eq!(Some(10), options.scenarios["events"].rate);
        assert_eq!(
            Some(Duration::from_secs(10)),
            options.scenarios["events"].duration
        );

        assert!(load_scenario_options(dir.path(), "events-throughput", "missing").is_err());
    }

    #[test]
    fn empty_scenario_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let scenario_dir = dir.path().join("scenarios").join("events-verify");
        std::fs::create_dir_all(&scenario_dir).unwrap();
        std::fs::write(scenario_dir.join("basic.json"), "{}").unwrap();

        let options = load_scenario_options(dir.path(), "events-verify", "basic").unwrap();
        assert_eq!(ScenarioOptions::default(), options);
    }
}
