use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::TunnelScenarioCli;
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::options::{load_scenario_options, ExecutorConfig, ScenarioOptions};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VuHookMut<RV, V> = fn(&mut VuContext<RV, V>) -> HookResult;

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    cli: TunnelScenarioCli,
    /// Name under which the scenario file refers to the executor, e.g. `events`.
    executor_name: String,
    executor: Option<ExecutorConfig>,
    thresholds: BTreeMap<String, Vec<String>>,
    /// Test directory under `<config-dir>/scenarios/` to load the options file from.
    scenario_config: Option<String>,
    options: Option<ScenarioOptions>,
    setup_fn: Option<GlobalHookMut<RV>>,
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    behaviour: Option<VuHookMut<RV, V>>,
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    teardown_fn: Option<GlobalHook<RV>>,
}

pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub cli: TunnelScenarioCli,
    pub executor: ExecutorConfig,
    pub thresholds: BTreeMap<String, Vec<String>>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_vu_fn: Option<VuHookMut<RV, V>>,
    pub behaviour: VuHookMut<RV, V>,
    pub teardown_vu_fn: Option<VuHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Create a builder from already parsed command line arguments.
    pub fn new(name: &str, cli: TunnelScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            executor_name: "default".to_string(),
            executor: None,
            thresholds: BTreeMap::new(),
            scenario_config: None,
            options: None,
            setup_fn: None,
            setup_vu_fn: None,
            behaviour: None,
            teardown_vu_fn: None,
            teardown_fn: None,
        }
    }

    /// Initialise logging, parse the command line and create a builder.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    pub fn cli(&self) -> &TunnelScenarioCli {
        &self.cli
    }

    /// The executor used when the scenario file does not override it.
    pub fn with_default_executor(mut self, executor_name: &str, executor: ExecutorConfig) -> Self {
        self.executor_name = executor_name.to_string();
        self.executor = Some(executor);
        self
    }

    /// Thresholds for a metric, used unless the scenario file lists thresholds for the same metric.
    pub fn with_default_threshold(mut self, metric: &str, expressions: &[&str]) -> Self {
        self.thresholds.insert(
            metric.to_string(),
            expressions.iter().map(|e| e.to_string()).collect(),
        );
        self
    }

    /// Load overrides from `<config-dir>/scenarios/<test_name>/<scenario>.json` when the
    /// definition is built.
    pub fn with_scenario_config(mut self, test_name: &str) -> Self {
        self.scenario_config = Some(test_name.to_string());
        self
    }

    /// Apply overrides that were already loaded. These take precedence over a scenario file.
    pub fn with_options(mut self, options: ScenarioOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Global setup hook. It is run once, before any VU is started, and a failure aborts the run.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Run once by each VU as it starts. A VU whose setup fails does not run any iterations.
    pub fn use_vu_setup(mut self, setup_vu_fn: VuHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// The iteration body, run once per dispatched iteration.
    pub fn use_behaviour(mut self, behaviour: VuHookMut<RV, V>) -> Self {
        self.behaviour = Some(behaviour);
        self
    }

    /// Run once by each VU after its last iteration.
    pub fn use_vu_teardown(mut self, teardown_vu_fn: VuHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    /// Global teardown hook, run once after every VU has stopped, even if the run was interrupted.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let behaviour = self
            .behaviour
            .context("Scenario does not define a behaviour")?;
        let mut executor = self
            .executor
            .context("Scenario does not define a default executor")?;
        let mut thresholds = self.thresholds;

        let mut layers = Vec::new();
        if let Some(test_name) = &self.scenario_config {
            layers.push(load_scenario_options(
                &self.cli.config_dir,
                test_name,
                &self.cli.scenario,
            )?);
        }
        if let Some(options) = self.options {
            layers.push(options);
        }

        for options in layers {
            thresholds.extend(options.thresholds);
            if let Some(overrides) = options.scenarios.get(&self.executor_name) {
                executor = executor.apply(overrides).with_context(|| {
                    format!("Invalid options for executor `{}`", self.executor_name)
                })?;
            }
            for unknown in options
                .scenarios
                .keys()
                .filter(|name| **name != self.executor_name)
            {
                log::warn!(
                    "Ignoring options for unknown scenario executor `{unknown}`, expected `{}`",
                    self.executor_name
                );
            }
        }
        executor.validate()?;

        Ok(ScenarioDefinition {
            name: self.name,
            cli: self.cli,
            executor,
            thresholds,
            setup_fn: self.setup_fn,
            setup_vu_fn: self.setup_vu_fn,
            behaviour,
            teardown_vu_fn: self.teardown_vu_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}
