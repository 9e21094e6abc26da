use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use delivery_tunnel_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use delivery_tunnel_instruments::MetricsAggregator;

use crate::cli::TunnelScenarioCli;
use crate::executor::Executor;
use crate::options::ExecutorConfig;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// State shared by every VU for the lifetime of one run.
///
/// It is mutable during the global setup hook and shared read-only once VUs start.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    metrics: Arc<MetricsAggregator>,
    shutdown_handle: ShutdownHandle,
    cli: TunnelScenarioCli,
    executor_config: ExecutorConfig,
    started_at: DateTime<Utc>,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        metrics: Arc<MetricsAggregator>,
        shutdown_handle: ShutdownHandle,
        cli: TunnelScenarioCli,
        executor_config: ExecutorConfig,
    ) -> Self {
        Self {
            executor,
            metrics,
            shutdown_handle,
            cli,
            executor_config,
            started_at: Utc::now(),
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    pub fn cli(&self) -> &TunnelScenarioCli {
        &self.cli
    }

    /// The run identifier that scopes every correlation key.
    pub fn run_id(&self) -> &str {
        &self.cli.run_id
    }

    /// The executor options after defaults and scenario file overrides were merged.
    pub fn executor_config(&self) -> &ExecutorConfig {
        &self.executor_config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn shutdown_listener(&self) -> DelegatedShutdownListener {
        self.shutdown_handle.new_listener()
    }

    /// Stop the run early. In-flight iterations are cancelled and teardown hooks still run.
    pub fn force_stop_scenario(&self) {
        log::warn!("Scenario requested an early stop");
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// State owned by a single virtual user.
#[derive(Debug)]
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: usize,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    pub(crate) fn new(
        vu_id: usize,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            vu_id,
            iteration: 0,
            runner_context,
            shutdown_listener,
            value: Default::default(),
        }
    }

    /// 1-based identifier of this VU, unique within the run.
    pub fn vu_id(&self) -> usize {
        self.vu_id
    }

    /// 0-based count of iterations this VU has started before the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }

    pub(crate) fn advance_iteration(&mut self) {
        self.iteration += 1;
    }
}
