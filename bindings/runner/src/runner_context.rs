use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use delivery_api_client::{DeliveryApiClient, ReceiverClient};
use delivery_tunnel_runner::prelude::{Clock, ExecutorConfig, SystemClock, UserValuesConstraint};

use crate::config::EnvironmentConfig;
use crate::publisher::EventPublisher;
use crate::store::{CorrelationKeys, CorrelationStore};
use crate::verifier::DeliveryVerifier;

/// Identity of one test execution, shared read-only by every VU.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub run_id: String,
    pub tenant_id: String,
    pub destination_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub profile: ExecutorConfig,
}

impl RunContext {
    pub fn new(run_id: &str, started_at: DateTime<Utc>, profile: ExecutorConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            tenant_id: format!("test-tenant-{run_id}"),
            destination_id: None,
            started_at,
            profile,
        }
    }

    pub fn keys(&self) -> CorrelationKeys {
        CorrelationKeys::new(&self.run_id)
    }
}

/// Values shared by all VUs of a harness scenario. Populated by the setup helpers in this crate.
#[derive(Default, Debug)]
pub struct HarnessRunnerContext {
    env: Option<EnvironmentConfig>,
    run: Option<RunContext>,
    store: Option<Arc<dyn CorrelationStore>>,
    clock: Option<Arc<dyn Clock>>,
    api: Option<DeliveryApiClient>,
    receiver: Option<ReceiverClient>,
    publisher: Option<EventPublisher>,
    verifier: Option<DeliveryVerifier>,
}

impl UserValuesConstraint for HarnessRunnerContext {}

impl HarnessRunnerContext {
    pub fn environment(&self) -> anyhow::Result<&EnvironmentConfig> {
        self.env
            .as_ref()
            .context("Environment is not loaded, call `load_environment_config` in setup")
    }

    pub fn set_environment(&mut self, env: EnvironmentConfig) {
        self.env = Some(env);
    }

    pub fn has_environment(&self) -> bool {
        self.env.is_some()
    }

    pub fn run(&self) -> anyhow::Result<&RunContext> {
        self.run
            .as_ref()
            .context("Run context is not set, call `configure_run` in setup")
    }

    pub fn run_mut(&mut self) -> anyhow::Result<&mut RunContext> {
        self.run
            .as_mut()
            .context("Run context is not set, call `configure_run` in setup")
    }

    pub fn set_run(&mut self, run: RunContext) {
        self.run = Some(run);
    }

    pub fn store(&self) -> anyhow::Result<Arc<dyn CorrelationStore>> {
        self.store
            .clone()
            .context("Correlation store is not connected, call `connect_correlation_store` in setup")
    }

    /// Use an already connected store, for example an in-memory one.
    pub fn set_store(&mut self, store: Arc<dyn CorrelationStore>) {
        self.store = Some(store);
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// The clock used to stamp and poll events, the system clock unless one was set.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock))
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = Some(clock);
    }

    pub fn api(&self) -> anyhow::Result<&DeliveryApiClient> {
        self.api
            .as_ref()
            .context("API client is not configured, call `configure_clients` in setup")
    }

    pub fn receiver(&self) -> anyhow::Result<&ReceiverClient> {
        self.receiver
            .as_ref()
            .context("Receiver client is not configured, call `configure_clients` in setup")
    }

    pub(crate) fn set_clients(&mut self, api: DeliveryApiClient, receiver: ReceiverClient) {
        self.api = Some(api);
        self.receiver = Some(receiver);
    }

    pub fn publisher(&self) -> anyhow::Result<&EventPublisher> {
        self.publisher
            .as_ref()
            .context("Publisher is not started, call `start_publisher` in setup")
    }

    pub(crate) fn set_publisher(&mut self, publisher: EventPublisher) {
        self.publisher = Some(publisher);
    }

    pub fn verifier(&self) -> anyhow::Result<&DeliveryVerifier> {
        self.verifier
            .as_ref()
            .context("Verifier is not started, call `start_verifier` in setup")
    }

    pub(crate) fn set_verifier(&mut self, verifier: DeliveryVerifier) {
        self.verifier = Some(verifier);
    }
}
