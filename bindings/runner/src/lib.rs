mod common;
mod config;
mod context;
mod latency;
mod publisher;
mod runner_context;
mod store;
mod timestamp;
mod verifier;

pub mod prelude {
    /// Setup, behaviour and teardown helpers for delivery scenarios.
    ///
    /// This is a good place to start if you are getting started writing scenarios.
    pub use crate::common::*;

    pub use crate::config::{load_environment, ApiConfig, EnvironmentConfig, MockWebhookConfig};
    pub use crate::context::{HarnessVuContext, VuTenant};
    pub use crate::latency::{
        LatencyBreakdown, LatencyDiagnostic, LatencySample, PipelineTimestamps, Segment,
        DELIVERY_LATENCY, END_TO_END_EVENT_LATENCY, INTERNAL_OUTPOST_EVENT_LATENCY,
        RECEIVE_LATENCY,
    };
    pub use crate::publisher::{
        event_id, iteration_payload, Event, EventPublisher, PublishOutcome, EVENTS_PUBLISHED,
        EVENT_PUBLISH_SUCCESS_RATE,
    };
    pub use crate::runner_context::{HarnessRunnerContext, RunContext};
    pub use crate::store::{
        CorrelationKeys, CorrelationStore, InMemoryCorrelationStore, RedisCorrelationStore,
        StoreError, StoreResult,
    };
    pub use crate::timestamp::{parse_flexible_timestamp, FlexibleTimestamp};
    pub use crate::verifier::{
        DeliveryVerifier, PollSettings, VerificationResult, VerifyOutcome,
        EVENT_VERIFICATION_RATE, EVENT_VERIFICATION_TIME,
    };

    /// Re-export of the `delivery_tunnel_runner` prelude.
    ///
    /// This is for convenience so that scenarios can depend on a single crate for the runner.
    pub use delivery_tunnel_runner::prelude::*;

    /// Re-export of the instrumented clients for convenience.
    pub use delivery_api_client::*;
}
