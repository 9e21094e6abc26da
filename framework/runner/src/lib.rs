mod cli;
mod context;
mod definition;
mod discipline;
mod executor;
mod init;
mod options;
mod progress;
mod run;
mod shutdown;
mod types;

pub mod prelude {
    pub use crate::cli::TunnelScenarioCli;
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{RunnerContext, VuContext};
    pub use crate::definition::{GlobalHookMut, HookResult, ScenarioDefinitionBuilder, VuHookMut};
    pub use crate::discipline::{DROPPED_ITERATIONS, ITERATIONS, ITERATION_DURATION, ITERATION_ERRORS};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::options::{
        load_scenario_options, ConstantArrivalRate, ExecutorConfig, ExecutorOverrides,
        OptionsError, ScenarioOptions, SharedIterations,
    };
    pub use crate::run::run;
    pub use crate::types::TunnelResult;

    /// Re-export of the core prelude so that scenarios can depend on the runner alone.
    pub use delivery_tunnel_core::prelude::*;
    pub use delivery_tunnel_instruments::{
        MetricSummary, MetricsAggregator, RunReport, CHECKS, HTTP_REQ_DURATION, HTTP_REQ_FAILED,
    };
}
