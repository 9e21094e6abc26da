use crate::cli::TunnelScenarioCli;
use clap::Parser;

/// Initialise logging and parse the command line for a scenario binary.
pub fn init() -> TunnelScenarioCli {
    env_logger::init();

    TunnelScenarioCli::parse()
}
