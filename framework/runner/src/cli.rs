use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct TunnelScenarioCli {
    /// Name of the environment file to load from `<config-dir>/environments/`
    #[clap(long, env = "ENVIRONMENT", default_value = "local")]
    pub environment: String,

    /// Name of the scenario file to load from `<config-dir>/scenarios/<test>/`
    #[clap(long, env = "SCENARIO", default_value = "basic")]
    pub scenario: String,

    /// API key used to authenticate against the event-delivery service
    #[clap(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Identifier scoping every correlation key to this test execution.
    ///
    /// The publish and verify phases must be given the same run id.
    #[clap(long, env = "TESTID")]
    pub run_id: String,

    /// Upper bound on iterations for scenarios that consume a shared pool of iterations
    #[clap(long, env = "MAX_ITERATIONS", default_value_t = 1000)]
    pub max_iterations: u64,

    /// Directory holding the `environments/` and `scenarios/` configuration files
    #[clap(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_explicit_args() {
        let cli = TunnelScenarioCli::try_parse_from([
            "events_verify",
            "--api-key",
            "secret",
            "--run-id",
            "run-1",
            "--max-iterations",
            "50",
            "--no-progress",
        ])
        .unwrap();

        assert_eq!("run-1", cli.run_id);
        assert_eq!(50, cli.max_iterations);
        assert_eq!(PathBuf::from("config"), cli.config_dir);
        assert!(cli.no_progress);
    }
}
