use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use url::Url;

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: Url,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MockWebhookConfig {
    /// Where the harness queries received events.
    pub url: Url,
    /// Where the delivery service sends events, as seen from the service.
    pub destination_url: String,
    #[serde(with = "humantime_serde")]
    pub verification_poll_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub verification_poll_interval: Duration,
}

/// Endpoints of the system under test, loaded from `<config-dir>/environments/<name>.json`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    pub name: String,
    pub api: ApiConfig,
    pub mock_webhook: MockWebhookConfig,
    /// Connection string of the correlation store.
    pub redis: String,
}

pub fn load_environment(config_dir: &Path, name: &str) -> anyhow::Result<EnvironmentConfig> {
    let path = config_dir
        .join("environments")
        .join(format!("{name}.json"));
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read environment file {}", path.display()))?;

    let environment: EnvironmentConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse environment file {}", path.display()))?;

    if environment.mock_webhook.verification_poll_interval.is_zero() {
        anyhow::bail!(
            "Environment file {} sets a zero verificationPollInterval, polling would never wait",
            path.display()
        );
    }

    Ok(environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_environment_with_default_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("environments")).unwrap();
        std::fs::write(
            dir.path().join("environments").join("local.json"),
            r#"{
                "name": "local",
                "api": { "baseUrl": "http://localhost:3333", "timeout": "30s" },
                "mockWebhook": {
                    "url": "http://localhost:8080",
                    "destinationUrl": "http://mock-webhook:8080",
                    "verificationPollTimeout": "5s"
                },
                "redis": "redis://localhost:6379"
            }"#,
        )
        .unwrap();

        let env = load_environment(dir.path(), "local").unwrap();
        assert_eq!("local", env.name);
        assert_eq!(Duration::from_secs(30), env.api.timeout);
        assert_eq!(
            Duration::from_secs(5),
            env.mock_webhook.verification_poll_timeout
        );
        assert_eq!(
            Duration::from_secs(1),
            env.mock_webhook.verification_poll_interval
        );
        assert_eq!("redis://localhost:6379", env.redis);
    }

    #[test]
    fn missing_environment_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_environment(dir.path(), "staging").unwrap_err();
        assert!(err.to_string().contains("staging.json"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("environments")).unwrap();
        std::fs::write(
            dir.path().join("environments").join("local.json"),
            r#"{
                "name": "local",
                "api": { "baseUrl": "http://localhost:3333", "timeout": "30s" },
                "mockWebhook": {
                    "url": "http://localhost:8080",
                    "destinationUrl": "http://mock-webhook:8080",
                    "verificationPollTimeout": "5s",
                    "verificationPollInterval": "0s"
                },
                "redis": "redis://localhost:6379"
            }"#,
        )
        .unwrap();

        let err = load_environment(dir.path(), "local").unwrap_err();
        assert!(err.to_string().contains("verificationPollInterval"));
    }
}
