/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed runner configuration and the client config built from it
[POS]:    Configuration layer - runner setup
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use anyhow::{Context, Result};
use okx_v5_ws::{
    ClientConfig, ClientOptions, Credentials, DEMO_PRIVATE_ENDPOINT, DEMO_PUBLIC_ENDPOINT,
    PRIVATE_ENDPOINT, PUBLIC_ENDPOINT, SubscriptionTopic,
};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// `public`, `private`, `demo-public`, `demo-private` or a full ws/wss URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key triple; login is skipped without it
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub options: ClientOptions,
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Channels subscribed on every session
    #[serde(default)]
    pub topics: Vec<SubscriptionTopic>,
}

/// Connection timings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Unbounded when absent
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_attempts: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "public".to_string()
}

fn default_ping_interval_secs() -> u64 {
    15
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> Option<u64> {
    Some(10)
}

impl RunnerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("parse yaml")?;
        Ok(config)
    }

    /// Endpoint alias resolved to a URL
    pub fn url(&self) -> &str {
        match self.endpoint.as_str() {
            "public" => PUBLIC_ENDPOINT,
            "private" => PRIVATE_ENDPOINT,
            "demo-public" => DEMO_PUBLIC_ENDPOINT,
            "demo-private" => DEMO_PRIVATE_ENDPOINT,
            url => url,
        }
    }

    /// Build and validate the library client configuration
    pub fn client_config(&self) -> Result<ClientConfig> {
        let connection = &self.connection;
        let mut config = ClientConfig::new(self.url())
            .with_options(self.options)
            .with_ping_interval(Duration::from_secs(connection.ping_interval_secs))
            .with_reconnect_delay(Duration::from_secs(connection.reconnect_delay_secs));
        if let Some(credentials) = &self.credentials {
            config = config.with_credentials(credentials.clone());
        }
        if let Some(attempts) = connection.max_reconnect_attempts {
            config = config.with_max_reconnect_attempts(attempts);
        }
        if let Some(secs) = connection.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        config.validate().context("invalid client configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let config = RunnerConfig::from_yaml("topics: []").unwrap();
        assert_eq!(config.url(), PUBLIC_ENDPOINT);
        assert!(config.credentials.is_none());
        assert!(config.options.auto_login);
        assert!(!config.options.log_channel_topic_message);

        let client = config.client_config().unwrap();
        assert_eq!(client.connection.ping_interval, Duration::from_secs(15));
        assert_eq!(client.connection.reconnect_delay, Duration::from_secs(5));
        assert_eq!(client.connection.max_reconnect_attempts, None);
        assert_eq!(client.request_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
endpoint: demo-private
credentials:
  api_key: key
  secret_key: secret
  passphrase: pass
options:
  log_trade_message: false
connection:
  ping_interval_secs: 20
  max_reconnect_attempts: 3
  request_timeout_secs: null
topics:
  - channel: account
    ccy: USDT
  - channel: tickers
    instId: BTC-USDT
"#;
        let config = RunnerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.url(), DEMO_PRIVATE_ENDPOINT);
        assert_eq!(config.topics.len(), 2);
        assert_eq!(
            config.topics[1],
            SubscriptionTopic::instrument("tickers", "BTC-USDT")
        );
        assert!(!config.options.log_trade_message);
        assert!(config.options.log_login_message);

        let client = config.client_config().unwrap();
        assert!(client.should_auto_login());
        assert_eq!(client.connection.ping_interval, Duration::from_secs(20));
        assert_eq!(client.connection.max_reconnect_attempts, Some(3));
        assert_eq!(client.request_timeout, None);
    }

    #[test]
    fn test_custom_url_is_validated() {
        let config = RunnerConfig::from_yaml("endpoint: https://www.okx.com").unwrap();
        assert!(config.client_config().is_err());

        let config = RunnerConfig::from_yaml("endpoint: ws://127.0.0.1:8080/ws").unwrap();
        assert_eq!(config.client_config().unwrap().url, "ws://127.0.0.1:8080/ws");
    }
}
