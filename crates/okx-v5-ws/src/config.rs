/*
[INPUT]:  Endpoint URL, API credentials, logging toggles and timings
[OUTPUT]: Validated ClientConfig consumed by the WebSocket client
[POS]:    Configuration layer - client setup
[UPDATE]: When adding connection options or changing defaults
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OkxWsError, Result};

pub const PUBLIC_ENDPOINT: &str = "wss://wsaws.okx.com:8443/ws/v5/public";
pub const PRIVATE_ENDPOINT: &str = "wss://wsaws.okx.com:8443/ws/v5/private";
pub const DEMO_PUBLIC_ENDPOINT: &str = "wss://wspap.okx.com:8443/ws/v5/public?brokerId=9999";
pub const DEMO_PRIVATE_ENDPOINT: &str = "wss://wspap.okx.com:8443/ws/v5/private?brokerId=9999";

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// API key triple used to sign the login request
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Behaviour toggles. The `log_*` flags only gate diagnostic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Log in right after every (re)connect when credentials are present
    pub auto_login: bool,
    pub log_login_message: bool,
    pub log_subscription_message: bool,
    pub log_channel_topic_message: bool,
    pub log_trade_message: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_login: true,
            log_login_message: true,
            log_subscription_message: true,
            log_channel_topic_message: false,
            log_trade_message: true,
        }
    }
}

/// Timings of the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Silence after the last inbound frame before a `ping` is sent,
    /// and again before the connection is declared dead
    pub ping_interval: Duration,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: None,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub credentials: Option<Credentials>,
    pub options: ClientOptions,
    pub connection: ConnectionSettings,
    /// Per-request reply timeout. `None` waits until the reply arrives.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
            options: ClientOptions::default(),
            connection: ConnectionSettings::default(),
            request_timeout: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.connection.ping_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.connection.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.connection.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// True when auto-login is on and an API key is configured
    pub fn should_auto_login(&self) -> bool {
        self.options.auto_login
            && self
                .credentials
                .as_ref()
                .is_some_and(|credentials| !credentials.api_key.is_empty())
    }

    /// Check the endpoint and timings before a client is built
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(OkxWsError::Config(format!(
                "unsupported scheme {:?} in {}",
                url.scheme(),
                self.url
            )));
        }
        if self.connection.ping_interval.is_zero() {
            return Err(OkxWsError::Config("ping_interval must be non-zero".into()));
        }
        if self.connection.max_reconnect_attempts == Some(0) {
            return Err(OkxWsError::Config(
                "max_reconnect_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(PUBLIC_ENDPOINT)
    }
}

impl From<url::ParseError> for OkxWsError {
    fn from(err: url::ParseError) -> Self {
        OkxWsError::Config(format!("invalid url: {err}"))
    }
}
