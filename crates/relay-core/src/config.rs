use crate::error::{ConfigError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for relay settings (`RELAY__AGENT_ID`, ...)
pub const ENV_PREFIX: &str = "RELAY";

/// Upper bound for `delivery.max_concurrent`
pub const MAX_CONCURRENT_DELIVERIES: usize = 4096;

/// Immutable settings snapshot, loaded once at startup.
#[derive(Clone, Deserialize)]
pub struct RelayConfig {
    /// Identity of this deployed agent
    pub agent_id: String,
    /// Webhook source name, used for the route and signature header
    #[serde(default = "default_source")]
    pub source: String,
    /// Shared secret for webhook signatures
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Telegram bot token
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    /// Telegram chat receiving notifications
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    /// Telegram Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl RelayConfig {
    /// Create a config with defaults for everything but the agent identity
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            source: default_source(),
            webhook_secret: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: default_telegram_api_base(),
            host: default_host(),
            port: default_port(),
            delivery: DeliveryConfig::default(),
        }
    }

    /// Load from an optional TOML file with `RELAY__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Load using a custom environment prefix
    pub fn load_with_env_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("source", default_source())?
            .set_default("telegram_api_base", default_telegram_api_base())?
            .set_default("host", default_host())?
            .set_default("port", i64::from(default_port()))?;

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            builder = builder.add_source(File::from(path));
        }

        // No try_parsing: secrets and chat ids must stay verbatim strings
        let builder = builder.add_source(Environment::with_prefix(prefix).separator("__"));

        let config: RelayConfig = builder.build()?.try_deserialize()?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the relay relies on
    pub fn validate(&self) -> Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(ConfigError::Invalid("agent_id must not be empty".to_string()));
        }
        if self.source.trim().is_empty()
            || !self
                .source
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "source must be a non-empty ASCII identifier, got {:?}",
                self.source
            )));
        }
        if self.delivery.max_concurrent == 0
            || self.delivery.max_concurrent > MAX_CONCURRENT_DELIVERIES
        {
            return Err(ConfigError::Invalid(format!(
                "delivery.max_concurrent must be between 1 and {}, got {}",
                MAX_CONCURRENT_DELIVERIES, self.delivery.max_concurrent
            )));
        }
        if self.delivery.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "delivery.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.delivery.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "delivery.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_telegram(mut self, bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        self.telegram_bot_token = Some(bot_token.into());
        self.telegram_chat_id = Some(chat_id.into());
        self
    }

    pub fn with_telegram_api_base(mut self, base: impl Into<String>) -> Self {
        self.telegram_api_base = base.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    /// Both transport credentials, when configured
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.as_str(), chat.as_str())),
            _ => None,
        }
    }

    /// Name of the header carrying the webhook signature, e.g. `X-Workspace-Signature`
    pub fn signature_header(&self) -> String {
        let mut chars = self.source.chars();
        let source = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        };
        format!("X-{}-Signature", source)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn normalized(mut self) -> Self {
        for value in [
            &mut self.webhook_secret,
            &mut self.telegram_bot_token,
            &mut self.telegram_chat_id,
        ] {
            if value.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *value = None;
            }
        }
        self.telegram_api_base = self.telegram_api_base.trim_end_matches('/').to_string();
        self
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("agent_id", &self.agent_id)
            .field("source", &self.source)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("telegram_bot_token", &redact(&self.telegram_bot_token))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("telegram_api_base", &self.telegram_api_base)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("delivery", &self.delivery)
            .finish()
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

/// Outbound delivery limits
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Timeout for a single transport call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum number of transport calls in flight
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Messages waiting for a free delivery slot
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_source() -> String {
    "workspace".to_string()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}
