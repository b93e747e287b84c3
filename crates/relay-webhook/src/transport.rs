//! Notification transport
//!
//! Sends formatted messages to Telegram. Delivery is best-effort: one
//! attempt, bounded by a timeout, with every failure logged and swallowed.

use crate::{
    format::{FormattedMessage, PARSE_MODE},
    Result, WebhookError,
};
use async_trait::async_trait;
use relay_core::RelayConfig;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest slice of an error response body kept for logging
const MAX_ERROR_BODY: usize = 512;

/// Something that can carry a formatted message to a human
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Make one delivery attempt
    async fn send(&self, message: &FormattedMessage) -> Result<()>;

    /// Transport name used in logs
    fn name(&self) -> &str;
}

/// Telegram Bot API transport using `sendMessage`
pub struct TelegramTransport {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

impl TelegramTransport {
    pub fn new(api_base: &str, bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hookrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationTransport for TelegramTransport {
    async fn send(&self, message: &FormattedMessage) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: message.as_str(),
            parse_mode: PARSE_MODE,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.send_message_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(WebhookError::Transport(format!(
                "Telegram returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Result of one delivery, for logging and tests only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    /// No transport configured
    Skipped,
    Failed,
    TimedOut,
}

/// Best-effort delivery front for an optional transport
pub struct Notifier {
    transport: Option<Arc<dyn NotificationTransport>>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(transport: Arc<dyn NotificationTransport>, timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            timeout,
        }
    }

    /// A notifier that skips every delivery
    pub fn disabled() -> Self {
        Self {
            transport: None,
            timeout: Duration::ZERO,
        }
    }

    /// Build from config; missing Telegram credentials disable delivery
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let timeout = config.delivery.timeout();
        match config.telegram_credentials() {
            Some((token, chat_id)) => {
                let transport =
                    TelegramTransport::new(&config.telegram_api_base, token, chat_id, timeout)?;
                info!(chat_id = %chat_id, "Telegram delivery enabled");
                Ok(Self::new(Arc::new(transport), timeout))
            }
            None => {
                warn!("Telegram credentials not configured, notifications will be skipped");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Deliver a message once. Never fails; the outcome is informational.
    pub async fn deliver(&self, message: &FormattedMessage) -> DeliveryOutcome {
        let transport = match &self.transport {
            Some(t) => t,
            None => {
                debug!("Notification delivery skipped: no transport configured");
                return DeliveryOutcome::Skipped;
            }
        };

        let delivery_id = format!("dlv_{}", Uuid::new_v4().simple());
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, transport.send(message)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                info!(
                    delivery_id = %delivery_id,
                    transport = transport.name(),
                    duration_ms,
                    "Notification delivered"
                );
                DeliveryOutcome::Delivered
            }
            Ok(Err(e)) => {
                warn!(
                    delivery_id = %delivery_id,
                    transport = transport.name(),
                    duration_ms,
                    error = %e,
                    "Notification delivery failed"
                );
                DeliveryOutcome::Failed
            }
            Err(_) => {
                let e = WebhookError::Timeout(self.timeout.as_secs());
                warn!(
                    delivery_id = %delivery_id,
                    transport = transport.name(),
                    error = %e,
                    "Notification delivery timed out"
                );
                DeliveryOutcome::TimedOut
            }
        }
    }
}
