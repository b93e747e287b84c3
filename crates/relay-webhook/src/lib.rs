//! Webhook receiver and notification relay for hookrelay
//!
//! This crate turns signed webhook calls from a workspace service into
//! Telegram notifications:
//! - Signature verification over the raw request body
//! - Event classification into a closed set of kinds
//! - HTML message formatting with narrow escaping
//! - Best-effort delivery through a bounded background dispatcher
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_core::RelayConfig;
//! use relay_webhook::{create_webhook_router, DeliveryDispatcher, Notifier, RelayState};
//! use std::sync::Arc;
//!
//! let config = Arc::new(RelayConfig::load(None)?);
//! let notifier = Arc::new(Notifier::from_config(&config)?);
//! let dispatcher = DeliveryDispatcher::spawn(notifier, &config.delivery);
//! let router = create_webhook_router(Arc::new(RelayState::new(config, dispatcher)));
//! ```

// Module order matters due to dependencies
pub mod events;
pub mod signature;
pub mod format;
pub mod transport;
pub mod dispatch;
pub mod inbound;

pub use events::*;
pub use signature::*;
pub use format::*;
pub use transport::*;
pub use dispatch::*;
pub use inbound::*;

use thiserror::Error;

/// Webhook errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Unknown webhook source: {0}")]
    UnknownSource(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL embeds the bot token
        Self::Http(e.without_url().to_string())
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WebhookError>;
