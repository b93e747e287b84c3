//! Application state and initialization

use anyhow::{Context, Result};
use relay_core::RelayConfig;
use relay_webhook::{DeliveryDispatcher, DeliveryWorker, Notifier, RelayState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::Args;
use crate::server::Server;

/// Extra time the delivery worker gets to finish after the server stops
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Main application
pub struct App {
    config: Arc<RelayConfig>,
    state: Arc<RelayState>,
    worker: DeliveryWorker,
}

impl App {
    /// Load configuration and wire the relay components
    pub fn build(args: Args) -> Result<Self> {
        let mut config = RelayConfig::load(args.config.as_deref())
            .context("Failed to load configuration")?;
        if let Some(port) = args.port {
            config = config.with_port(port);
        }
        info!(config = ?config, "Configuration loaded");

        Self::from_config(config)
    }

    pub fn from_config(config: RelayConfig) -> Result<Self> {
        let config = Arc::new(config);

        let notifier = Notifier::from_config(&config)
            .context("Failed to create notification transport")?;
        let (dispatcher, worker) = DeliveryDispatcher::new(Arc::new(notifier), &config.delivery);
        let state = Arc::new(RelayState::new(config.clone(), dispatcher));

        Ok(Self {
            config,
            state,
            worker,
        })
    }

    /// Serve until a shutdown signal, then let queued deliveries finish
    pub async fn run(self) -> Result<()> {
        let worker = tokio::spawn(self.worker.run());

        let server = Server::new(self.config.clone(), self.state);
        server.run().await?;

        // The server dropped its state, closing the delivery queue
        let drain = self.config.delivery.timeout() + DRAIN_GRACE;
        match tokio::time::timeout(drain, worker).await {
            Ok(Ok(())) => info!("Pending deliveries finished"),
            Ok(Err(e)) => warn!(error = %e, "Delivery worker panicked"),
            Err(_) => warn!("Gave up waiting for pending deliveries"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_from_config() {
        let app = App::from_config(RelayConfig::new("agent-1")).unwrap();
        assert_eq!(app.state.config().agent_id, "agent-1");
    }
}
