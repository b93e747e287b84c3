//! Background delivery dispatch
//!
//! The webhook endpoint hands formatted messages to a bounded queue and
//! answers the sender right away. A worker drains the queue and runs each
//! delivery as its own task, with a semaphore capping how many transport
//! calls are in flight.

use crate::{
    format::FormattedMessage,
    transport::{DeliveryOutcome, Notifier},
};
use relay_core::{DeliveryConfig, MAX_CONCURRENT_DELIVERIES};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

/// Message waiting for delivery
#[derive(Debug)]
pub struct QueuedMessage {
    /// Id of the webhook request that produced the message
    pub request_id: String,
    pub message: FormattedMessage,
}

/// Cloneable handle used by request handlers to queue deliveries
#[derive(Clone)]
pub struct DeliveryDispatcher {
    sender: mpsc::Sender<QueuedMessage>,
}

impl DeliveryDispatcher {
    /// Create a dispatcher and the worker that must be run to drain it
    pub fn new(notifier: Arc<Notifier>, config: &DeliveryConfig) -> (Self, DeliveryWorker) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let worker = DeliveryWorker::new(receiver, notifier, config.max_concurrent);
        (Self { sender }, worker)
    }

    /// Create a dispatcher with its worker running on the current runtime
    pub fn spawn(notifier: Arc<Notifier>, config: &DeliveryConfig) -> Self {
        let (dispatcher, worker) = Self::new(notifier, config);
        tokio::spawn(worker.run());
        dispatcher
    }

    /// Queue a message without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, request_id: &str, message: FormattedMessage) -> bool {
        let queued = QueuedMessage {
            request_id: request_id.to_string(),
            message,
        };

        match self.sender.try_send(queued) {
            Ok(()) => {
                debug!(request_id = %request_id, "Notification queued for delivery");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(request_id = %request_id, "Delivery queue full, notification dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(request_id = %request_id, "Delivery worker stopped, notification dropped");
                false
            }
        }
    }
}

/// Drains the delivery queue
pub struct DeliveryWorker {
    receiver: mpsc::Receiver<QueuedMessage>,
    notifier: Arc<Notifier>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl DeliveryWorker {
    fn new(
        receiver: mpsc::Receiver<QueuedMessage>,
        notifier: Arc<Notifier>,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.clamp(1, MAX_CONCURRENT_DELIVERIES);
        Self {
            receiver,
            notifier,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Run until every dispatcher handle is dropped, then wait for in-flight deliveries
    pub async fn run(mut self) {
        info!(max_concurrent = self.max_concurrent, "Starting delivery worker");

        while let Some(queued) = self.receiver.recv().await {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let notifier = self.notifier.clone();

            tokio::spawn(async move {
                let outcome = notifier.deliver(&queued.message).await;
                if outcome != DeliveryOutcome::Delivered {
                    debug!(request_id = %queued.request_id, ?outcome, "Notification not delivered");
                }
                drop(permit);
            });
        }

        // Every permit back means nothing is in flight
        let _ = self.permits.acquire_many(self.max_concurrent as u32).await;
        info!("Delivery worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NotificationData, WebhookEvent};
    use crate::format::format_event;
    use crate::transport::NotificationTransport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn message(text: &str) -> FormattedMessage {
        format_event(&WebhookEvent::Notification(NotificationData {
            title: None,
            message: text.to_string(),
            priority: None,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }))
        .unwrap()
    }

    /// Counts calls and tracks the highest number running at once
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl NotificationTransport for CountingTransport {
        async fn send(&self, _message: &FormattedMessage) -> crate::Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_worker_delivers_queued_messages_within_cap() {
        let transport = Arc::new(CountingTransport::default());
        let notifier = Arc::new(Notifier::new(transport.clone(), Duration::from_secs(5)));
        let config = DeliveryConfig::default().with_max_concurrent(2);

        let (dispatcher, worker) = DeliveryDispatcher::new(notifier, &config);
        let handle = tokio::spawn(worker.run());

        for i in 0..8 {
            assert!(dispatcher.enqueue(&format!("req-{}", i), message("hello")));
        }
        drop(dispatcher);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not drain")
            .unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 8);
        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_clamped() {
        let transport = Arc::new(CountingTransport::default());
        let notifier = Arc::new(Notifier::new(transport.clone(), Duration::from_secs(5)));
        let config = DeliveryConfig::default().with_max_concurrent(usize::MAX);

        let (dispatcher, worker) = DeliveryDispatcher::new(notifier, &config);
        let handle = tokio::spawn(worker.run());

        assert!(dispatcher.enqueue("req-1", message("hello")));
        drop(dispatcher);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not drain")
            .unwrap();

        // Drain waited for the in-flight delivery
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_message() {
        let notifier = Arc::new(Notifier::disabled());
        let config = DeliveryConfig::default().with_queue_capacity(1);

        // Worker deliberately not started
        let (dispatcher, _worker) = DeliveryDispatcher::new(notifier, &config);

        assert!(dispatcher.enqueue("req-1", message("first")));
        assert!(!dispatcher.enqueue("req-2", message("second")));
    }

    #[tokio::test]
    async fn test_stopped_worker_drops_message() {
        let notifier = Arc::new(Notifier::disabled());
        let (dispatcher, worker) = DeliveryDispatcher::new(notifier, &DeliveryConfig::default());
        drop(worker);

        assert!(!dispatcher.enqueue("req-1", message("lost")));
    }
}
