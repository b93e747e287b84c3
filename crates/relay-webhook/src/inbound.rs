//! Inbound webhook handling
//!
//! Receives webhooks from the workspace service, verifies them against the
//! raw body, and queues a notification for recognized events.

use crate::{
    dispatch::DeliveryDispatcher,
    events::WebhookEvent,
    format::format_event,
    signature::WebhookVerifier,
    Result, WebhookError,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use relay_core::RelayConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared state for webhook routes
pub struct RelayState {
    config: Arc<RelayConfig>,
    verifier: WebhookVerifier,
    signature_header: String,
    dispatcher: DeliveryDispatcher,
}

impl RelayState {
    pub fn new(config: Arc<RelayConfig>, dispatcher: DeliveryDispatcher) -> Self {
        if config.webhook_secret.is_none() {
            warn!("No webhook secret configured, signatures will not be verified");
        }

        Self {
            verifier: WebhookVerifier::new(config.webhook_secret.as_deref()),
            signature_header: config.signature_header(),
            config,
            dispatcher,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// What happened to an accepted webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// A notification was handed to the dispatcher
    Queued,
    /// A notification was formatted but the queue refused it
    Dropped,
    /// The event kind does not produce notifications
    Ignored,
}

/// Health check body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent: String,
    pub timestamp: String,
}

/// Create Axum router for inbound webhooks and the health check
pub fn create_webhook_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/webhook/:source", post(handle_webhook))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Handle incoming webhook request
async fn handle_webhook(
    State(state): State<Arc<RelayState>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = format!("whr_{}", Uuid::new_v4().simple());

    match process_webhook(&state, &request_id, &source, &headers, &body) {
        Ok(disposition) => {
            debug!(request_id = %request_id, ?disposition, "Webhook acknowledged");
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        Err(e) => {
            match &e {
                WebhookError::InvalidSignature | WebhookError::UnknownSource(_) => {
                    warn!(request_id = %request_id, source = %source, error = %e, "Webhook rejected");
                }
                _ => {
                    error!(request_id = %request_id, source = %source, error = %e, "Webhook processing failed");
                }
            }
            e.into_response()
        }
    }
}

/// Verify, classify, format and queue one webhook
pub fn process_webhook(
    state: &RelayState,
    request_id: &str,
    source: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookDisposition> {
    if !source.eq_ignore_ascii_case(&state.config.source) {
        return Err(WebhookError::UnknownSource(source.to_string()));
    }

    // Unreadable header values count as a present but wrong signature
    let signature = headers
        .get(state.signature_header.as_str())
        .map(|v| v.to_str().unwrap_or_default());
    if !state.verifier.verify(body, signature) {
        return Err(WebhookError::InvalidSignature);
    }

    let event = WebhookEvent::from_slice(body)?;
    let kind = event.kind();
    info!(request_id = %request_id, source = %source, kind = %kind, "Received webhook");

    let message = match format_event(&event) {
        Some(message) => message,
        None => {
            if let WebhookEvent::Unknown { event: name, .. } = &event {
                info!(request_id = %request_id, event = %name, "Unrecognized event acknowledged");
            }
            return Ok(WebhookDisposition::Ignored);
        }
    };

    if state.dispatcher.enqueue(request_id, message) {
        Ok(WebhookDisposition::Queued)
    } else {
        Ok(WebhookDisposition::Dropped)
    }
}

/// Liveness probe; no verification, no side effects
async fn health_check(State(state): State<Arc<RelayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        agent: state.config.agent_id.clone(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebhookError::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature"),
            WebhookError::UnknownSource(_) => (StatusCode::NOT_FOUND, "Unknown webhook source"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
