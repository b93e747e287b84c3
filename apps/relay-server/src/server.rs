//! HTTP Server implementation

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use relay_core::RelayConfig;
use relay_webhook::{create_webhook_router, RelayState};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};

pub struct Server {
    config: Arc<RelayConfig>,
    state: Arc<RelayState>,
}

impl Server {
    pub fn new(config: Arc<RelayConfig>, state: Arc<RelayState>) -> Self {
        Self { config, state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.config.address();
        let app = build_http_router(self.state);

        let listener = tokio::net::TcpListener::bind(addr.as_str())
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

        info!(
            "Listening on {} (POST /webhook/{}, GET /health)",
            addr, self.config.source
        );

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

fn build_http_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(create_webhook_router(state))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

// Route handlers

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "hookrelay",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
    error!("Request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal error" })),
    )
        .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use relay_webhook::{DeliveryDispatcher, Notifier};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let config = Arc::new(RelayConfig::new("agent-1"));
        let dispatcher =
            DeliveryDispatcher::spawn(Arc::new(Notifier::disabled()), &config.delivery);
        build_http_router(Arc::new(RelayState::new(config, dispatcher)))
    }

    #[tokio::test]
    async fn test_root_route_reports_service() {
        let response = test_router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["service"], "hookrelay");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["agent"], "agent-1");
    }

    #[test]
    fn test_panic_response() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
