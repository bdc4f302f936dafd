//! HTTP server for Alertmanager webhooks.
//!
//! Provides REST API endpoints for:
//! - Health checks
//! - Receiving alert notifications (`/api/v1/alerts`, and `/` for receivers
//!   configured with a bare URL)

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::notification;
use crate::processor::{DispatchReport, Dispatcher};

/// Server state shared across handlers.
pub struct ServerState {
    /// Alert dispatcher
    pub dispatcher: Dispatcher,
    /// Maximum accepted request body size
    pub max_body_bytes: usize,
}

impl ServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            max_body_bytes,
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/alerts", post(alerts_handler))
        .route("/", post(alerts_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_body_bytes))
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails to bind to the address.
pub async fn run_server(state: Arc<ServerState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Actioneer webhook server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Actioneer webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
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
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

// ============================================================================
// Response types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Response to an alert notification.
#[derive(Debug, Serialize)]
struct AlertResponse {
    status: ResponseStatus,
    #[serde(flatten)]
    report: Option<DispatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Response status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum ResponseStatus {
    /// Batch processed
    Ok,
    /// Payload could not be decoded
    Rejected,
    /// Batch stopped on a missing label
    Aborted,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Alert notification handler.
async fn alerts_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> impl IntoResponse {
    let notification = match notification::decode(&body) {
        Ok(notification) => notification,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AlertResponse {
                    status: ResponseStatus::Rejected,
                    report: None,
                    error: Some(e.to_string()),
                }),
            );
        }
    };

    info!(
        alerts = notification.alerts.len(),
        "Received alert notification"
    );

    match state.dispatcher.take_actions(&notification) {
        Ok(report) => (
            StatusCode::OK,
            Json(AlertResponse {
                status: ResponseStatus::Ok,
                report: Some(report),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(AlertResponse {
                status: ResponseStatus::Aborted,
                report: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}
