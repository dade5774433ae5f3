//! HTTP Interface
//!
//! The outward-facing surface of the dashboard: the JSON query endpoint,
//! the WebSocket push channel, health reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /api/shift-report` - Current report as `{ data, lastUpdate }`;
//!   `?force=1|true|yes` refreshes before answering
//! - `GET /ws` - WebSocket push: current payload on connect, then every
//!   successful refresh
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::services::{RefreshState, ReportCache};
use crate::domain::report::ReportPayload;
use crate::infrastructure::broadcast::SharedReportHub;
use crate::infrastructure::metrics::{get_metrics_handle, set_subscribers};

// =============================================================================
// Application State
// =============================================================================

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    cache: Arc<ReportCache>,
    hub: SharedReportHub,
    version: String,
    started_at: Instant,
}

impl AppState {
    /// Create the shared server state.
    #[must_use]
    pub fn new(cache: Arc<ReportCache>, hub: SharedReportHub) -> Self {
        Self {
            cache,
            hub,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// Dashboard HTTP server.
pub struct ApiServer {
    port: u16,
    state: AppState,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let app = create_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Create the Axum router with all endpoints.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/shift-report", get(shift_report_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// Query Endpoint
// =============================================================================

/// Query string for the report endpoint.
#[derive(Debug, Deserialize)]
struct ReportQuery {
    force: Option<String>,
}

/// Whether a `force` query value requests a refresh-before-answer.
fn parse_force(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "yes"))
}

async fn shift_report_handler(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Json<ReportPayload> {
    let force = parse_force(query.force.as_deref());
    Json(state.cache.report(force).await)
}

// =============================================================================
// WebSocket Push Channel
// =============================================================================

async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let reports = state.hub.reports_rx();
    set_subscribers(state.hub.receiver_count());
    tracing::debug!(subscribers = state.hub.receiver_count(), "viewer connected");

    serve_subscriber(&mut socket, &state, reports).await;

    set_subscribers(state.hub.receiver_count());
    tracing::debug!(subscribers = state.hub.receiver_count(), "viewer disconnected");
}

async fn serve_subscriber(
    socket: &mut WebSocket,
    state: &AppState,
    mut reports: broadcast::Receiver<crate::infrastructure::broadcast::ReportEvent>,
) {
    // Every new subscriber gets the current state immediately, even if it
    // is stale or empty.
    if send_payload(socket, &state.cache.payload()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = reports.recv() => match event {
                Ok(event) => {
                    let payload = ReportPayload::from_snapshot(Some(&event.snapshot));
                    if send_payload(socket, &payload).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "viewer lagged behind report broadcasts");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_payload(socket: &mut WebSocket, payload: &ReportPayload) -> Result<(), axum::Error> {
    match serde_json::to_string(payload) {
        Ok(text) => socket.send(Message::Text(text.into())).await,
        Err(error) => {
            tracing::error!(error = %error, "failed to serialize report payload");
            Ok(())
        }
    }
}

// =============================================================================
// Health Endpoints
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Refresh pipeline state.
    pub refresh_state: &'static str,
    /// When the cached report was last computed.
    pub last_update: Option<DateTime<Utc>>,
    /// Most recent refresh failure, if any.
    pub last_failure: Option<String>,
    /// Active push subscribers.
    pub subscribers: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// A report is cached and the last refresh succeeded.
    Healthy,
    /// A report is cached but the last refresh failed (stale data).
    Degraded,
    /// No report has ever been computed.
    Unhealthy,
}

fn determine_health_status(has_snapshot: bool, has_failure: bool) -> HealthStatus {
    match (has_snapshot, has_failure) {
        (true, false) => HealthStatus::Healthy,
        (true, true) => HealthStatus::Degraded,
        (false, _) => HealthStatus::Unhealthy,
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.cache.snapshot();
    let last_failure = state.cache.last_failure();
    let status = determine_health_status(snapshot.is_some(), last_failure.is_some());

    let response = HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        refresh_state: match state.cache.state() {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
        },
        last_update: snapshot.map(|s| s.last_update),
        last_failure,
        subscribers: state.hub.receiver_count(),
    };

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
