//! Shift Dashboard Binary
//!
//! Starts the picking-floor activity dashboard backend.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin shift-dashboard
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DASHBOARD_DB_URL`: PostgreSQL connection URL for the warehouse store
//!
//! ## Optional
//! - `DASHBOARD_DB_MAX_CONNECTIONS`: Pool size (default: 5)
//! - `DASHBOARD_BRANCH_CODE`: Branch scope for source queries (default: 1)
//! - `DASHBOARD_HTTP_PORT`: HTTP/WebSocket port (default: 3000)
//! - `DASHBOARD_REFRESH_INTERVAL_SECS`: Refresh cadence (default: 120)
//! - `DASHBOARD_BUSINESS_DATE`: Fixed ISO report date (default: today)
//! - `DASHBOARD_REPORTS_CAPACITY`: Broadcast channel capacity (default: 64)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: shift-dashboard)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use shift_dashboard::infrastructure::telemetry;
use shift_dashboard::{
    ApiServer, AppState, DashboardConfig, PgRecordSource, ReportCache, ReportHub, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Shift Dashboard");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = DashboardConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Broadcast hub for snapshot distribution
    let hub = Arc::new(ReportHub::new(config.server.reports_capacity));

    // Record source with a lazy pool: an unreachable database at boot
    // leaves the cache empty and the scheduler retrying.
    let source = Arc::new(PgRecordSource::connect_lazy(&config.source)?);

    // Cache refresh controller
    let cache = Arc::new(ReportCache::new(
        source,
        Arc::clone(&hub) as Arc<dyn shift_dashboard::SnapshotPublisher>,
        config.business_date,
    ));

    // Periodic refresh loop; the first tick fires immediately so boot
    // fills the cache without waiting a full interval.
    let refresher = Arc::clone(&cache);
    let refresh_cancel = shutdown_token.clone();
    let refresh_interval = config.server.refresh_interval;
    tokio::spawn(async move {
        refresher.run_scheduled(refresh_interval, refresh_cancel).await;
    });

    // HTTP server (query endpoint, WebSocket push, health, metrics)
    let state = AppState::new(Arc::clone(&cache), Arc::clone(&hub));
    let server = ApiServer::new(config.server.http_port, state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Shift dashboard ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Shift dashboard stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &DashboardConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        refresh_interval_secs = config.server.refresh_interval.as_secs(),
        reports_capacity = config.server.reports_capacity,
        branch_code = %config.source.branch_code,
        business_date = ?config.business_date,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
