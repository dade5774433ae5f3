//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// PostgreSQL record source adapter.
pub mod db;

/// Broadcast channel adapter for snapshot distribution.
pub mod broadcast;

/// Environment-based configuration.
pub mod config;

/// HTTP query endpoint, WebSocket push channel, and health reporting.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
