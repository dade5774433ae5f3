#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Shift Dashboard - Picking Floor Activity Backend
//!
//! A dashboard backend that periodically recomputes a shift-level picking
//! activity report from raw pick-task rows and pushes every new snapshot
//! to all connected viewers.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure report computation with no I/O
//!   - `record`: Pick records, operation codes, route grouping
//!   - `schedule`: The fixed 17-slot shift timeline
//!   - `report`: Per-slot aggregation and pending-balance propagation
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Record source and snapshot publisher interfaces
//!   - `services`: Single-flight cache refresh controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `db`: PostgreSQL record source
//!   - `broadcast`: Channel-based snapshot distribution
//!   - `http`: JSON query endpoint and WebSocket push channel
//!   - `config`: Environment-based configuration
//!   - `telemetry`: Tracing and OpenTelemetry wiring
//!
//! # Data Flow
//!
//! ```text
//! PostgreSQL ──► Refresh ──► Aggregate ──► Balance ──► Snapshot ──► HTTP query
//!                pipeline                  propagate    (cached)  └► WebSocket push
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure report computation with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::record::{OperationCode, PickRecord, RecordKey, RecordOrigin, route_group};
pub use domain::report::{ReportPayload, ReportSnapshot, SlotMetrics, aggregate, propagate_balance};
pub use domain::schedule::{SHIFT_SLOT_COUNT, ShiftSlot, ShiftTimeline};

// Application ports and services
pub use application::ports::{RecordBatch, RecordSource, SnapshotPublisher, SourceError};
pub use application::services::{RefreshError, RefreshOutcome, RefreshState, ReportCache};

// Infrastructure config
pub use infrastructure::config::{ConfigError, DashboardConfig, ServerSettings, SourceSettings};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{ReportEvent, ReportHub, SharedReportHub};

// Record source adapter
pub use infrastructure::db::PgRecordSource;

// HTTP server
pub use infrastructure::http::{ApiServer, ApiServerError, AppState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
