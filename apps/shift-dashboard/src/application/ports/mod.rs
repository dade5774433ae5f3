//! Port Interfaces
//!
//! Contracts between the refresh pipeline and the outside world, following
//! the Hexagonal Architecture pattern used across the workspace.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`RecordSource`]: fetches raw pick records for a business date
//! - [`SnapshotPublisher`]: fans a freshly computed snapshot out to viewers

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::record::PickRecord;
use crate::domain::report::ReportSnapshot;

// =============================================================================
// Record Batch
// =============================================================================

/// The result of one day-records fetch.
///
/// Rows the source could not decode are skipped rather than failing the
/// whole fetch; the skip count is carried along for observability.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    /// Successfully decoded records.
    pub records: Vec<PickRecord>,
    /// Rows skipped because they violated the expected shape.
    pub skipped: usize,
}

// =============================================================================
// Source Errors
// =============================================================================

/// Record source errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// The source cannot be reached. Recovered by retrying on the next
    /// scheduled refresh; the prior snapshot stays in service.
    #[error("record source unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// A query failed after the connection was established.
    #[error("record source query failed: {message}")]
    Query {
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Ports
// =============================================================================

/// Port for fetching pick records from the relational store.
///
/// Implementations own all filtering (branch scope, category allow-list,
/// exclusion of reversed rows and the staging lane) and the lookback
/// windows; the core never re-filters what the source returns.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the full set of qualifying records for a business date's
    /// operating window.
    async fn day_records(&self, business_date: NaiveDate) -> Result<RecordBatch, SourceError>;

    /// Count distinct still-open units that became ready in the lookback
    /// window before the business date's 07:00 anchor.
    async fn carry_in(&self, business_date: NaiveDate) -> Result<u64, SourceError>;
}

/// Port for distributing a freshly computed snapshot to subscribers.
pub trait SnapshotPublisher: Send + Sync {
    /// Publish a snapshot to all current subscribers. Must never block.
    fn publish(&self, snapshot: Arc<ReportSnapshot>);
}
