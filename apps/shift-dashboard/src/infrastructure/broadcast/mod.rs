//! Broadcast Channel Adapter
//!
//! Implements snapshot distribution using a tokio broadcast channel for
//! efficient fan-out to multiple subscribers. Every successful refresh is
//! sent as one [`ReportEvent`]; all receivers get the identical event with
//! no per-subscriber filtering or backpressure.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::application::ports::SnapshotPublisher;
use crate::domain::report::ReportSnapshot;

// =============================================================================
// Report Event
// =============================================================================

/// Snapshot broadcast event.
#[derive(Debug, Clone)]
pub struct ReportEvent {
    /// The freshly computed snapshot.
    pub snapshot: Arc<ReportSnapshot>,
}

// =============================================================================
// Report Hub
// =============================================================================

/// Central hub for snapshot distribution.
///
/// # Example
///
/// ```rust
/// use shift_dashboard::ReportHub;
///
/// let hub = ReportHub::new(64);
///
/// // Get a receiver for report events
/// let mut rx = hub.reports_rx();
///
/// // The refresh controller publishes through the SnapshotPublisher port
/// // hub.send_report(snapshot);
/// ```
#[derive(Debug)]
pub struct ReportHub {
    reports_tx: broadcast::Sender<ReportEvent>,
}

impl ReportHub {
    /// Default channel capacity.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a hub with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            reports_tx: broadcast::channel(capacity).0,
        }
    }

    /// Create a hub with default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }

    /// Send a snapshot to all subscribers.
    ///
    /// Returns the number of receivers that got the event, or `None` if
    /// there are no active receivers.
    pub fn send_report(&self, snapshot: Arc<ReportSnapshot>) -> Option<usize> {
        self.reports_tx.send(ReportEvent { snapshot }).ok()
    }

    /// Get a new receiver for report events.
    #[must_use]
    pub fn reports_rx(&self) -> broadcast::Receiver<ReportEvent> {
        self.reports_tx.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.reports_tx.receiver_count()
    }
}

impl SnapshotPublisher for ReportHub {
    fn publish(&self, snapshot: Arc<ReportSnapshot>) {
        let receivers = self.send_report(snapshot).unwrap_or(0);
        crate::infrastructure::metrics::record_reports_sent(receivers);
        tracing::debug!(receivers, "snapshot broadcast");
    }
}

/// Shared report hub reference.
pub type SharedReportHub = Arc<ReportHub>;

// =============================================================================
// Tests
// =============================================================================
