//! Report Cache Service
//!
//! The cache refresh controller: orchestrates fetch -> aggregate ->
//! propagate, enforces at-most-one-in-flight refresh, keeps the last good
//! snapshot, and publishes every new snapshot to subscribers.
//!
//! # Mutual Exclusion
//!
//! A single [`RefreshState`] behind a mutex is the sole guard over the
//! refresh pipeline. It is set to `Refreshing` before any I/O begins and
//! reset to `Idle` by a drop guard, so the flag is released on success,
//! failure, and task cancellation alike. A refresh requested while one is
//! in flight is a no-op: it does not queue, re-enter, or block.
//!
//! # Snapshot Sharing
//!
//! The current snapshot is an `Arc` behind an `RwLock`. Replacement is a
//! pointer swap, so readers always observe either the previous snapshot or
//! a fully formed new one, never a partial state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{RecordSource, SnapshotPublisher, SourceError};
use crate::domain::report::{ReportPayload, ReportSnapshot, aggregate, propagate_balance};
use crate::domain::schedule::ShiftTimeline;
use crate::infrastructure::metrics;

// =============================================================================
// Refresh State and Results
// =============================================================================

/// Refresh pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh in progress.
    Idle,
    /// A refresh pipeline is running.
    Refreshing,
}

/// Result of a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The pipeline ran and the snapshot was replaced.
    Completed {
        /// Records that entered the aggregation.
        records: usize,
        /// Malformed rows skipped by the source.
        skipped: usize,
    },
    /// Another refresh was already in flight; this request did nothing.
    AlreadyInFlight,
}

/// Refresh pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The record source failed; the prior snapshot stays in service.
    #[error(transparent)]
    Source(#[from] SourceError),
}

// =============================================================================
// Report Cache
// =============================================================================

/// Shared report cache with single-flight refresh.
pub struct ReportCache {
    source: Arc<dyn RecordSource>,
    publisher: Arc<dyn SnapshotPublisher>,
    timeline: ShiftTimeline,
    /// Fixed business date override; `None` resolves to today per refresh.
    business_date: Option<NaiveDate>,
    state: Mutex<RefreshState>,
    snapshot: RwLock<Option<Arc<ReportSnapshot>>>,
    last_failure: Mutex<Option<String>>,
}

/// Resets the refresh state to idle when the pipeline exits, on every
/// path: success, failure, or the refresh future being dropped.
struct InFlightGuard<'a> {
    state: &'a Mutex<RefreshState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = RefreshState::Idle;
    }
}

impl ReportCache {
    /// Create a cache with no snapshot yet.
    #[must_use]
    pub fn new(
        source: Arc<dyn RecordSource>,
        publisher: Arc<dyn SnapshotPublisher>,
        business_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            source,
            publisher,
            timeline: ShiftTimeline::new(),
            business_date,
            state: Mutex::new(RefreshState::Idle),
            snapshot: RwLock::new(None),
            last_failure: Mutex::new(None),
        }
    }

    /// Current refresh state.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        *self.state.lock()
    }

    /// The current snapshot, if any refresh has succeeded.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<ReportSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Wire payload for the current snapshot (empty before first success).
    #[must_use]
    pub fn payload(&self) -> ReportPayload {
        ReportPayload::from_snapshot(self.snapshot().as_deref())
    }

    /// The most recent refresh failure, for health reporting.
    #[must_use]
    pub fn last_failure(&self) -> Option<String> {
        self.last_failure.lock().clone()
    }

    /// Run the refresh pipeline unless one is already in flight.
    ///
    /// On success the shared snapshot is replaced atomically and published
    /// to all subscribers. On failure the previous snapshot is left
    /// untouched, the failure is recorded, and nothing is published.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError::Source`] when the record source fails.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        {
            let mut state = self.state.lock();
            if *state == RefreshState::Refreshing {
                tracing::debug!("refresh already in flight, ignoring request");
                return Ok(RefreshOutcome::AlreadyInFlight);
            }
            *state = RefreshState::Refreshing;
        }
        let _guard = InFlightGuard { state: &self.state };

        let started = Instant::now();
        match self.run_pipeline().await {
            Ok((records, skipped)) => {
                *self.last_failure.lock() = None;
                metrics::record_refresh_success(started.elapsed());
                metrics::record_rows_skipped(skipped);
                tracing::info!(records, skipped, elapsed = ?started.elapsed(), "report cache refreshed");
                Ok(RefreshOutcome::Completed { records, skipped })
            }
            Err(error) => {
                *self.last_failure.lock() = Some(error.to_string());
                metrics::record_refresh_failure();
                tracing::warn!(error = %error, "refresh failed, keeping previous snapshot");
                Err(error)
            }
        }
    }

    /// Answer the query contract: `{ data, lastUpdate }`.
    ///
    /// A forced query, or any query before the first successful refresh,
    /// attempts a refresh first. An in-flight refresh is never awaited:
    /// the answer is whatever snapshot exists at response time.
    pub async fn report(&self, force: bool) -> ReportPayload {
        if force || self.snapshot().is_none() {
            if let Err(error) = self.refresh().await {
                tracing::warn!(error = %error, "on-demand refresh failed, serving cached report");
            }
        }
        self.payload()
    }

    /// Drive periodic refreshes until cancelled.
    ///
    /// The first tick fires immediately, so boot fills the cache without
    /// waiting a full interval. Failures are logged and retried on the
    /// next tick.
    pub async fn run_scheduled(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.refresh().await {
                        tracing::warn!(error = %error, "scheduled refresh failed");
                    }
                }
                () = cancel.cancelled() => {
                    tracing::info!("report refresh loop stopped");
                    return;
                }
            }
        }
    }

    fn resolve_business_date(&self) -> NaiveDate {
        self.business_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Fetch, aggregate, propagate, swap, publish.
    ///
    /// Source connections are pool checkouts scoped to the fetch calls;
    /// they are returned on every exit path, so a failed pipeline never
    /// leaks a connection.
    async fn run_pipeline(&self) -> Result<(usize, usize), RefreshError> {
        let business_date = self.resolve_business_date();
        let carry_in = self.source.carry_in(business_date).await?;
        let batch = self.source.day_records(business_date).await?;

        let mut slots = aggregate(&batch.records, &self.timeline);
        propagate_balance(&mut slots, i64::try_from(carry_in).unwrap_or(i64::MAX));

        let snapshot = Arc::new(ReportSnapshot {
            data: slots,
            last_update: Utc::now(),
        });
        *self.snapshot.write() = Some(Arc::clone(&snapshot));
        self.publisher.publish(snapshot);

        Ok((batch.records.len(), batch.skipped))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::application::ports::RecordBatch;

    struct StubSource {
        carry_in: u64,
        fail: std::sync::atomic::AtomicBool,
        delay: Duration,
        fetches: AtomicUsize,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                carry_in: 0,
                fail: std::sync::atomic::AtomicBool::new(false),
                delay: Duration::ZERO,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordSource for StubSource {
        async fn day_records(&self, _business_date: NaiveDate) -> Result<RecordBatch, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceError::Unavailable {
                    message: "connection refused".to_string(),
                });
            }
            Ok(RecordBatch::default())
        }

        async fn carry_in(&self, _business_date: NaiveDate) -> Result<u64, SourceError> {
            Ok(self.carry_in)
        }
    }

    struct CountingPublisher {
        published: AtomicUsize,
    }

    impl CountingPublisher {
        fn new() -> Self {
            Self {
                published: AtomicUsize::new(0),
            }
        }
    }

    impl SnapshotPublisher for CountingPublisher {
        fn publish(&self, _snapshot: Arc<ReportSnapshot>) {
            self.published.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fixed_date() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 3, 10)
    }

    #[tokio::test]
    async fn refresh_fills_cache_and_publishes() {
        let source = Arc::new(StubSource::new());
        let publisher = Arc::new(CountingPublisher::new());
        let cache = ReportCache::new(
            source,
            Arc::clone(&publisher) as Arc<dyn SnapshotPublisher>,
            fixed_date(),
        );

        assert!(cache.snapshot().is_none());
        let outcome = cache.refresh().await.unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome::Completed {
                records: 0,
                skipped: 0
            }
        );
        assert!(cache.snapshot().is_some());
        assert_eq!(publisher.published.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn overlapping_refreshes_run_one_pipeline() {
        let source = Arc::new(StubSource {
            delay: Duration::from_millis(100),
            ..StubSource::new()
        });
        let publisher = Arc::new(CountingPublisher::new());
        let cache = Arc::new(ReportCache::new(
            Arc::clone(&source) as Arc<dyn RecordSource>,
            publisher,
            fixed_date(),
        ));

        let first = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.refresh().await.unwrap() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = cache.refresh().await.unwrap();

        assert_eq!(second, RefreshOutcome::AlreadyInFlight);
        assert!(matches!(
            first.await.unwrap(),
            RefreshOutcome::Completed { .. }
        ));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_keeps_previous_snapshot_and_skips_publish() {
        let source = Arc::new(StubSource::new());
        let publisher = Arc::new(CountingPublisher::new());
        let cache = ReportCache::new(
            Arc::clone(&source) as Arc<dyn RecordSource>,
            Arc::clone(&publisher) as Arc<dyn SnapshotPublisher>,
            fixed_date(),
        );

        cache.refresh().await.unwrap();
        let before = cache.snapshot().unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert!(cache.refresh().await.is_err());

        // Stale-but-available: the prior snapshot is untouched, the
        // failure is recorded, and nothing extra was published.
        assert_eq!(cache.snapshot().unwrap().last_update, before.last_update);
        assert!(cache.last_failure().is_some());
        assert_eq!(cache.state(), RefreshState::Idle);
        assert_eq!(publisher.published.load(Ordering::SeqCst), 1);

        // Recovery on a later tick clears the failure.
        source.fail.store(false, Ordering::SeqCst);
        cache.refresh().await.unwrap();
        assert!(cache.last_failure().is_none());
        assert_eq!(publisher.published.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_report_forces_a_refresh() {
        let source = Arc::new(StubSource {
            carry_in: 5,
            ..StubSource::new()
        });
        let publisher = Arc::new(CountingPublisher::new());
        let cache = ReportCache::new(
            Arc::clone(&source) as Arc<dyn RecordSource>,
            publisher,
            fixed_date(),
        );

        let payload = cache.report(false).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(payload.data.len(), 17);
        assert!(payload.data.iter().all(|s| s.pending_balance == 5));
        assert!(payload.last_update.is_some());

        // A non-forced query with a warm cache does not touch the source.
        let _ = cache.report(false).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        // A forced query does.
        let _ = cache.report(true).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }
}
