//! Report Pipeline Integration Tests
//!
//! Exercises the refresh controller end to end against a scripted record
//! source: worked report examples, single-flight refresh, broadcast
//! semantics, and failure isolation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal_macros::dec;
use shift_dashboard::{
    OperationCode, PickRecord, RecordBatch, RecordOrigin, RecordSource, RefreshOutcome,
    ReportCache, ReportHub, SourceError,
};

const BUSINESS_DATE: (i32, u32, u32) = (2025, 3, 10);

fn business_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(BUSINESS_DATE.0, BUSINESS_DATE.1, BUSINESS_DATE.2).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    business_date().and_hms_opt(h, m, 0).unwrap()
}

fn street_record(order_no: i64, arrived: NaiveDateTime) -> PickRecord {
    PickRecord {
        arrived_at: arrived,
        completed_at: None,
        verified_at: None,
        category: OperationCode::new(10),
        requested_qty: dec!(10),
        separated_qty: dec!(10),
        units_per_case: dec!(12),
        order_no,
        location_code: "A-01".to_string(),
        picker_code: None,
        checker_code: None,
        route_description: None,
        origin: RecordOrigin::Arrival,
    }
}

struct ScriptedSource {
    records: Vec<PickRecord>,
    skipped: usize,
    carry_in: u64,
    delay: Duration,
    fail: AtomicBool,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    fn new(records: Vec<PickRecord>, carry_in: u64) -> Self {
        Self {
            records,
            skipped: 0,
            carry_in,
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn day_records(&self, _business_date: NaiveDate) -> Result<RecordBatch, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        Ok(RecordBatch {
            records: self.records.clone(),
            skipped: self.skipped,
        })
    }

    async fn carry_in(&self, _business_date: NaiveDate) -> Result<u64, SourceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        Ok(self.carry_in)
    }
}

fn build_cache(source: Arc<ScriptedSource>, hub: Arc<ReportHub>) -> Arc<ReportCache> {
    Arc::new(ReportCache::new(source, hub, Some(business_date())))
}

// =============================================================================
// Worked Report Examples
// =============================================================================

#[tokio::test]
async fn empty_day_keeps_balance_at_carry_in() {
    let source = Arc::new(ScriptedSource::new(Vec::new(), 5));
    let cache = build_cache(source, Arc::new(ReportHub::with_defaults()));

    let payload = cache.report(false).await;
    assert_eq!(payload.data.len(), 17);
    assert!(payload.last_update.is_some());
    assert_eq!(payload.data[0].window, "07:00 - 08:00");
    assert_eq!(payload.data[16].window, "23:00 - 00:00");
    for slot in &payload.data {
        assert_eq!(slot.assembled, 0);
        assert_eq!(slot.completed_total, 0);
        assert_eq!(slot.pending, 0);
        assert_eq!(slot.route_groups, "");
        assert_eq!(slot.pending_balance, 5);
    }
}

#[tokio::test]
async fn single_street_pick_moves_the_balance() {
    // Arrival in slot 3 (09:00 - 10:00), completion in slot 5 (11:00 - 12:00).
    let mut record = street_record(100, at(9, 30));
    record.completed_at = Some(at(11, 15));
    let source = Arc::new(ScriptedSource::new(vec![record], 0));
    let cache = build_cache(source, Arc::new(ReportHub::with_defaults()));

    let payload = cache.report(false).await;
    let data = &payload.data;

    assert_eq!(data[2].assembled, 1);
    assert_eq!(data[4].street_completed, 1);
    assert_eq!(data[4].completed_total, 1);
    for (index, slot) in data.iter().enumerate() {
        if index != 2 {
            assert_eq!(slot.assembled, 0);
        }
        if index != 4 {
            assert_eq!(slot.completed_total, 0);
            assert_eq!(slot.street_completed, 0);
        }
    }

    // Balance rises by one at slot 3 and falls back at slot 5.
    assert_eq!(data[0].pending_balance, 0);
    assert_eq!(data[1].pending_balance, 0);
    assert_eq!(data[2].pending_balance, 1);
    assert_eq!(data[3].pending_balance, 1);
    assert_eq!(data[4].pending_balance, 0);
    assert_eq!(data[16].pending_balance, 0);
}

#[tokio::test]
async fn skipped_rows_surface_in_the_outcome() {
    let mut source = ScriptedSource::new(Vec::new(), 0);
    source.skipped = 2;
    let cache = build_cache(Arc::new(source), Arc::new(ReportHub::with_defaults()));

    let outcome = cache.refresh().await.unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Completed {
            records: 0,
            skipped: 2
        }
    );
}

// =============================================================================
// Single-Flight Refresh
// =============================================================================

#[tokio::test]
async fn overlapping_refreshes_query_the_source_once() {
    let mut slow = ScriptedSource::new(Vec::new(), 0);
    slow.delay = Duration::from_millis(150);
    let source = Arc::new(slow);
    let cache = build_cache(Arc::clone(&source), Arc::new(ReportHub::with_defaults()));

    let racer = tokio::spawn({
        let cache = Arc::clone(&cache);
        async move { cache.refresh().await.unwrap() }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = cache.refresh().await.unwrap();

    assert_eq!(second, RefreshOutcome::AlreadyInFlight);
    assert!(matches!(
        racer.await.unwrap(),
        RefreshOutcome::Completed { .. }
    ));
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Broadcast Semantics
// =============================================================================

#[tokio::test]
async fn broadcast_fires_on_success_only() {
    let source = Arc::new(ScriptedSource::new(Vec::new(), 3));
    let hub = Arc::new(ReportHub::with_defaults());
    let cache = build_cache(Arc::clone(&source), Arc::clone(&hub));

    let mut rx = hub.reports_rx();

    cache.refresh().await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.snapshot.data.len(), 17);
    assert_eq!(event.snapshot.data[0].pending_balance, 3);

    source.fail.store(true, Ordering::SeqCst);
    assert!(cache.refresh().await.is_err());
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test]
async fn source_failure_leaves_cached_report_in_service() {
    let source = Arc::new(ScriptedSource::new(vec![street_record(7, at(8, 5))], 1));
    let cache = build_cache(Arc::clone(&source), Arc::new(ReportHub::with_defaults()));

    let first = cache.report(false).await;
    let last_update = first.last_update.unwrap();

    source.fail.store(true, Ordering::SeqCst);
    assert!(cache.refresh().await.is_err());

    // Queries keep answering from the stale snapshot, even forced ones.
    let stale = cache.report(true).await;
    assert_eq!(stale.last_update.unwrap(), last_update);
    assert_eq!(stale.data[1].assembled, 1);
}

#[tokio::test]
async fn payload_is_empty_until_the_first_success() {
    let source = Arc::new(ScriptedSource::new(Vec::new(), 0));
    source.fail.store(true, Ordering::SeqCst);
    let cache = build_cache(Arc::clone(&source), Arc::new(ReportHub::with_defaults()));

    // The implicit first-access refresh fails; the endpoint still answers.
    let payload = cache.report(false).await;
    assert!(payload.data.is_empty());
    assert!(payload.last_update.is_none());

    // Once the source recovers, the next query fills the cache.
    source.fail.store(false, Ordering::SeqCst);
    let payload = cache.report(false).await;
    assert_eq!(payload.data.len(), 17);
    assert!(payload.last_update.is_some());
}
