//! Shift Report Computation
//!
//! Per-slot aggregation of pick records and the carry-forward pending
//! balance. Everything here is pure: the refresh controller feeds records
//! in, a fully formed [`ReportSnapshot`] comes out.
//!
//! # Determinism
//!
//! Distinct counts are accumulated in hash sets but only set sizes leak
//! out, and route groups are collected into an ordered set before being
//! joined, so the same input records always produce bit-identical metrics
//! regardless of iteration order.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::record::{PickRecord, RecordKey, RecordOrigin, route_group};
use crate::domain::schedule::{SHIFT_SLOT_COUNT, ShiftSlot, ShiftTimeline};

// =============================================================================
// Slot Metrics
// =============================================================================

/// Aggregated metrics for one shift slot.
///
/// Fully recomputed on every refresh; never patched incrementally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotMetrics {
    /// Slot ordinal, 1..=17.
    pub ordinal: usize,
    /// Slot label, e.g. `"07:00 - 08:00"`.
    pub window: String,
    /// Distinct units that became ready in this slot.
    pub assembled: usize,
    /// Distinct fully-fulfilled street-type completions.
    pub street_completed: usize,
    /// Case-equivalent separated volume for street-type picks.
    pub street_case_volume: Decimal,
    /// Distinct fully-fulfilled checkout-type completions.
    pub checkout_completed: usize,
    /// Unit volume separated at checkout lanes.
    pub checkout_unit_volume: Decimal,
    /// Distinct fully-fulfilled completions of any category.
    pub completed_total: usize,
    /// Distinct units still pending that became ready in this slot.
    pub pending: usize,
    /// Distinct pickers active in this slot.
    pub active_pickers: usize,
    /// Distinct checkers active in this slot.
    pub active_checkers: usize,
    /// Comma-joined distinct route groups, lexicographically sorted.
    pub route_groups: String,
    /// Running pending balance after this slot.
    pub pending_balance: i64,
}

// =============================================================================
// Report Snapshot
// =============================================================================

/// One fully computed report: 17 ordered slot metrics plus when they were
/// computed. Replaced atomically as a whole; readers never see a partial
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSnapshot {
    /// Ordered slot metrics, slot 1 first.
    pub data: Vec<SlotMetrics>,
    /// When this snapshot was computed.
    pub last_update: DateTime<Utc>,
}

/// Wire payload for the query endpoint and the push channel.
///
/// Identical to [`ReportSnapshot`] except that `last_update` is nullable:
/// before the first successful refresh the payload carries an empty data
/// array and a null timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    /// Ordered slot metrics; empty before the first successful refresh.
    pub data: Vec<SlotMetrics>,
    /// When the data was computed, if ever.
    pub last_update: Option<DateTime<Utc>>,
}

impl ReportPayload {
    /// Payload for the current snapshot, or the empty payload if none
    /// exists yet.
    #[must_use]
    pub fn from_snapshot(snapshot: Option<&ReportSnapshot>) -> Self {
        snapshot.map_or_else(Self::empty, |s| Self {
            data: s.data.clone(),
            last_update: Some(s.last_update),
        })
    }

    /// The payload served before any refresh has succeeded.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            last_update: None,
        }
    }
}

// =============================================================================
// Aggregation
// =============================================================================

/// Per-slot accumulator; distinct counts via sets, volumes via sums.
#[derive(Debug, Default)]
struct SlotAccumulator {
    assembled: HashSet<RecordKey>,
    street_completed: HashSet<RecordKey>,
    street_case_volume: Decimal,
    checkout_completed: HashSet<RecordKey>,
    checkout_unit_volume: Decimal,
    completed_total: HashSet<RecordKey>,
    pending: HashSet<RecordKey>,
    pickers: HashSet<String>,
    checkers: HashSet<String>,
    route_groups: BTreeSet<&'static str>,
}

impl SlotAccumulator {
    fn finish(self, slot: &ShiftSlot) -> SlotMetrics {
        SlotMetrics {
            ordinal: slot.ordinal,
            window: slot.label.clone(),
            assembled: self.assembled.len(),
            street_completed: self.street_completed.len(),
            street_case_volume: self.street_case_volume,
            checkout_completed: self.checkout_completed.len(),
            checkout_unit_volume: self.checkout_unit_volume,
            completed_total: self.completed_total.len(),
            pending: self.pending.len(),
            active_pickers: self.pickers.len(),
            active_checkers: self.checkers.len(),
            route_groups: self
                .route_groups
                .into_iter()
                .collect::<Vec<_>>()
                .join(", "),
            pending_balance: 0,
        }
    }
}

/// Aggregate pick records into per-slot metrics.
///
/// Each record is classified up to three times, once per timestamp field
/// it carries; a null optional timestamp simply excludes the record from
/// the metrics depending on that field. Pending balances are left at zero
/// for [`propagate_balance`] to fill in.
#[must_use]
pub fn aggregate(records: &[PickRecord], timeline: &ShiftTimeline) -> Vec<SlotMetrics> {
    let mut accumulators: Vec<SlotAccumulator> = (0..SHIFT_SLOT_COUNT)
        .map(|_| SlotAccumulator::default())
        .collect();

    for record in records {
        let key = record.key();

        if let Some(index) = timeline.classify(record.arrived_at) {
            let acc = &mut accumulators[index];
            if record.origin == RecordOrigin::Arrival {
                acc.assembled.insert(key.clone());
            }
            if record.completed_at.is_none() {
                acc.pending.insert(key.clone());
            }
            if let Some(description) = &record.route_description {
                acc.route_groups.insert(route_group(description));
            }
        }

        if let Some(index) = record.completed_at.and_then(|at| timeline.classify(at)) {
            let acc = &mut accumulators[index];
            let fully = record.is_fully_fulfilled();
            if record.category.is_street_type() {
                if fully {
                    acc.street_completed.insert(key.clone());
                }
                if record.units_per_case > Decimal::ZERO {
                    acc.street_case_volume += record.separated_qty / record.units_per_case;
                }
            }
            if record.category.is_checkout_type() {
                if fully {
                    acc.checkout_completed.insert(key.clone());
                }
                acc.checkout_unit_volume += record.separated_qty;
            }
            if fully {
                acc.completed_total.insert(key.clone());
            }
            if let Some(picker) = &record.picker_code {
                acc.pickers.insert(picker.clone());
            }
        }

        if let Some(index) = record.verified_at.and_then(|at| timeline.classify(at)) {
            if let Some(checker) = &record.checker_code {
                accumulators[index].checkers.insert(checker.clone());
            }
        }
    }

    timeline
        .slots()
        .iter()
        .zip(accumulators)
        .map(|(slot, acc)| acc.finish(slot))
        .collect()
}

// =============================================================================
// Balance Propagation
// =============================================================================

/// Fill in the running pending balance across slots.
///
/// Strictly sequential forward recurrence over the ordered slots: units
/// that became ready add to the pool, fully completed units leave it, and
/// the pool is seeded with the pre-period carry-in. Implemented as an
/// explicit loop; slot `i` depends on slot `i - 1` and nothing else.
/// The balance may go negative when completions land against units that
/// became ready before the window; that is part of the accounting model.
pub fn propagate_balance(slots: &mut [SlotMetrics], carry_in: i64) {
    let mut balance = carry_in;
    for slot in slots.iter_mut() {
        balance = balance + signed(slot.assembled) - signed(slot.completed_total);
        slot.pending_balance = balance;
    }
}

fn signed(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
