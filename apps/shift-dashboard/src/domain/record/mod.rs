//! Pick Record Types
//!
//! Domain types for raw order-fulfillment rows as returned by the record
//! source. A record describes one pick action: a unit that became ready on
//! the floor, was (possibly) separated, and was (possibly) verified.
//!
//! Records are immutable once fetched and live only for the duration of a
//! single refresh cycle; nothing in this module is ever persisted.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

// =============================================================================
// Operation Codes
// =============================================================================

/// Operation-type code for a pick task.
///
/// Drawn from the closed set of category codes the record source is allowed
/// to return. Street-type codes cover full-case floor picking; checkout-type
/// codes cover unit picking at the checkout lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationCode(u16);

impl OperationCode {
    /// The closed set of codes the report understands.
    pub const SUPPORTED: &'static [u16] = &[10, 12, 13, 16, 17, 20, 22];

    /// Wrap a raw category code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the raw code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Whether the code belongs to the supported closed set.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self.0, 10 | 12 | 13 | 16 | 17 | 20 | 22)
    }

    /// Whether this is a street-type (full-case floor pick) operation.
    #[must_use]
    pub const fn is_street_type(self) -> bool {
        matches!(self.0, 10 | 12 | 16 | 20)
    }

    /// Whether this is a checkout-type (unit pick) operation.
    #[must_use]
    pub const fn is_checkout_type(self) -> bool {
        matches!(self.0, 13 | 22)
    }
}

// =============================================================================
// Record Origin
// =============================================================================

/// Where a record entered the reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    /// The unit became ready inside the reporting window.
    Arrival,
    /// The unit became ready before the 07:00 anchor but was completed
    /// inside the reporting window.
    CarryOver,
}

// =============================================================================
// Record Identity
// =============================================================================

/// Deduplication identity of a pick record.
///
/// Distinct counts throughout the report are counted over this pair, so
/// multiple product lines of the same order at the same location collapse
/// into one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Order number.
    pub order_no: i64,
    /// Warehouse location code.
    pub location_code: String,
}

// =============================================================================
// Pick Record
// =============================================================================

/// One raw fulfillment action as fetched from the record source.
#[derive(Debug, Clone)]
pub struct PickRecord {
    /// When the unit physically became ready on the floor.
    pub arrived_at: NaiveDateTime,
    /// When separation finished. `None` while the pick is still pending.
    pub completed_at: Option<NaiveDateTime>,
    /// When the quality check finished.
    pub verified_at: Option<NaiveDateTime>,
    /// Operation-type code.
    pub category: OperationCode,
    /// Requested quantity.
    pub requested_qty: Decimal,
    /// Separated (fulfilled) quantity.
    pub separated_qty: Decimal,
    /// Units-per-case conversion factor for the picked product.
    pub units_per_case: Decimal,
    /// Order number.
    pub order_no: i64,
    /// Warehouse location code.
    pub location_code: String,
    /// Assigned picker.
    pub picker_code: Option<String>,
    /// Assigned checker.
    pub checker_code: Option<String>,
    /// Raw route description resolved through the source's route lookup.
    pub route_description: Option<String>,
    /// Whether the record arrived inside the window or carried over into it.
    pub origin: RecordOrigin,
}

impl PickRecord {
    /// Deduplication key for distinct counts.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            order_no: self.order_no,
            location_code: self.location_code.clone(),
        }
    }

    /// Whether the requested quantity was fully separated.
    #[must_use]
    pub fn is_fully_fulfilled(&self) -> bool {
        self.requested_qty == self.separated_qty
    }
}

// =============================================================================
// Route Grouping
// =============================================================================

/// Fallback group for route descriptions missing from the table.
pub const ROUTE_GROUP_FALLBACK: &str = "OTHER";

/// Classification table from raw route descriptions to dashboard groups.
///
/// Data-driven on purpose: dispatch adds and renames routes without
/// touching the aggregation logic, so new descriptions only need a row
/// here (or fall back to [`ROUTE_GROUP_FALLBACK`]).
const ROUTE_GROUP_TABLE: &[(&str, &str)] = &[
    ("CAPITAL", "CAPITAL"),
    ("WATERWAY", "WATERWAY"),
    ("BRANCH TRANSFER", "BRANCH"),
    ("SCHEDULED DELIVERY", "SCHEDULED"),
    ("CUSTOMER PICKUP", "PICKUP"),
    ("KEY ACCOUNT", "KEY ACCOUNT"),
    ("SELF SERVICE", "SELF SERVICE"),
    // Regional road routes collapse into one interior group.
    ("NORTH COUNTY", "INTERIOR"),
    ("SOUTH COUNTY", "INTERIOR"),
    ("RIVER VALLEY", "INTERIOR"),
    ("HIGHLANDS", "INTERIOR"),
    ("LINEHAUL 1", "INTERIOR"),
    ("LINEHAUL 2", "INTERIOR"),
    ("LINEHAUL 3", "INTERIOR"),
    // Satellite depot routes.
    ("SATELLITE CAPITAL", "SATELLITE"),
    ("SATELLITE LINEHAUL 1", "SATELLITE"),
    ("SATELLITE LINEHAUL 2", "SATELLITE"),
    ("SATELLITE MIN LOAD", "SATELLITE"),
];

/// Resolve a raw route description to its dashboard group label.
#[must_use]
pub fn route_group(description: &str) -> &'static str {
    ROUTE_GROUP_TABLE
        .iter()
        .find(|(raw, _)| *raw == description)
        .map_or(ROUTE_GROUP_FALLBACK, |(_, group)| group)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn make_record(order_no: i64, location_code: &str) -> PickRecord {
        PickRecord {
            arrived_at: chrono::NaiveDate::from_ymd_opt(2025, 3, 10)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
            completed_at: None,
            verified_at: None,
            category: OperationCode::new(10),
            requested_qty: dec!(10),
            separated_qty: dec!(10),
            units_per_case: dec!(12),
            order_no,
            location_code: location_code.to_string(),
            picker_code: None,
            checker_code: None,
            route_description: None,
            origin: RecordOrigin::Arrival,
        }
    }

    #[test]
    fn street_and_checkout_codes_are_disjoint() {
        for &code in OperationCode::SUPPORTED {
            let op = OperationCode::new(code);
            assert!(op.is_supported());
            assert!(!(op.is_street_type() && op.is_checkout_type()));
        }
    }

    #[test]
    fn code_17_is_neither_street_nor_checkout() {
        let op = OperationCode::new(17);
        assert!(op.is_supported());
        assert!(!op.is_street_type());
        assert!(!op.is_checkout_type());
    }

    #[test]
    fn unknown_code_is_unsupported() {
        assert!(!OperationCode::new(99).is_supported());
    }

    #[test]
    fn record_key_collapses_lines_of_same_unit() {
        let a = make_record(42, "A-01-02");
        let b = make_record(42, "A-01-02");
        let c = make_record(42, "B-09-01");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn fully_fulfilled_compares_quantities() {
        let mut record = make_record(1, "A");
        assert!(record.is_fully_fulfilled());
        record.separated_qty = dec!(9);
        assert!(!record.is_fully_fulfilled());
    }

    #[test]
    fn route_group_resolves_table_entries() {
        assert_eq!(route_group("CAPITAL"), "CAPITAL");
        assert_eq!(route_group("NORTH COUNTY"), "INTERIOR");
        assert_eq!(route_group("LINEHAUL 3"), "INTERIOR");
        assert_eq!(route_group("SATELLITE MIN LOAD"), "SATELLITE");
        assert_eq!(route_group("CUSTOMER PICKUP"), "PICKUP");
    }

    #[test]
    fn route_group_falls_back_to_other() {
        assert_eq!(route_group("BRAND NEW ROUTE"), ROUTE_GROUP_FALLBACK);
        assert_eq!(route_group(""), ROUTE_GROUP_FALLBACK);
    }
}
