//! PostgreSQL Record Source
//!
//! Implements the [`RecordSource`] port against the warehouse database
//! with parameterized, date-scoped queries. All filtering criteria live
//! here: branch scope, the category allow-list, exclusion of reversed
//! rows, and exclusion of the returns staging lane. The aggregation core
//! never re-filters what this adapter returns.
//!
//! The pool is created lazily, so an unreachable database at process
//! start does not crash the service; the first refresh fails and is
//! retried on schedule. Connections are pool checkouts scoped to each
//! query and returned on every exit path.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use crate::application::ports::{RecordBatch, RecordSource, SourceError};
use crate::domain::record::{OperationCode, PickRecord, RecordOrigin};
use crate::infrastructure::config::SourceSettings;

/// Days of history scanned for units that carried over into the window.
const CARRY_OVER_LOOKBACK_DAYS: u64 = 5;

/// Days of history scanned for the carry-in count.
const CARRY_IN_LOOKBACK_DAYS: i64 = 8;

/// Hour of day anchoring the operating window.
const WINDOW_ANCHOR_HOUR: u32 = 7;

/// Day records: units that became ready inside the window, plus units
/// that became ready earlier but were completed inside it. The category
/// allow-list mirrors `OperationCode::SUPPORTED`.
const DAY_RECORDS_SQL: &str = r"
WITH base AS (
    SELECT p.order_no, p.location_code, p.category_code,
           p.requested_qty, p.separated_qty,
           p.arrived_at, p.completed_at, p.verified_at,
           p.picker_code, p.checker_code, p.load_no,
           pr.units_per_case,
           'ARRIVAL' AS origin
    FROM pick_tasks p
    JOIN products pr ON pr.product_code = p.product_code
    WHERE p.branch_code = $1
      AND p.order_no > 0
      AND p.load_no IS NOT NULL
      AND p.reversed_at IS NULL
      AND p.movement = 'OUT'
      AND p.staging_lane <> 10
      AND p.category_code IN (10, 12, 13, 16, 17, 20, 22)
      AND p.arrived_at >= $2
      AND p.arrived_at <= $3

    UNION ALL

    SELECT p.order_no, p.location_code, p.category_code,
           p.requested_qty, p.separated_qty,
           p.arrived_at, p.completed_at, p.verified_at,
           p.picker_code, p.checker_code, p.load_no,
           pr.units_per_case,
           'CARRY_OVER' AS origin
    FROM pick_tasks p
    JOIN products pr ON pr.product_code = p.product_code
    WHERE p.branch_code = $1
      AND p.order_no > 0
      AND p.load_no IS NOT NULL
      AND p.reversed_at IS NULL
      AND p.movement = 'OUT'
      AND p.staging_lane <> 10
      AND p.category_code IN (10, 12, 13, 16, 17, 20, 22)
      AND p.arrived_at >= $4
      AND p.arrived_at < $2
      AND p.completed_at IS NOT NULL
      AND p.completed_at >= $2
      AND p.completed_at <= $3
)
SELECT b.*, r.description AS route_description
FROM base b
LEFT JOIN loads l ON l.load_no = b.load_no
LEFT JOIN routes r ON r.route_code = l.route_code
";

/// Distinct still-open units that became ready in the lookback window
/// before the 07:00 anchor.
const CARRY_IN_SQL: &str = r"
SELECT COUNT(DISTINCT (p.order_no, p.location_code)) AS open_units
FROM pick_tasks p
WHERE p.branch_code = $1
  AND p.order_no > 0
  AND p.load_no IS NOT NULL
  AND p.reversed_at IS NULL
  AND p.movement = 'OUT'
  AND p.staging_lane <> 10
  AND p.category_code IN (10, 12, 13, 16, 17, 20, 22)
  AND p.arrived_at >= $2
  AND p.arrived_at < $3
  AND (p.completed_at IS NULL OR p.completed_at >= $3)
";

// =============================================================================
// Record Source Adapter
// =============================================================================

/// Record source backed by the warehouse PostgreSQL database.
pub struct PgRecordSource {
    pool: PgPool,
    branch_code: String,
}

impl PgRecordSource {
    /// Create a source with a lazily connected pool.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the connection URL cannot
    /// be parsed. Reachability is only tested by the first query.
    pub fn connect_lazy(settings: &SourceSettings) -> Result<Self, SourceError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_lazy(&settings.database_url)
            .map_err(|e| SourceError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(Self::with_pool(pool, settings.branch_code.clone()))
    }

    /// Create a source around an existing pool (for testing).
    #[must_use]
    pub fn with_pool(pool: PgPool, branch_code: String) -> Self {
        Self { pool, branch_code }
    }

    fn window_anchor(business_date: NaiveDate) -> NaiveDateTime {
        business_date
            .and_hms_opt(WINDOW_ANCHOR_HOUR, 0, 0)
            .unwrap_or_else(|| business_date.and_time(chrono::NaiveTime::MIN))
    }
}

#[async_trait]
impl RecordSource for PgRecordSource {
    async fn day_records(&self, business_date: NaiveDate) -> Result<RecordBatch, SourceError> {
        let window_start = Self::window_anchor(business_date);
        let window_end = (business_date + chrono::Days::new(1)).and_time(chrono::NaiveTime::MIN);
        let carry_over_floor = (business_date - chrono::Days::new(CARRY_OVER_LOOKBACK_DAYS))
            .and_time(chrono::NaiveTime::MIN);

        let rows = sqlx::query(DAY_RECORDS_SQL)
            .bind(&self.branch_code)
            .bind(window_start)
            .bind(window_end)
            .bind(carry_over_floor)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut batch = RecordBatch {
            records: Vec::with_capacity(rows.len()),
            skipped: 0,
        };
        for row in &rows {
            match decode_row(row) {
                Ok(record) => batch.records.push(record),
                Err(error) => {
                    batch.skipped += 1;
                    tracing::warn!(error = %error, "skipping malformed pick row");
                }
            }
        }
        Ok(batch)
    }

    async fn carry_in(&self, business_date: NaiveDate) -> Result<u64, SourceError> {
        let anchor = Self::window_anchor(business_date);
        let floor = anchor - chrono::Duration::days(CARRY_IN_LOOKBACK_DAYS);

        let row = sqlx::query(CARRY_IN_SQL)
            .bind(&self.branch_code)
            .bind(floor)
            .bind(anchor)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let open_units: i64 = row.try_get("open_units").map_err(map_sqlx_error)?;
        Ok(u64::try_from(open_units).unwrap_or(0))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Why a row was rejected during decode.
#[derive(Debug, thiserror::Error)]
enum RowError {
    /// A column was missing or had the wrong type.
    #[error("column error: {0}")]
    Column(#[from] sqlx::Error),
    /// The category code is outside the supported closed set.
    #[error("unsupported category code: {0}")]
    UnsupportedCategory(i16),
    /// The origin marker was neither ARRIVAL nor CARRY_OVER.
    #[error("unknown origin marker: {0}")]
    UnknownOrigin(String),
}

fn decode_row(row: &PgRow) -> Result<PickRecord, RowError> {
    let raw_category: i16 = row.try_get("category_code")?;
    let category = u16::try_from(raw_category)
        .ok()
        .map(OperationCode::new)
        .filter(|code| code.is_supported())
        .ok_or(RowError::UnsupportedCategory(raw_category))?;

    let raw_origin: String = row.try_get("origin")?;
    let origin = match raw_origin.as_str() {
        "ARRIVAL" => RecordOrigin::Arrival,
        "CARRY_OVER" => RecordOrigin::CarryOver,
        _ => return Err(RowError::UnknownOrigin(raw_origin)),
    };

    Ok(PickRecord {
        arrived_at: row.try_get::<NaiveDateTime, _>("arrived_at")?,
        completed_at: row.try_get::<Option<NaiveDateTime>, _>("completed_at")?,
        verified_at: row.try_get::<Option<NaiveDateTime>, _>("verified_at")?,
        category,
        requested_qty: row.try_get::<Decimal, _>("requested_qty")?,
        separated_qty: row.try_get::<Decimal, _>("separated_qty")?,
        units_per_case: row.try_get::<Decimal, _>("units_per_case")?,
        order_no: row.try_get("order_no")?,
        location_code: row.try_get("location_code")?,
        picker_code: row.try_get::<Option<String>, _>("picker_code")?,
        checker_code: row.try_get::<Option<String>, _>("checker_code")?,
        route_description: row.try_get::<Option<String>, _>("route_description")?,
        origin,
    })
}

fn map_sqlx_error(error: sqlx::Error) -> SourceError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => SourceError::Unavailable {
            message: error.to_string(),
        },
        other => SourceError::Query {
            message: other.to_string(),
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_map_to_unavailable() {
        let mapped = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(mapped, SourceError::Unavailable { .. }));
    }

    #[test]
    fn query_errors_map_to_query() {
        let mapped = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(mapped, SourceError::Query { .. }));
    }

    #[test]
    fn window_anchor_is_seven_am() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let anchor = PgRecordSource::window_anchor(date);
        assert_eq!(anchor, date.and_hms_opt(7, 0, 0).unwrap());
    }
}
