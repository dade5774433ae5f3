//! Shift Timeline
//!
//! The operating day is divided into 17 fixed hourly slots anchored at
//! 07:00, the last one ending at midnight. Slots are static configuration:
//! they are computed once and never change with the business date.
//!
//! Classification works on the time of day only. The last slot's interval
//! is closed at midnight (rather than half-open like the others) so an
//! event stamped exactly at day rollover is not dropped.

use chrono::{NaiveDateTime, Timelike};

/// Number of slots in the operating day.
pub const SHIFT_SLOT_COUNT: usize = 17;

/// Seconds from midnight to the 07:00 anchor.
const ANCHOR_SECS: u32 = 7 * 3600;

/// Width of one slot in seconds.
const SLOT_SECS: u32 = 3600;

/// Seconds in a full day.
const DAY_SECS: u32 = 24 * 3600;

// =============================================================================
// Shift Slot
// =============================================================================

/// One fixed hourly slot of the operating-day timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftSlot {
    /// Ordinal position, 1..=17.
    pub ordinal: usize,
    /// Display label, e.g. `"07:00 - 08:00"`.
    pub label: String,
    /// Start offset in seconds from midnight (inclusive).
    pub start_secs: u32,
    /// End offset in seconds from midnight (exclusive, except the last
    /// slot which is closed at midnight).
    pub end_secs: u32,
}

impl ShiftSlot {
    /// Start offset as a fraction of the day.
    #[must_use]
    pub fn start_fraction(&self) -> f64 {
        f64::from(self.start_secs) / f64::from(DAY_SECS)
    }

    /// End offset as a fraction of the day.
    #[must_use]
    pub fn end_fraction(&self) -> f64 {
        f64::from(self.end_secs) / f64::from(DAY_SECS)
    }
}

// =============================================================================
// Shift Timeline
// =============================================================================

/// The full 17-slot timeline with classification over it.
#[derive(Debug, Clone)]
pub struct ShiftTimeline {
    slots: Vec<ShiftSlot>,
}

impl ShiftTimeline {
    /// Build the fixed timeline.
    #[must_use]
    pub fn new() -> Self {
        let slots = (0..SHIFT_SLOT_COUNT)
            .map(|index| {
                let start_secs = ANCHOR_SECS + SLOT_SECS * u32::try_from(index).unwrap_or(0);
                let end_secs = start_secs + SLOT_SECS;
                ShiftSlot {
                    ordinal: index + 1,
                    label: format!(
                        "{:02}:00 - {:02}:00",
                        start_secs / 3600,
                        (end_secs / 3600) % 24
                    ),
                    start_secs,
                    end_secs,
                }
            })
            .collect();
        Self { slots }
    }

    /// The ordered slots.
    #[must_use]
    pub fn slots(&self) -> &[ShiftSlot] {
        &self.slots
    }

    /// Classify a timestamp into its slot index (0-based).
    ///
    /// Only the time of day matters. Returns `None` for times before the
    /// 07:00 anchor. A timestamp at exactly 00:00:00 is treated as the
    /// day-rollover instant and lands in the last slot.
    #[must_use]
    pub fn classify(&self, at: NaiveDateTime) -> Option<usize> {
        let mut secs = at.time().num_seconds_from_midnight();
        if secs == 0 {
            secs = DAY_SECS;
        }
        if secs < ANCHOR_SECS {
            return None;
        }
        if secs >= DAY_SECS {
            return Some(SHIFT_SLOT_COUNT - 1);
        }
        Some(((secs - ANCHOR_SECS) / SLOT_SECS) as usize)
    }
}

impl Default for ShiftTimeline {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn timeline_has_seventeen_contiguous_slots() {
        let timeline = ShiftTimeline::new();
        let slots = timeline.slots();
        assert_eq!(slots.len(), SHIFT_SLOT_COUNT);
        assert_eq!(slots[0].start_secs, 7 * 3600);
        assert_eq!(slots[SHIFT_SLOT_COUNT - 1].end_secs, 24 * 3600);
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end_secs, pair[1].start_secs);
        }
    }

    #[test]
    fn slot_labels_wrap_at_midnight() {
        let timeline = ShiftTimeline::new();
        assert_eq!(timeline.slots()[0].label, "07:00 - 08:00");
        assert_eq!(timeline.slots()[0].ordinal, 1);
        assert_eq!(timeline.slots()[16].label, "23:00 - 00:00");
        assert_eq!(timeline.slots()[16].ordinal, 17);
    }

    #[test]
    fn slot_fractions_match_second_offsets() {
        let timeline = ShiftTimeline::new();
        assert!((timeline.slots()[0].start_fraction() - 7.0 / 24.0).abs() < 1e-12);
        assert!((timeline.slots()[16].end_fraction() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn classify_intervals_are_half_open() {
        let timeline = ShiftTimeline::new();
        assert_eq!(timeline.classify(at(7, 0, 0)), Some(0));
        assert_eq!(timeline.classify(at(7, 59, 59)), Some(0));
        assert_eq!(timeline.classify(at(8, 0, 0)), Some(1));
        assert_eq!(timeline.classify(at(15, 30, 0)), Some(8));
        assert_eq!(timeline.classify(at(23, 0, 0)), Some(16));
        assert_eq!(timeline.classify(at(23, 59, 59)), Some(16));
    }

    #[test]
    fn classify_before_anchor_is_none() {
        let timeline = ShiftTimeline::new();
        assert_eq!(timeline.classify(at(6, 59, 59)), None);
        assert_eq!(timeline.classify(at(0, 0, 1)), None);
        assert_eq!(timeline.classify(at(3, 15, 0)), None);
    }

    #[test]
    fn classify_midnight_rollover_lands_in_last_slot() {
        let timeline = ShiftTimeline::new();
        assert_eq!(timeline.classify(at(0, 0, 0)), Some(16));
    }
}
