//! Schedule segments.

use std::fmt;
use std::sync::Arc;

use dispatch_core::{Order, Point};
use serde::{Deserialize, Serialize};

use crate::variant::Provenance;

/// What the courier is doing during a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    /// Empty run from the previous position to the pickup point.
    TravelToPickup,
    /// Carrying the parcel from pickup to dropoff.
    LoadedTravel,
    /// Idle. Never blocks other segments.
    Waiting,
}

impl SegmentKind {
    /// Returns true if the segment occupies the courier exclusively.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TravelToPickup => f.write_str("travel-to-pickup"),
            Self::LoadedTravel => f.write_str("loaded-travel"),
            Self::Waiting => f.write_str("waiting"),
        }
    }
}

/// Negotiation context recorded with a committed segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NegotiationParams {
    /// Which kind of offer produced the slot.
    pub provenance: Provenance,
    /// Efficiency the order assigned to the offer when it committed.
    pub efficiency: f64,
}

impl NegotiationParams {
    /// Creates negotiation parameters.
    #[must_use]
    pub const fn new(provenance: Provenance, efficiency: f64) -> Self {
        Self {
            provenance,
            efficiency,
        }
    }
}

/// A timed, geo-located slice of a courier's schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleItem {
    /// Order the segment serves.
    pub order: Arc<Order>,
    /// Segment kind.
    pub kind: SegmentKind,
    /// Start time.
    pub start_time: f64,
    /// End time.
    pub end_time: f64,
    /// Position at `start_time`.
    pub point_from: Point,
    /// Position at `end_time`.
    pub point_to: Point,
    /// Cost attributed to the segment. Equals the committed price for
    /// loaded travel, zero otherwise.
    pub cost: f64,
    /// Negotiation context.
    pub params: NegotiationParams,
}

impl ScheduleItem {
    /// Returns true if the segment has zero length.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.start_time == self.end_time
    }

    /// Overlap test against the half-open window `[from, to)`.
    ///
    /// An item that merely ends at `to` overlaps only when it has non-zero
    /// length; an item that starts exactly at `to`, or ends exactly at
    /// `from`, does not overlap.
    #[must_use]
    pub fn overlaps(&self, from: f64, to: f64) -> bool {
        let (start, end) = (self.start_time, self.end_time);
        (from <= start && start < to)
            || (from < end && end <= to && !self.is_degenerate())
            || (start <= from && from < end)
            || (start < to && to <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::OrderId;
    use test_case::test_case;

    fn item(start: f64, end: f64) -> ScheduleItem {
        let order = Order::builder(OrderId::new("o"), "o")
            .build()
            .expect("valid order");
        ScheduleItem {
            order: Arc::new(order),
            kind: SegmentKind::LoadedTravel,
            start_time: start,
            end_time: end,
            point_from: Point::default(),
            point_to: Point::default(),
            cost: 0.0,
            params: NegotiationParams::new(Provenance::EarliestAvailable, 0.0),
        }
    }

    #[test_case(0.0, 10.0, 5.0, 15.0, true ; "partial overlap right")]
    #[test_case(5.0, 15.0, 0.0, 10.0, true ; "partial overlap left")]
    #[test_case(0.0, 10.0, 2.0, 3.0, true ; "window inside item")]
    #[test_case(2.0, 3.0, 0.0, 10.0, true ; "item inside window")]
    #[test_case(0.0, 10.0, 10.0, 20.0, false ; "window starts at item end")]
    #[test_case(10.0, 20.0, 0.0, 10.0, false ; "item starts at window end")]
    #[test_case(10.0, 10.0, 0.0, 10.0, false ; "degenerate item at window end")]
    #[test_case(5.0, 5.0, 0.0, 10.0, true ; "degenerate item inside window")]
    #[test_case(0.0, 10.0, 20.0, 30.0, false ; "disjoint")]
    fn overlap_rule(start: f64, end: f64, from: f64, to: f64, expected: bool) {
        assert_eq!(item(start, end).overlaps(from, to), expected);
    }

    #[test]
    fn waiting_never_blocks() {
        assert!(!SegmentKind::Waiting.is_blocking());
        assert!(SegmentKind::LoadedTravel.is_blocking());
        assert!(SegmentKind::TravelToPickup.is_blocking());
    }

    #[test]
    fn kind_display_is_kebab_case() {
        assert_eq!(SegmentKind::TravelToPickup.to_string(), "travel-to-pickup");
        assert_eq!(
            serde_json::to_string(&SegmentKind::LoadedTravel).expect("serialize"),
            "\"loaded-travel\""
        );
    }
}
