//! Candidate offers.

use std::fmt;

use dispatch_core::{CourierId, OrderId, Point, TimeWindow};
use serde::{Deserialize, Serialize};

/// Where a variant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Appended after the courier's last commitment.
    EarliestAvailable,
    /// Slotted after one of the courier's committed orders.
    AfterExistingOrder,
    /// Forced re-slotting produced by a displacement.
    AfterShift,
    /// Placed in an idle gap between committed segments.
    IdleGap,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarliestAvailable => f.write_str("earliest-available"),
            Self::AfterExistingOrder => f.write_str("after-existing-order"),
            Self::AfterShift => f.write_str("after-shift"),
            Self::IdleGap => f.write_str("idle-gap"),
        }
    }
}

/// Normalized `[0, 1]` scores of a variant relative to its competitors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiScores {
    /// Start-time score.
    pub start: f64,
    /// Finish-time score.
    pub finish: f64,
    /// Price score.
    pub price: f64,
}

/// A candidate courier/time/price offer for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Offering courier.
    pub courier: CourierId,
    /// Order the offer is for.
    pub order: OrderId,
    /// Proposed service window, from departure to delivery.
    pub window: TimeWindow,
    /// Offered price.
    pub price: f64,
    /// Departure point the window was computed from.
    pub anchor: Point,
    /// Where the offer came from.
    pub provenance: Provenance,
    /// Normalized scores, filled in by the order when ranking.
    #[serde(default)]
    pub scores: KpiScores,
    /// Ranking score, filled in by the order when ranking.
    #[serde(default)]
    pub efficiency: f64,
}

impl Variant {
    /// Returns true if this is the earliest-available offer.
    #[must_use]
    pub fn is_earliest_available(&self) -> bool {
        self.provenance == Provenance::EarliestAvailable
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for order {} by courier {} at {} price {:.2}",
            self.provenance, self.order, self.courier, self.window, self.price
        )
    }
}
