//! Cascading displacement planning and staged commits.

use std::collections::HashSet;
use std::sync::Arc;

use dispatch_core::{Order, OrderId, TimeWindow};
use tracing::debug;

use crate::schedule::Schedule;
use crate::segment::NegotiationParams;
use crate::variant::Variant;

/// The chain of forced re-slottings a new window causes.
///
/// Each shift departs from the previous occupant's dropoff at the moment
/// that occupant delivers; the first departs after the new window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftPlan {
    /// Displaced orders with their forced variants, in cascade order.
    pub shifts: Vec<(Arc<Order>, Variant)>,
}

impl ShiftPlan {
    /// Returns true if nothing needs to move.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// Number of displaced orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    /// Ids of the displaced orders.
    pub fn displaced(&self) -> impl Iterator<Item = &OrderId> {
        self.shifts.iter().map(|(order, _)| &order.id)
    }
}

impl Schedule {
    /// Computes the shifts needed to free `window` for `requester`.
    ///
    /// Conflicting orders are taken in schedule order. Each is moved to
    /// right after the current occupant, and the moved window is checked
    /// again, so one shift can cascade into the next. Returns `None` when
    /// the cascade grows beyond `max_chain`.
    #[must_use]
    pub fn plan_shifts(
        &self,
        requester: &Order,
        window: TimeWindow,
        max_chain: usize,
    ) -> Option<ShiftPlan> {
        let mut checked = HashSet::from([requester.id.clone()]);
        let mut working: Vec<Arc<Order>> = Vec::new();
        let mut plan = ShiftPlan::default();
        let mut occupant_dropoff = requester.dropoff;
        let mut occupied = window;

        loop {
            for item in self.conflicts(occupied, &checked) {
                if !working.iter().any(|o| o.id == item.order.id) {
                    working.push(Arc::clone(&item.order));
                }
            }
            if working.is_empty() {
                break;
            }
            if plan.len() >= max_chain {
                debug!(order = %requester.id, max_chain, "shift cascade too long");
                return None;
            }
            let displaced = working.remove(0);
            let variant = self.shift_variant(&displaced, occupant_dropoff, occupied.to);
            if !variant.window.to.is_finite() {
                return None;
            }
            occupant_dropoff = displaced.dropoff;
            occupied = variant.window;
            checked.insert(displaced.id.clone());
            plan.shifts.push((displaced, variant));
        }
        Some(plan)
    }

    /// Applies a displacement batch atomically.
    ///
    /// The displaced orders are detached, the requester is placed at its
    /// variant and the displaced orders are re-placed at their shifted
    /// windows in start-time order. The first untouched order after the
    /// batch gets its approach leg rebuilt from the last placed dropoff.
    /// The work happens on a copy; the schedule is replaced only if every
    /// placement succeeds and that order can still be reached in time.
    pub fn commit_displacement(
        &mut self,
        requester: &Arc<Order>,
        variant: &Variant,
        shifts: &[(Arc<Order>, Variant)],
    ) -> bool {
        let mut staged = self.clone();
        let mut batch = HashSet::from([requester.id.clone()]);
        for (order, _) in shifts {
            staged.detach(&order.id);
            batch.insert(order.id.clone());
        }
        let (last, free_at) = batch_end(requester, variant, shifts);
        let follower = staged
            .next_loaded(free_at, &batch)
            .map(|i| i.order.id.clone());
        if let Some(follower) = &follower {
            staged.drop_approach(follower);
        }

        let params = NegotiationParams::new(variant.provenance, variant.efficiency);
        if !staged.try_insert_from(variant.anchor, requester, variant.window, variant.price, params)
        {
            debug!(order = %requester.id, "requester does not fit after detaching displaced orders");
            return false;
        }

        let mut ordered: Vec<_> = shifts.iter().collect();
        ordered.sort_by(|a, b| a.1.window.from.total_cmp(&b.1.window.from));
        for (order, shift) in ordered {
            let params = NegotiationParams::new(shift.provenance, shift.efficiency);
            if !staged.try_insert_from(shift.anchor, order, shift.window, shift.price, params) {
                debug!(order = %order.id, window = %shift.window, "shifted order does not fit");
                return false;
            }
        }
        if let Some(follower) = &follower {
            if !staged.restitch(follower, last.dropoff, free_at) {
                debug!(order = %requester.id, %follower, "batch strands the following order");
                return false;
            }
        }
        *self = staged;
        true
    }

    /// The untouched order right after a committed batch.
    #[must_use]
    pub fn batch_follower(
        &self,
        requester: &Arc<Order>,
        variant: &Variant,
        shifts: &[(Arc<Order>, Variant)],
    ) -> Option<OrderId> {
        let (last, _) = batch_end(requester, variant, shifts);
        self.follower(&last.id)
    }
}

/// The batch member that finishes last, with its finish time.
fn batch_end<'a>(
    requester: &'a Arc<Order>,
    variant: &Variant,
    shifts: &'a [(Arc<Order>, Variant)],
) -> (&'a Arc<Order>, f64) {
    shifts.iter().fold(
        (requester, variant.window.to),
        |(last, free_at), (order, shift)| {
            if shift.window.to > free_at {
                (order, shift.window.to)
            } else {
                (last, free_at)
            }
        },
    )
}
