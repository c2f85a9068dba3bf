//! The per-courier interval schedule.

use std::collections::HashSet;
use std::sync::Arc;

use dispatch_core::{Courier, DeliveryData, Order, OrderId, Point, TimeWindow, VariantSearch};
use tracing::debug;

use crate::segment::{NegotiationParams, ScheduleItem, SegmentKind};
use crate::variant::{KpiScores, Provenance, Variant};

/// Outcome of [`Schedule::remove`].
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// The order had no segments in the schedule.
    NotFound,
    /// The order's segments were deleted.
    Removed {
        /// The order whose segment now follows the freed gap, with its
        /// recomputed delivery data.
        affected: Option<(OrderId, DeliveryData)>,
    },
}

/// A courier's ordered sequence of segments.
///
/// Items are kept sorted by start time; non-waiting items never overlap.
/// Every mutating operation either succeeds completely or leaves the
/// schedule untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    courier: Courier,
    items: Vec<ScheduleItem>,
    epsilon: f64,
}

impl Schedule {
    /// Creates an empty schedule for `courier`.
    #[must_use]
    pub const fn new(courier: Courier, epsilon: f64) -> Self {
        Self {
            courier,
            items: Vec::new(),
            epsilon,
        }
    }

    /// The courier this schedule belongs to.
    #[must_use]
    pub const fn courier(&self) -> &Courier {
        &self.courier
    }

    /// All items, sorted by start time.
    #[must_use]
    pub fn items(&self) -> &[ScheduleItem] {
        &self.items
    }

    /// Returns true if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Time at which the courier's last commitment ends, 0 when idle.
    #[must_use]
    pub fn last_free_time(&self) -> f64 {
        self.items.iter().map(|i| i.end_time).fold(0.0, f64::max)
    }

    /// Where the courier will be after its last commitment, home when idle.
    #[must_use]
    pub fn last_point(&self) -> Point {
        self.items
            .iter()
            .max_by(|a, b| a.end_time.total_cmp(&b.end_time))
            .map_or(self.courier.home, |i| i.point_to)
    }

    /// Returns true if the order has segments in the schedule.
    #[must_use]
    pub fn contains(&self, order: &OrderId) -> bool {
        self.items.iter().any(|i| &i.order.id == order)
    }

    /// Distinct orders in schedule order.
    #[must_use]
    pub fn planned_orders(&self) -> Vec<Arc<Order>> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter(|i| seen.insert(i.order.id.clone()))
            .map(|i| Arc::clone(&i.order))
            .collect()
    }

    /// Efficiency recorded when the order committed to its slot.
    #[must_use]
    pub fn committed_efficiency(&self, order: &OrderId) -> Option<f64> {
        self.items
            .iter()
            .find(|i| i.kind == SegmentKind::LoadedTravel && &i.order.id == order)
            .map(|i| i.params.efficiency)
    }

    /// Delivery data of a scheduled order: the sum of its segment costs and
    /// the span of its segments.
    #[must_use]
    pub fn delivery_data(&self, order: &OrderId) -> DeliveryData {
        let mut span: Option<(f64, f64)> = None;
        let mut price = 0.0;
        for item in self.items.iter().filter(|i| &i.order.id == order) {
            price += item.cost;
            span = Some(match span {
                None => (item.start_time, item.end_time),
                Some((from, to)) => (from.min(item.start_time), to.max(item.end_time)),
            });
        }
        match span {
            Some((from, to)) => DeliveryData::Assigned {
                courier: self.courier.id.clone(),
                price,
                window: TimeWindow::new(from, to),
            },
            None => DeliveryData::Unassigned,
        }
    }

    /// Appends an order after the courier's last commitment.
    ///
    /// Rejects when the courier is still busy at `window.from`, when the
    /// window is not geometrically achievable from the courier's last point,
    /// or when it collides with a blocking segment. A rejected insertion
    /// leaves the schedule unchanged.
    pub fn try_insert(
        &mut self,
        order: &Arc<Order>,
        window: TimeWindow,
        price: f64,
        params: NegotiationParams,
    ) -> bool {
        let last_free = self.last_free_time();
        if last_free - window.from > self.epsilon {
            debug!(
                order = %order.id,
                last_free,
                requested = window.from,
                "courier busy past requested start"
            );
            return false;
        }
        let anchor = self.last_point();
        self.try_insert_from(anchor, order, window, price, params)
    }

    /// Places an order departing from `anchor` at `window.from`.
    ///
    /// Unlike [`Schedule::try_insert`] the window may lie in a gap between
    /// existing segments.
    pub fn try_insert_from(
        &mut self,
        anchor: Point,
        order: &Arc<Order>,
        window: TimeWindow,
        price: f64,
        params: NegotiationParams,
    ) -> bool {
        if self.contains(&order.id) {
            debug!(order = %order.id, "order already scheduled");
            return false;
        }
        let to_pickup = self.courier.travel_time(&anchor, &order.pickup);
        let loaded = self.courier.travel_time(&order.pickup, &order.dropoff);
        let pickup_at = window.from + to_pickup;
        let finish = pickup_at + loaded;
        if !finish.is_finite() || (finish - window.to).abs() > self.epsilon {
            debug!(
                order = %order.id,
                finish,
                requested = window.to,
                "window not achievable"
            );
            return false;
        }
        let inner = TimeWindow::new(
            window.from + self.epsilon,
            (window.to - self.epsilon).max(window.from + self.epsilon),
        );
        if !self.items.is_empty() && !self.conflicts(inner, &HashSet::new()).is_empty() {
            debug!(order = %order.id, %window, "window conflicts with schedule");
            return false;
        }

        let order = Arc::clone(order);
        let segment = |kind, start_time, end_time, point_from, point_to, cost| ScheduleItem {
            order: Arc::clone(&order),
            kind,
            start_time,
            end_time,
            point_from,
            point_to,
            cost,
            params,
        };
        if to_pickup > self.epsilon {
            self.items.push(segment(
                SegmentKind::TravelToPickup,
                window.from,
                pickup_at,
                anchor,
                order.pickup,
                0.0,
            ));
        }
        let delivered_at = finish.min(window.to).max(pickup_at);
        self.items.push(segment(
            SegmentKind::LoadedTravel,
            pickup_at,
            delivered_at,
            order.pickup,
            order.dropoff,
            price,
        ));
        if window.to > delivered_at {
            self.items.push(segment(
                SegmentKind::Waiting,
                delivered_at,
                window.to,
                order.dropoff,
                order.dropoff,
                0.0,
            ));
        }
        self.sort();
        true
    }

    /// Blocking items overlapping `window`, skipping orders in `except`.
    #[must_use]
    pub fn conflicts(&self, window: TimeWindow, except: &HashSet<OrderId>) -> Vec<&ScheduleItem> {
        self.items
            .iter()
            .filter(|i| i.kind.is_blocking())
            .filter(|i| !except.contains(&i.order.id))
            .filter(|i| i.overlaps(window.from, window.to))
            .collect()
    }

    /// Deletes an order and closes the gap it leaves.
    ///
    /// The first segment after the freed block is re-anchored at the point
    /// the removed block departed from, and its start time is recomputed
    /// backwards from its end time. When that segment is a loaded run with
    /// no approach leg, a fresh approach leg is inserted instead.
    pub fn remove(&mut self, order: &OrderId) -> Removal {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|i| &i.order.id == order);
        self.items = kept;
        let Some(first) = removed.first() else {
            return Removal::NotFound;
        };
        let block_start = first.start_time;
        let anchor = first.point_from;
        let block_end = removed
            .iter()
            .map(|i| i.end_time)
            .fold(f64::NEG_INFINITY, f64::max);

        let Some(idx) = self
            .items
            .iter()
            .position(|i| i.start_time >= block_end - self.epsilon)
        else {
            return Removal::Removed { affected: None };
        };

        let next = &mut self.items[idx];
        let affected = next.order.id.clone();
        match next.kind {
            SegmentKind::TravelToPickup => {
                let duration = self.courier.travel_time(&anchor, &next.point_to);
                if duration > self.epsilon {
                    next.point_from = anchor;
                    next.start_time = (next.end_time - duration).max(block_start);
                } else {
                    self.items.remove(idx);
                }
            }
            SegmentKind::LoadedTravel => {
                let duration = self.courier.travel_time(&anchor, &next.point_from);
                if duration > self.epsilon {
                    let approach = ScheduleItem {
                        order: Arc::clone(&next.order),
                        kind: SegmentKind::TravelToPickup,
                        start_time: (next.start_time - duration).max(block_start),
                        end_time: next.start_time,
                        point_from: anchor,
                        point_to: next.point_from,
                        cost: 0.0,
                        params: next.params,
                    };
                    self.items.push(approach);
                    self.sort();
                }
            }
            SegmentKind::Waiting => {}
        }
        debug!(%order, %affected, "removed order, re-anchored following segment");
        let delivery = self.delivery_data(&affected);
        Removal::Removed {
            affected: Some((affected, delivery)),
        }
    }

    /// Deletes an order's segments without touching the rest.
    pub fn detach(&mut self, order: &OrderId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.order.id != order);
        self.items.len() != before
    }

    /// Places an order in the idle gap before the next loaded segment.
    ///
    /// The following order's approach leg is rebuilt to depart from this
    /// order's dropoff. Rejects when the order plus the new approach does not
    /// fit before the following pickup. Behaves like
    /// [`Schedule::try_insert_from`] when nothing follows.
    pub fn try_insert_in_gap(
        &mut self,
        anchor: Point,
        order: &Arc<Order>,
        window: TimeWindow,
        price: f64,
        params: NegotiationParams,
    ) -> bool {
        let follower = self
            .next_loaded(window.from, &HashSet::new())
            .map(|i| i.order.id.clone());
        let mut staged = self.clone();
        if let Some(follower) = &follower {
            staged.drop_approach(follower);
        }
        if !staged.try_insert_from(anchor, order, window, price, params) {
            return false;
        }
        if let Some(follower) = &follower {
            if !staged.restitch(follower, order.dropoff, window.to) {
                debug!(order = %order.id, %follower, "order does not fit in gap");
                return false;
            }
        }
        *self = staged;
        true
    }

    /// Rebuilds `follower`'s approach leg so that it departs from `from` and
    /// arrives exactly at the follower's pickup time. Rejects when a courier
    /// free at `free_at` cannot make the pickup; the schedule is unchanged
    /// in that case.
    pub(crate) fn restitch(&mut self, follower: &OrderId, from: Point, free_at: f64) -> bool {
        let Some(loaded) = self
            .items
            .iter()
            .find(|i| i.kind == SegmentKind::LoadedTravel && &i.order.id == follower)
        else {
            return true;
        };
        let (order, pickup_at, pickup, params) = (
            Arc::clone(&loaded.order),
            loaded.start_time,
            loaded.point_from,
            loaded.params,
        );
        let approach = self.courier.travel_time(&from, &pickup);
        if free_at + approach > pickup_at + self.epsilon {
            debug!(%follower, free_at, approach, pickup_at, "follower unreachable in time");
            return false;
        }
        self.drop_approach(follower);
        if approach > self.epsilon {
            self.items.push(ScheduleItem {
                order,
                kind: SegmentKind::TravelToPickup,
                start_time: pickup_at - approach,
                end_time: pickup_at,
                point_from: from,
                point_to: pickup,
                cost: 0.0,
                params,
            });
            self.sort();
        }
        true
    }

    pub(crate) fn drop_approach(&mut self, order: &OrderId) {
        self.items
            .retain(|i| !(&i.order.id == order && i.kind == SegmentKind::TravelToPickup));
    }

    /// The order whose segments come right after `order`'s.
    #[must_use]
    pub fn follower(&self, order: &OrderId) -> Option<OrderId> {
        let end = self
            .items
            .iter()
            .filter(|i| &i.order.id == order)
            .map(|i| i.end_time)
            .reduce(f64::max)?;
        self.items
            .iter()
            .find(|i| &i.order.id != order && i.start_time >= end - self.epsilon)
            .map(|i| i.order.id.clone())
    }

    /// Candidate offers for carrying `order`.
    ///
    /// Always yields an earliest-available variant appended after the last
    /// commitment, then one variant per loaded segment departing where the
    /// previous loaded segment ended (home at time 0 for the first). Those
    /// are after-existing-order variants, which generally collide with the
    /// segment they precede. With [`VariantSearch::FullGapSearch`] a slot
    /// the order fits into without disturbing the next pickup is offered
    /// as an idle-gap variant instead.
    #[must_use]
    pub fn quote(&self, order: &Order, search: VariantSearch) -> Vec<Variant> {
        let mut variants = vec![self.variant_from(
            order,
            self.last_point(),
            self.last_free_time(),
            Provenance::EarliestAvailable,
        )];

        let mut anchor = (self.courier.home, 0.0);
        for item in self
            .items
            .iter()
            .filter(|i| i.kind == SegmentKind::LoadedTravel)
        {
            let mut variant =
                self.variant_from(order, anchor.0, anchor.1, Provenance::AfterExistingOrder);
            if search == VariantSearch::FullGapSearch && self.fits_before(&variant, order, item) {
                variant.provenance = Provenance::IdleGap;
            }
            variants.push(variant);
            anchor = (item.point_to, item.end_time);
        }
        variants
    }

    /// Forced re-slotting of a committed order: depart from `after` at
    /// `from` and run the order's full route.
    #[must_use]
    pub fn shift_variant(&self, order: &Order, after: Point, from: f64) -> Variant {
        self.variant_from(order, after, from, Provenance::AfterShift)
    }

    fn fits_before(&self, variant: &Variant, order: &Order, next: &ScheduleItem) -> bool {
        let reapproach = self.courier.travel_time(&order.dropoff, &next.point_from);
        variant.window.to + reapproach <= next.start_time + self.epsilon
    }

    /// First loaded segment starting at or after `from`, skipping `except`.
    pub(crate) fn next_loaded(
        &self,
        from: f64,
        except: &HashSet<OrderId>,
    ) -> Option<&ScheduleItem> {
        self.items.iter().find(|i| {
            i.kind == SegmentKind::LoadedTravel
                && i.start_time >= from - self.epsilon
                && !except.contains(&i.order.id)
        })
    }

    fn variant_from(&self, order: &Order, anchor: Point, from: f64, provenance: Provenance) -> Variant {
        let duration = self.courier.travel_time(&anchor, &order.pickup)
            + self.courier.travel_time(&order.pickup, &order.dropoff);
        Variant {
            courier: self.courier.id.clone(),
            order: order.id.clone(),
            window: TimeWindow::new(from, from + duration),
            price: duration * self.courier.rate,
            anchor,
            provenance,
            scores: KpiScores::default(),
            efficiency: 0.0,
        }
    }

    fn sort(&mut self) {
        self.items
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }

    /// Checks ordering and non-overlap of blocking items.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let sorted = self
            .items
            .windows(2)
            .all(|w| w[0].start_time <= w[1].start_time);
        let blocking: Vec<_> = self.items.iter().filter(|i| i.kind.is_blocking()).collect();
        let disjoint = blocking.iter().enumerate().all(|(n, a)| {
            blocking[n + 1..].iter().all(|b| {
                !a.overlaps(b.start_time + self.epsilon, b.end_time - self.epsilon)
                    || b.end_time - b.start_time <= 2.0 * self.epsilon
            })
        });
        sorted && disjoint && self.items.iter().all(|i| i.start_time <= i.end_time)
    }
}
