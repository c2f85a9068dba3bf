//! Flat, read-only export of a schedule.

use serde::Serialize;

use crate::schedule::Schedule;
use crate::segment::{ScheduleItem, SegmentKind};

/// One exported segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRecord {
    /// Courier id.
    pub resource_id: String,
    /// Courier name.
    pub resource_name: String,
    /// Order id.
    pub task_id: String,
    /// Order name.
    pub task_name: String,
    /// Segment kind.
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    /// Departure point, rendered as `(x; y)`.
    pub from: String,
    /// Arrival point, rendered as `(x; y)`.
    pub to: String,
    /// Start time.
    pub start_time: f64,
    /// End time.
    pub end_time: f64,
    /// Segment cost.
    pub cost: f64,
}

impl Schedule {
    /// The schedule as flat records, sorted by `(start_time, end_time)`.
    ///
    /// When the first segment starts after time 0, a waiting record at the
    /// courier's home point covers the initial idle time. It is attributed
    /// to the order of the first segment.
    #[must_use]
    pub fn records(&self) -> Vec<ScheduleRecord> {
        let courier = self.courier();
        let record = |item: &ScheduleItem, kind, from, to, start_time, end_time, cost| ScheduleRecord {
            resource_id: courier.id.to_string(),
            resource_name: courier.name.clone(),
            task_id: item.order.id.to_string(),
            task_name: item.order.name.clone(),
            kind,
            from,
            to,
            start_time,
            end_time,
            cost,
        };

        let mut records = Vec::with_capacity(self.items().len() + 1);
        if let Some(first) = self.items().first() {
            if first.start_time != 0.0 {
                let home = courier.home.to_string();
                records.push(record(
                    first,
                    SegmentKind::Waiting,
                    home.clone(),
                    home,
                    0.0,
                    first.start_time,
                    0.0,
                ));
            }
        }
        records.extend(self.items().iter().map(|item| {
            record(
                item,
                item.kind,
                item.point_from.to_string(),
                item.point_to.to_string(),
                item.start_time,
                item.end_time,
                item.cost,
            )
        }));
        records.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then(a.end_time.total_cmp(&b.end_time))
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dispatch_core::{
        Courier, CourierId, DEFAULT_EPSILON, Order, OrderId, Point, TimeWindow,
    };

    use super::*;
    use crate::segment::NegotiationParams;
    use crate::variant::Provenance;

    fn schedule() -> Schedule {
        let courier = Courier::builder(CourierId::new("7"), "Ivanov")
            .home(Point::new(1.0, 1.0))
            .build()
            .expect("valid courier");
        Schedule::new(courier, DEFAULT_EPSILON)
    }

    fn order() -> Arc<Order> {
        Arc::new(
            Order::builder(OrderId::new("12"), "flowers")
                .route(Point::new(1.0, 4.0), Point::new(1.0, 6.0))
                .price(10.0)
                .build()
                .expect("valid order"),
        )
    }

    #[test]
    fn empty_schedule_exports_nothing() {
        assert!(schedule().records().is_empty());
    }

    #[test]
    fn records_mirror_segments() {
        let mut s = schedule();
        let params = NegotiationParams::new(Provenance::EarliestAvailable, 5.0);
        assert!(s.try_insert(&order(), TimeWindow::new(0.0, 5.0), 5.0, params));

        let records = s.records();
        assert_eq!(records.len(), 2);
        let loaded = &records[1];
        assert_eq!(loaded.resource_id, "7");
        assert_eq!(loaded.resource_name, "Ivanov");
        assert_eq!(loaded.task_id, "12");
        assert_eq!(loaded.task_name, "flowers");
        assert_eq!(loaded.kind, SegmentKind::LoadedTravel);
        assert_eq!(loaded.from, "(1; 4)");
        assert_eq!(loaded.to, "(1; 6)");
        assert_eq!((loaded.start_time, loaded.end_time, loaded.cost), (3.0, 5.0, 5.0));
    }

    #[test]
    fn late_start_gets_leading_waiting_record() {
        let mut s = schedule();
        let params = NegotiationParams::new(Provenance::EarliestAvailable, 5.0);
        assert!(s.try_insert(&order(), TimeWindow::new(4.0, 9.0), 5.0, params));
        let before = s.clone();

        let records = s.records();
        assert_eq!(records.len(), 3);
        let idle = &records[0];
        assert_eq!(idle.kind, SegmentKind::Waiting);
        assert_eq!(idle.from, "(1; 1)");
        assert_eq!(idle.to, "(1; 1)");
        assert_eq!((idle.start_time, idle.end_time), (0.0, 4.0));
        assert_eq!(idle.task_id, "12");
        assert_eq!(s, before);
    }

    #[test]
    fn records_serialize_with_type_field() {
        let mut s = schedule();
        let params = NegotiationParams::new(Provenance::EarliestAvailable, 5.0);
        assert!(s.try_insert(&order(), TimeWindow::new(0.0, 5.0), 5.0, params));
        let json = serde_json::to_value(&s.records()[0]).expect("serialize");
        assert_eq!(json["type"], "travel-to-pickup");
        assert_eq!(json["from"], "(1; 1)");
    }
}
