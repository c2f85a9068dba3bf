//! Scenario import and schedule export.
//!
//! A scenario is a JSON document with `couriers` and `orders` arrays. Record
//! fields mirror the import columns: cargo types are a single
//! semicolon-separated string, coordinates are flat `x`/`y` pairs.

use std::path::Path;

use chrono::{DateTime, Utc};
use dispatch_agent::{Dispatcher, OrderPhase};
use dispatch_core::{
    Courier, CourierId, DeliveryData, Order, OrderId, Point, TimeWindow,
};
use dispatch_schedule::ScheduleRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

const fn one() -> f64 {
    1.0
}

/// A courier as it appears in a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierRecord {
    /// Identity.
    pub id: String,
    /// Display name; the id when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Home x coordinate.
    #[serde(default)]
    pub x: f64,
    /// Home y coordinate.
    #[serde(default)]
    pub y: f64,
    /// Accepted cargo types, separated by `;`.
    #[serde(default)]
    pub cargo_types: String,
    /// Fixed cost of bringing the courier on shift.
    #[serde(default)]
    pub activation_cost: f64,
    /// Price per time unit.
    #[serde(default = "one")]
    pub rate: f64,
    /// Distance per time unit.
    #[serde(default = "one")]
    pub velocity: f64,
    /// Volume capacity; unlimited when absent.
    #[serde(default)]
    pub max_volume: Option<f64>,
    /// Mass capacity; unlimited when absent.
    #[serde(default)]
    pub max_mass: Option<f64>,
}

impl CourierRecord {
    /// Builds the validated courier entity.
    pub fn to_courier(&self) -> Result<Courier> {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let courier = Courier::builder(CourierId::new(self.id.clone()), name)
            .home(Point::new(self.x, self.y))
            .cargo_types(parse_cargo_types(&self.cargo_types))
            .activation_cost(self.activation_cost)
            .rate(self.rate)
            .velocity(self.velocity)
            .max_volume(self.max_volume.unwrap_or(f64::INFINITY))
            .max_mass(self.max_mass.unwrap_or(f64::INFINITY))
            .build()?;
        Ok(courier)
    }
}

/// An order as it appears in a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Identity.
    pub id: String,
    /// Display name; the id when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Mass.
    #[serde(default)]
    pub weight: f64,
    /// Volume.
    #[serde(default)]
    pub volume: f64,
    /// Price ceiling.
    pub price: f64,
    /// Pickup x coordinate.
    pub pickup_x: f64,
    /// Pickup y coordinate.
    pub pickup_y: f64,
    /// Dropoff x coordinate.
    pub dropoff_x: f64,
    /// Dropoff y coordinate.
    pub dropoff_y: f64,
    /// Desired pickup time.
    #[serde(default)]
    pub desired_from: Option<f64>,
    /// Desired delivery time.
    #[serde(default)]
    pub desired_to: Option<f64>,
    /// Cargo type.
    #[serde(default)]
    pub cargo_type: String,
}

impl OrderRecord {
    /// Builds the validated order entity.
    pub fn to_order(&self) -> Result<Order> {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let mut builder = Order::builder(OrderId::new(self.id.clone()), name)
            .route(
                Point::new(self.pickup_x, self.pickup_y),
                Point::new(self.dropoff_x, self.dropoff_y),
            )
            .size(self.weight, self.volume)
            .cargo_type(self.cargo_type.trim())
            .price(self.price);
        if let (Some(from), Some(to)) = (self.desired_from, self.desired_to) {
            builder = builder.desired_window(TimeWindow::new(from, to));
        }
        Ok(builder.build()?)
    }
}

/// Splits a `;`-separated cargo type list, dropping blanks.
pub fn parse_cargo_types(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Couriers and orders to negotiate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Courier records.
    pub couriers: Vec<CourierRecord>,
    /// Order records.
    pub orders: Vec<OrderRecord>,
}

impl Scenario {
    /// Reads a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let scenario = Self::from_json(&content)?;
        debug!(
            path = %path.as_ref().display(),
            couriers = scenario.couriers.len(),
            orders = scenario.orders.len(),
            "loaded scenario"
        );
        Ok(scenario)
    }

    /// Parses a scenario document.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Validated courier entities, in file order.
    pub fn couriers(&self) -> Result<Vec<Courier>> {
        self.couriers.iter().map(CourierRecord::to_courier).collect()
    }

    /// Validated order entities, in file order.
    pub fn orders(&self) -> Result<Vec<Order>> {
        self.orders.iter().map(OrderRecord::to_order).collect()
    }
}

/// Final negotiation state of one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    /// Order id.
    pub id: OrderId,
    /// Negotiation phase.
    pub phase: OrderPhase,
    /// Confirmed delivery data.
    pub delivery: DeliveryData,
}

/// Everything written to the result file.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleExport {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Flat schedule records of every courier.
    pub records: Vec<ScheduleRecord>,
    /// Per-order outcome.
    pub orders: Vec<OrderSummary>,
}

impl ScheduleExport {
    /// Snapshots the schedules and order states of a settled system.
    pub async fn collect(dispatcher: &Dispatcher) -> Self {
        let records = dispatcher.export_schedules().await;
        let mut orders = Vec::new();
        for order in dispatcher.scene().orders() {
            match dispatcher.order_status(&order.id).await {
                Ok(status) => orders.push(OrderSummary {
                    id: status.order,
                    phase: status.phase,
                    delivery: status.delivery,
                }),
                Err(err) => warn!(order = %order.id, error = %err, "order status unavailable"),
            }
        }
        Self {
            generated_at: Utc::now(),
            records,
            orders,
        }
    }

    /// Number of orders a courier has committed to.
    #[must_use]
    pub fn placed(&self) -> usize {
        self.orders
            .iter()
            .filter(|o| o.delivery.is_assigned())
            .count()
    }

    /// Writes the export as pretty JSON.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
