//! Courier and order entities.
//!
//! Entities carry the static attributes supplied at import time. Negotiated
//! state (a courier's schedule, an order's [`DeliveryData`]) is owned by the
//! agent bound to the entity, never by the entity itself.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geo::Point;
use crate::ids::{CourierId, OrderId};

/// A closed time interval `[from, to]` in simulation time units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window.
    pub from: f64,
    /// End of the window.
    pub to: f64,
}

impl TimeWindow {
    /// Creates a window.
    #[must_use]
    pub const fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.to - self.from
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Where and when an order is delivered, as last confirmed by a courier.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryData {
    /// No courier has committed to the order.
    #[default]
    Unassigned,
    /// A courier has the order in its schedule.
    Assigned {
        /// Courier carrying the order.
        courier: CourierId,
        /// Committed price.
        price: f64,
        /// Committed delivery window.
        window: TimeWindow,
    },
}

impl DeliveryData {
    /// Returns true if a courier has committed to the order.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }

    /// The committed courier, if any.
    #[must_use]
    pub const fn courier(&self) -> Option<&CourierId> {
        match self {
            Self::Assigned { courier, .. } => Some(courier),
            Self::Unassigned => None,
        }
    }

    /// The committed price, if any.
    #[must_use]
    pub const fn price(&self) -> Option<f64> {
        match self {
            Self::Assigned { price, .. } => Some(*price),
            Self::Unassigned => None,
        }
    }
}

/// Why a courier cannot carry an order at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    /// Order is heavier than the courier's load limit.
    Mass,
    /// Order is larger than the courier's bag.
    Volume,
    /// Courier does not carry this cargo type.
    CargoType,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mass => f.write_str("mass exceeds capacity"),
            Self::Volume => f.write_str("volume exceeds capacity"),
            Self::CargoType => f.write_str("cargo type not accepted"),
        }
    }
}

/// A courier: a moving resource with a home point, a speed and capacities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Courier {
    /// Stable identity.
    pub id: CourierId,
    /// Display name.
    pub name: String,
    /// Starting position.
    pub home: Point,
    /// Distance units covered per time unit.
    pub velocity: f64,
    /// Price per time unit of work.
    pub rate: f64,
    /// Fixed cost of bringing the courier on shift.
    pub activation_cost: f64,
    /// Largest order mass the courier can carry.
    pub max_mass: f64,
    /// Largest order volume the courier can carry.
    pub max_volume: f64,
    /// Cargo types the courier accepts.
    pub cargo_types: BTreeSet<String>,
}

impl Courier {
    /// Starts building a courier.
    #[must_use]
    pub fn builder(id: CourierId, name: impl Into<String>) -> CourierBuilder {
        CourierBuilder::new(id, name)
    }

    /// Returns true if the courier carries `cargo_type`.
    #[must_use]
    pub fn accepts_type(&self, cargo_type: &str) -> bool {
        self.cargo_types.contains(cargo_type)
    }

    /// Time needed to travel between two points at this courier's velocity.
    #[must_use]
    pub fn travel_time(&self, from: &Point, to: &Point) -> f64 {
        from.distance_to(to) / self.velocity
    }

    /// Checks the order against mass, volume and cargo type.
    pub fn check_eligibility(&self, order: &Order) -> std::result::Result<(), Ineligibility> {
        if order.weight > self.max_mass {
            return Err(Ineligibility::Mass);
        }
        if order.volume > self.max_volume {
            return Err(Ineligibility::Volume);
        }
        if !self.accepts_type(&order.cargo_type) {
            return Err(Ineligibility::CargoType);
        }
        Ok(())
    }
}

impl fmt::Display for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "courier {}", self.name)
    }
}

/// Builder for [`Courier`].
#[derive(Debug, Clone)]
pub struct CourierBuilder {
    courier: Courier,
}

impl CourierBuilder {
    fn new(id: CourierId, name: impl Into<String>) -> Self {
        Self {
            courier: Courier {
                id,
                name: name.into(),
                home: Point::default(),
                velocity: 1.0,
                rate: 1.0,
                activation_cost: 0.0,
                max_mass: f64::INFINITY,
                max_volume: f64::INFINITY,
                cargo_types: BTreeSet::new(),
            },
        }
    }

    /// Sets the home point.
    #[must_use]
    pub const fn home(mut self, home: Point) -> Self {
        self.courier.home = home;
        self
    }

    /// Sets the velocity.
    #[must_use]
    pub const fn velocity(mut self, velocity: f64) -> Self {
        self.courier.velocity = velocity;
        self
    }

    /// Sets the price per time unit.
    #[must_use]
    pub const fn rate(mut self, rate: f64) -> Self {
        self.courier.rate = rate;
        self
    }

    /// Sets the activation cost.
    #[must_use]
    pub const fn activation_cost(mut self, cost: f64) -> Self {
        self.courier.activation_cost = cost;
        self
    }

    /// Sets the mass capacity.
    #[must_use]
    pub const fn max_mass(mut self, mass: f64) -> Self {
        self.courier.max_mass = mass;
        self
    }

    /// Sets the volume capacity.
    #[must_use]
    pub const fn max_volume(mut self, volume: f64) -> Self {
        self.courier.max_volume = volume;
        self
    }

    /// Sets the accepted cargo types.
    #[must_use]
    pub fn cargo_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.courier.cargo_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Validates and returns the courier.
    pub fn build(self) -> Result<Courier> {
        let c = self.courier;
        if !(c.velocity.is_finite() && c.velocity > 0.0) {
            return Err(invalid("courier", "velocity", "must be a positive number"));
        }
        if !(c.rate.is_finite() && c.rate >= 0.0) {
            return Err(invalid("courier", "rate", "must be a non-negative number"));
        }
        if c.max_mass.is_nan() || c.max_mass < 0.0 {
            return Err(invalid("courier", "max_mass", "must not be negative"));
        }
        if c.max_volume.is_nan() || c.max_volume < 0.0 {
            return Err(invalid("courier", "max_volume", "must not be negative"));
        }
        Ok(c)
    }
}

/// An order: a parcel to move from a pickup point to a dropoff point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Stable identity.
    pub id: OrderId,
    /// Display name.
    pub name: String,
    /// Where the parcel is collected.
    pub pickup: Point,
    /// Where the parcel is delivered.
    pub dropoff: Point,
    /// Parcel mass.
    pub weight: f64,
    /// Parcel volume.
    pub volume: f64,
    /// Cargo type the courier must accept.
    pub cargo_type: String,
    /// Price ceiling the customer is willing to pay.
    pub price: f64,
    /// Requested pickup/delivery window from the import record.
    pub desired_window: Option<TimeWindow>,
}

impl Order {
    /// Starts building an order.
    #[must_use]
    pub fn builder(id: OrderId, name: impl Into<String>) -> OrderBuilder {
        OrderBuilder::new(id, name)
    }

    /// Length of the loaded leg.
    #[must_use]
    pub fn loaded_distance(&self) -> f64 {
        self.pickup.distance_to(&self.dropoff)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {}", self.name)
    }
}

/// Builder for [`Order`].
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    order: Order,
}

impl OrderBuilder {
    fn new(id: OrderId, name: impl Into<String>) -> Self {
        Self {
            order: Order {
                id,
                name: name.into(),
                pickup: Point::default(),
                dropoff: Point::default(),
                weight: 0.0,
                volume: 0.0,
                cargo_type: String::new(),
                price: 0.0,
                desired_window: None,
            },
        }
    }

    /// Sets the pickup and dropoff points.
    #[must_use]
    pub const fn route(mut self, pickup: Point, dropoff: Point) -> Self {
        self.order.pickup = pickup;
        self.order.dropoff = dropoff;
        self
    }

    /// Sets mass and volume.
    #[must_use]
    pub const fn size(mut self, weight: f64, volume: f64) -> Self {
        self.order.weight = weight;
        self.order.volume = volume;
        self
    }

    /// Sets the cargo type.
    #[must_use]
    pub fn cargo_type(mut self, cargo_type: impl Into<String>) -> Self {
        self.order.cargo_type = cargo_type.into();
        self
    }

    /// Sets the price ceiling.
    #[must_use]
    pub const fn price(mut self, price: f64) -> Self {
        self.order.price = price;
        self
    }

    /// Sets the desired window.
    #[must_use]
    pub const fn desired_window(mut self, window: TimeWindow) -> Self {
        self.order.desired_window = Some(window);
        self
    }

    /// Validates and returns the order.
    pub fn build(self) -> Result<Order> {
        let o = self.order;
        if !o.price.is_finite() {
            return Err(invalid("order", "price", "must be a finite number"));
        }
        if !(o.weight.is_finite() && o.weight >= 0.0) {
            return Err(invalid("order", "weight", "must be a non-negative number"));
        }
        if !(o.volume.is_finite() && o.volume >= 0.0) {
            return Err(invalid("order", "volume", "must be a non-negative number"));
        }
        Ok(o)
    }
}

fn invalid(entity: &'static str, field: &'static str, reason: &str) -> CoreError {
    CoreError::InvalidAttribute {
        entity,
        field,
        reason: reason.to_string(),
    }
}
