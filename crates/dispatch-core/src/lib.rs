//! # dispatch-core
//!
//! Shared primitives for the courier dispatch negotiation system.
//!
//! This crate provides:
//!
//! - [`Point`] - plane coordinates with Euclidean distance
//! - [`CourierId`], [`OrderId`], [`EntityRef`] - stable entity identities
//! - [`Courier`] and [`Order`] - static entity profiles
//! - [`DeliveryData`] - the negotiated placement of an order
//! - [`DispatchConfig`] - tolerances and negotiation policies
//!
//! ## Example
//!
//! ```rust
//! use dispatch_core::{Courier, CourierId, Point};
//!
//! let courier = Courier::builder(CourierId::new("7"), "Ivanov")
//!     .home(Point::new(0.0, 0.0))
//!     .velocity(2.0)
//!     .rate(1.5)
//!     .cargo_types(["food", "parcel"])
//!     .build()
//!     .expect("valid courier");
//!
//! assert!(courier.accepts_type("food"));
//! assert_eq!(courier.travel_time(&Point::new(0.0, 0.0), &Point::new(4.0, 0.0)), 2.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod entity;
pub mod error;
pub mod geo;
pub mod ids;

pub use config::{
    DEFAULT_EPSILON, DEFAULT_MAX_QUOTE_ROUNDS, DEFAULT_MAX_SHIFT_CHAIN, DispatchConfig,
    DisplacementRule, VariantSearch,
};
pub use entity::{
    Courier, CourierBuilder, DeliveryData, Ineligibility, Order, OrderBuilder, TimeWindow,
};
pub use error::{CoreError, Result};
pub use geo::Point;
pub use ids::{CourierId, EntityRef, OrderId};
