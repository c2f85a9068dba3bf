//! # dispatch-agent
//!
//! Decentralized courier dispatch by negotiation.
//!
//! Each courier and each order is represented by an agent running as its
//! own tokio task. Agents never share mutable state; they exchange
//! [`Message`]s through per-agent inboxes:
//!
//! 1. An order sends a price request to every courier able to carry it.
//! 2. Each courier answers with [`Variant`](dispatch_schedule::Variant)s
//!    computed from its schedule.
//! 3. The order ranks the variants and asks the best courier to commit.
//! 4. If committing would collide with orders the courier already carries,
//!    the courier proposes forced shifts to those orders and commits only
//!    if the batch strictly improves their total efficiency.
//!
//! The [`Dispatcher`] spawns and removes agents and answers queries. Use
//! [`Dispatcher::settle`] to wait until negotiation has quiesced.
//!
//! ```no_run
//! use dispatch_agent::Dispatcher;
//! use dispatch_core::{Courier, CourierId, DispatchConfig, Order, OrderId, Point};
//!
//! # async fn example() -> dispatch_agent::Result<()> {
//! let dispatcher = Dispatcher::new(DispatchConfig::default());
//! dispatcher.add_courier(
//!     Courier::builder(CourierId::new("1"), "Orlov")
//!         .cargo_types(["food"])
//!         .build()
//!         .expect("valid courier"),
//! )?;
//! dispatcher.add_order(
//!     Order::builder(OrderId::new("10"), "soup")
//!         .route(Point::new(0.0, 0.0), Point::new(10.0, 0.0))
//!         .cargo_type("food")
//!         .price(20.0)
//!         .build()
//!         .expect("valid order"),
//! )?;
//! dispatcher.settle().await;
//! let records = dispatcher.export_schedules().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod courier;
mod displacement;
pub mod directory;
pub mod error;
pub mod kpi;
pub mod message;
pub mod order;
pub mod runtime;
pub mod scene;
pub mod system;

pub use courier::CourierAgent;
pub use directory::Directory;
pub use error::{AgentError, DirectoryError, KpiError, Result};
pub use message::{InitPayload, Letter, Message, MessageKind};
pub use order::{OrderAgent, OrderPhase, OrderStatus, rank};
pub use runtime::{Agent, AgentAddress, AgentContext, HandlerTable, Tracker};
pub use scene::Scene;
pub use system::Dispatcher;
