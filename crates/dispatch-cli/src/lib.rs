//! # dispatch-cli
//!
//! Command-line driver for the courier dispatch negotiation system.
//!
//! `dispatch run --scenario city.json` spawns an agent per courier and
//! order, waits for the negotiation to settle and exports every courier's
//! schedule as JSON. With `--interactive` it then reads commands from
//! stdin:
//!
//! ```text
//! add-courier {"id":"9","x":0,"y":0,"cargo_types":"food;parcel"}
//! add-order {"id":"o7","price":25,"pickup_x":1,"pickup_y":1,"dropoff_x":4,"dropoff_y":5}
//! remove order:o7
//! list
//! export
//! quit
//! ```
//!
//! Every add or remove is followed by a settle and a fresh export.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod command;
pub mod error;
pub mod scenario;
pub mod session;

pub use command::Command;
pub use error::{CliError, Result};
pub use scenario::{CourierRecord, OrderRecord, OrderSummary, Scenario, ScheduleExport};
pub use session::{Flow, Session};
