//! # dispatch-schedule
//!
//! The per-courier schedule engine.
//!
//! A [`Schedule`] is an ordered sequence of timed, geo-located
//! [`ScheduleItem`]s. Items are sorted by start time and, ignoring
//! [`SegmentKind::Waiting`] items, never overlap. The engine offers:
//!
//! - **Insertion** - [`Schedule::try_insert`] appends an order after the
//!   courier's last commitment; [`Schedule::try_insert_from`] places it in a
//!   gap from an explicit departure point. Both reject infeasible windows
//!   and leave the schedule untouched on rejection.
//! - **Conflicts** - [`Schedule::conflicts`] lists blocking items overlapping
//!   a window.
//! - **Removal** - [`Schedule::remove`] deletes an order and closes the gap
//!   by re-anchoring the next segment.
//! - **Quotes** - [`Schedule::quote`] enumerates candidate [`Variant`]s.
//! - **Shift planning** - [`Schedule::plan_shifts`] computes the cascade of
//!   forced re-slottings a new window would cause.
//!
//! ```text
//!  time ─────────────────────────────────────────────▶
//!  │ travel-to-pickup │ loaded-travel │ waiting │ travel … │ loaded … │
//!  └──── order A ─────────────────────────────────┘└──── order B ───┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod export;
pub mod schedule;
pub mod segment;
pub mod shift;
pub mod variant;

pub use export::ScheduleRecord;
pub use schedule::{Removal, Schedule};
pub use segment::{NegotiationParams, ScheduleItem, SegmentKind};
pub use shift::ShiftPlan;
pub use variant::{KpiScores, Provenance, Variant};
