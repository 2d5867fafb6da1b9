#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core feeder logic (hardware-agnostic).
//!
//! This crate turns a line transport to a G-code motion controller into a
//! scheduled can-opening machine. All hardware interactions go through
//! `feeder_traits::LineWriter`/`LineReader` and `feeder_traits::ButtonPad`.
//!
//! ## Architecture
//!
//! - **Protocol**: response-line classification and the controller state
//!   machine (`protocol` module)
//! - **Link**: serial session plus background reader thread (`link`,
//!   `reader` modules)
//! - **Sequencer**: phased dispense/eject/startup motion (`sequencer`)
//! - **Schedule**: interval and daily feed triggers (`schedule`)
//! - **Buttons**: debounced edge detection (`buttons`)
//! - **Engine**: the orchestrator driven once per main-loop cycle
//!   (`engine`), persisting state through the `snapshot::StateSink` seam

pub mod buttons;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod link;
pub mod mocks;
pub mod protocol;
pub mod reader;
pub mod schedule;
pub mod sequencer;
pub mod snapshot;

pub use engine::{Engine, FAN_CHANNELS, FAN_COOLDOWN_SECS};
pub use error::FeederError;
pub use geometry::Geometry;
pub use link::MotionLink;
pub use protocol::{Axis, ControllerState, LinkEvent, Position};
pub use schedule::{FeedScheduler, ScheduleMode};
pub use sequencer::{DispensePhase, DispenseSequencer, TickOutcome};
pub use snapshot::{NullSink, Snapshot, StateSink};
