//! powermon-control — the power-management control loop.
//!
//! # Architecture
//!
//! ```text
//! Scheduler (fixed interval, one tick at a time)
//!   ├── TelemetrySource::sample()        error → tick skipped
//!   ├── HysteresisController::tick(v)    owned state, no locks
//!   └── FleetController::set_all(action) detached, never awaited
//! ```
//!
//! Controller state is owned by the scheduler and only touched inside
//! a tick; dispatch tasks never see it.

pub mod hysteresis;
pub mod scheduler;

pub use hysteresis::{ControllerState, HysteresisController};
pub use scheduler::{LoopStats, Scheduler, TickReport};
