//! Chassis power sequencing for an x86 embedded controller: the G3/S5/S3/S0
//! state machine, the power button machine in front of the PCH, and the
//! host-facing pieces around them.
//!
//! Everything here is hardware independent. Time comes in as
//! [`embassy_time::Instant`] arguments and pins are reached through the
//! traits in [`board`], so the machines run unchanged in host tests.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// must go first so the other modules see its macros
mod fmt;

pub mod board;
pub mod cause;
pub mod config;
pub mod host_cmd;
pub mod policy;
pub mod power;
pub mod power_button;
pub mod sequence;
pub mod signals;
pub mod thermal;
pub mod timer;
pub mod watchdog;

pub use board::{CauseLog, Hook, Level, PowerBoard, PowerButtonBoard, Rail};
pub use cause::{Cause, CauseRecord, ShutdownCause, WakeupCause};
pub use power::{ChipsetState, PowerRequest, PowerSequencer, PowerState};
pub use power_button::{ButtonInputs, ButtonState, PowerButton, Timeout, release_progress};
pub use signals::PowerSignals;
pub use thermal::ThermalGuard;
