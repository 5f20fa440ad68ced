//! Stepper kinematics for polar printers.
//!
//! A polar machine drives a rotating bed (angle) and a radial arm (radius).
//! This crate turns queued Cartesian moves into the position of each of
//! those axes over time and searches for the instants where a stepper has
//! to pulse.
//!
//! This crate intentionally avoids any transport- or MCU-specific
//! dependencies.

pub mod itersolve;
pub mod kinematics;
pub mod step_sink;
pub mod trap_queue;
