//! # MPC library.
//!
//! This library allows other crates in the workspace, the benches and the simulation executable to
//! access items defined inside the MPC crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Frame conversions - moves waypoints from the world frame into the vehicle frame
pub mod frame;

/// Latency compensation - predicts the vehicle state across the actuation delay
pub mod latency;

/// Kinematic bicycle model shared by the optimiser and the latency compensation
pub mod model;

/// MPC control module - converts telemetry into steering and throttle demands
pub mod mpc_ctrl;

/// Nonlinear program interfaces and the SQP solver
pub mod nlp;

/// Reference polynomial fitting and evaluation
pub mod poly;

/// Simulated vehicle used by the executable and the benches
pub mod sim;
