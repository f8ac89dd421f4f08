//! # MPC control module
//!
//! MPC control computes the steering and throttle demands which keep the vehicle on the
//! reference path. Each cycle:
//!
//! 1. The telemetry's waypoints are moved into the vehicle frame and a cubic reference
//!    polynomial is fitted to them.
//! 2. The vehicle's state (including cross track and heading errors) is built in the vehicle
//!    frame and, if configured, predicted forward across the actuation latency.
//! 3. A nonlinear program over a fixed horizon of kinematic bicycle model steps is solved,
//!    trading off tracking errors, speed error and actuator effort.
//! 4. The first free actuation is normalised and sent, together with the predicted and
//!    reference paths.
//!
//! Any failure along the way results in the configured fallback demands rather than a partial
//! result.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod bounds;
mod fg_eval;
mod layout;
mod optimizer;
mod params;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::tlm::TlmError;

use crate::nlp::{NlpError, SolveStatus};
use crate::poly::FitError;

pub use bounds::build_bounds;
pub use fg_eval::MpcProblem;
pub use layout::VarLayout;
pub use optimizer::{Trajectory, TrajectoryOptimizer};
pub use params::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur during one control cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MpcError {
    #[error("Invalid telemetry: {0}")]
    InvalidTelemetry(#[from] TlmError),

    #[error("Cannot fit the reference path: {0}")]
    Fit(#[from] FitError),

    #[error("Inconsistent solver inputs: {0}")]
    Nlp(#[from] NlpError),

    #[error(
        "The solve did not converge ({status:?}) after {iterations} iterations in {solve_time_s:.3} s"
    )]
    NotConverged {
        status: SolveStatus,
        iterations: usize,
        solve_time_s: f64,
    },

    #[error("The initial state is not finite: {0:?}")]
    NonFiniteState([f64; crate::model::NUM_STATES]),

    #[error("The solution contains non-finite values")]
    NonFiniteSolution,
}

/// Errors in the controller's configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`{name}` must be at least {min}, found {value}")]
    TooSmall {
        name: &'static str,
        value: usize,
        min: usize,
    },

    #[error("`{name}` must be positive and finite, found {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Weight `{name}` must be non-negative and finite, found {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("`{name}` must be in (0, 1], found {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("The bounds do not match the problem layout: {0}")]
    BoundsMismatch(NlpError),

    #[error("Invalid solver options: {0}")]
    Solver(NlpError),
}
