//! # Vehicle telemetry

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One telemetry frame from the vehicle.
///
/// Positions and heading are in the world frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Telemetry {
    /// Vehicle position along the world X axis.
    ///
    /// Units: meters
    #[serde(rename = "x")]
    pub x_m: f64,

    /// Vehicle position along the world Y axis.
    ///
    /// Units: meters
    #[serde(rename = "y")]
    pub y_m: f64,

    /// Vehicle heading, the angle from the world X axis.
    ///
    /// Units: radians
    #[serde(rename = "psi")]
    pub psi_rad: f64,

    /// Vehicle speed.
    ///
    /// Units: meters/second (or whatever unit the reference speed is given in)
    #[serde(rename = "speed")]
    pub speed_ms: f64,

    /// World X coordinates of the upcoming waypoints, closest first.
    #[serde(rename = "ptsx")]
    pub ptsx_m: Vec<f64>,

    /// World Y coordinates of the upcoming waypoints, closest first.
    #[serde(rename = "ptsy")]
    pub ptsy_m: Vec<f64>,

    /// The normalised steering demand currently applied, in [-1, 1].
    #[serde(rename = "steering_angle")]
    pub steering_norm: f64,

    /// The throttle demand currently applied, in [-1, 1].
    pub throttle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a telemetry frame can be rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TlmError {
    #[error("Waypoint lists have different lengths (x: {ptsx}, y: {ptsy})")]
    MismatchedWaypoints { ptsx: usize, ptsy: usize },

    #[error("Expected at least {min} waypoints, found {found}")]
    TooFewWaypoints { found: usize, min: usize },

    #[error("Telemetry field `{0}` is not finite")]
    NonFinite(&'static str),

    #[error("Applied actuation `{0}` is outside of [-1, 1]")]
    ActuationOutOfRange(&'static str),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Telemetry {
    /// Check that the frame can safely be used to build a control problem.
    ///
    /// `min_waypoints` is the smallest number of waypoints the consumer can
    /// work with.
    pub fn validate(&self, min_waypoints: usize) -> Result<(), TlmError> {
        if self.ptsx_m.len() != self.ptsy_m.len() {
            return Err(TlmError::MismatchedWaypoints {
                ptsx: self.ptsx_m.len(),
                ptsy: self.ptsy_m.len(),
            });
        }

        if self.ptsx_m.len() < min_waypoints {
            return Err(TlmError::TooFewWaypoints {
                found: self.ptsx_m.len(),
                min: min_waypoints,
            });
        }

        let scalars = [
            ("x", self.x_m),
            ("y", self.y_m),
            ("psi", self.psi_rad),
            ("speed", self.speed_ms),
            ("steering_angle", self.steering_norm),
            ("throttle", self.throttle),
        ];
        for (name, value) in scalars.iter() {
            if !value.is_finite() {
                return Err(TlmError::NonFinite(name));
            }
        }

        if self.ptsx_m.iter().any(|p| !p.is_finite()) {
            return Err(TlmError::NonFinite("ptsx"));
        }
        if self.ptsy_m.iter().any(|p| !p.is_finite()) {
            return Err(TlmError::NonFinite("ptsy"));
        }

        if self.steering_norm.abs() > 1.0 {
            return Err(TlmError::ActuationOutOfRange("steering_angle"));
        }
        if self.throttle.abs() > 1.0 {
            return Err(TlmError::ActuationOutOfRange("throttle"));
        }

        Ok(())
    }

    /// Iterate over the waypoints as `(x, y)` pairs.
    pub fn waypoints(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.ptsx_m.iter().copied().zip(self.ptsy_m.iter().copied())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
