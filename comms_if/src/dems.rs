//! # Control demands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demands sent to the vehicle at the end of a control cycle.
///
/// Paths are in the vehicle frame at the time the telemetry was sampled, X
/// forwards and Y to the left.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CtrlDems {
    /// Normalised steering demand in [-1, 1].
    #[serde(rename = "steering_angle")]
    pub steering_norm: f64,

    /// Throttle (positive) or brake (negative) demand in [-1, 1].
    pub throttle: f64,

    /// The trajectory predicted by the controller.
    ///
    /// Units: meters
    #[serde(rename = "mpc_path")]
    pub mpc_path_m: Vec<[f64; 2]>,

    /// The reference line the controller is tracking.
    ///
    /// Units: meters
    #[serde(rename = "ref_path")]
    pub ref_path_m: Vec<[f64; 2]>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CtrlDems {
    /// Demands with centred steering and no throttle.
    pub fn safe_default() -> Self {
        Self::default()
    }

    /// True if every number in the demands is finite.
    pub fn is_finite(&self) -> bool {
        self.steering_norm.is_finite()
            && self.throttle.is_finite()
            && self
                .mpc_path_m
                .iter()
                .chain(self.ref_path_m.iter())
                .all(|p| p[0].is_finite() && p[1].is_finite())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_finite() {
        let mut dems = CtrlDems {
            steering_norm: 0.1,
            throttle: 0.4,
            mpc_path_m: vec![[1.0, 0.0], [2.0, 0.1]],
            ref_path_m: vec![[2.5, 0.0]],
        };
        assert!(dems.is_finite());

        dems.mpc_path_m[1][1] = f64::NAN;
        assert!(!dems.is_finite());

        assert!(CtrlDems::safe_default().is_finite());
    }
}
