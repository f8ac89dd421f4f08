//! # Latency compensation
//!
//! Demands reach the actuators some time after the telemetry they were computed from was
//! sampled. The compensator predicts where the vehicle will be when the new demand takes effect
//! by applying one model update over the latency with the actuation currently in effect.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::model::{Actuation, BicycleModel, VehicleState};
use crate::poly::RefPoly;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Predicts the vehicle state across the actuation delay.
#[derive(Debug, Clone, Copy)]
pub struct LatencyCompensator {
    model: BicycleModel,

    /// Units: seconds
    latency_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl LatencyCompensator {
    pub fn new(model: BicycleModel, latency_s: f64) -> Self {
        Self { model, latency_s }
    }

    pub fn latency_s(&self) -> f64 {
        self.latency_s
    }

    /// The state after `applied` has acted for the latency duration.
    pub fn predict(
        &self,
        state: &VehicleState,
        applied: &Actuation,
        poly: &RefPoly,
    ) -> VehicleState {
        self.model.step(state, applied, poly, self.latency_s)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_matches_single_model_step() {
        let model = BicycleModel::new(2.67);
        let poly = RefPoly::from_coeffs([0.4, 0.05, -0.01, 0.0002]);
        let comp = LatencyCompensator::new(model, 0.1);

        let state = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 20.0,
            cte: 0.4,
            epsi: -0.05,
        };
        let applied = Actuation { delta: -0.1, a: 0.5 };

        let predicted = comp.predict(&state, &applied, &poly);
        let direct = model.step(&state, &applied, &poly, 0.1);

        assert_eq!(predicted, direct);
        assert!((predicted.x - 2.0).abs() < 1e-12);
        assert!((predicted.v - 20.05).abs() < 1e-12);
    }

    #[test]
    fn test_zero_latency_keeps_pose() {
        let comp = LatencyCompensator::new(BicycleModel::new(2.67), 0.0);
        let state = VehicleState {
            v: 15.0,
            ..Default::default()
        };

        let predicted = comp.predict(&state, &Actuation { delta: 0.3, a: 1.0 }, &RefPoly::default());

        assert_eq!(predicted.x, 0.0);
        assert_eq!(predicted.psi, 0.0);
        assert_eq!(predicted.v, 15.0);
    }
}
