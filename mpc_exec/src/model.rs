//! # Kinematic bicycle model
//!
//! Forward Euler discretisation of the kinematic bicycle model, extended with the cross track
//! and heading errors against the reference polynomial. Generic over the scalar so that the same
//! update drives the optimiser's constraints (on dual numbers) and the latency prediction (on
//! `f64`).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use num_dual::DualNum;
use serde::Serialize;

use crate::poly::RefPoly;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of components in the vehicle state.
pub const NUM_STATES: usize = 6;

/// Number of components in an actuation.
pub const NUM_ACTUATIONS: usize = 2;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// State of the vehicle in the vehicle frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VehicleState<T = f64> {
    /// Units: meters
    pub x: T,

    /// Units: meters
    pub y: T,

    /// Heading from the X axis.
    ///
    /// Units: radians
    pub psi: T,

    /// Speed, in the same unit as the reference speed.
    pub v: T,

    /// Cross track error, the reference line's `y` minus the vehicle's `y`.
    ///
    /// Units: meters
    pub cte: T,

    /// Heading error, the vehicle's heading minus the reference line's tangent heading.
    ///
    /// Units: radians
    pub epsi: T,
}

/// A steering and acceleration pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Actuation<T = f64> {
    /// Steering angle, positive turning towards +Y (left).
    ///
    /// Units: radians
    pub delta: T,

    /// Acceleration (throttle), positive speeding up.
    pub a: T,
}

/// Kinematic bicycle model of the vehicle.
#[derive(Debug, Clone, Copy)]
pub struct BicycleModel {
    /// Distance from the front axle to the centre of gravity.
    ///
    /// Units: meters
    pub lf_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl<T: Copy> VehicleState<T> {
    /// Components in decision vector block order.
    pub fn to_array(&self) -> [T; NUM_STATES] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    /// Build a state from components in decision vector block order.
    pub fn from_array(a: [T; NUM_STATES]) -> Self {
        Self {
            x: a[0],
            y: a[1],
            psi: a[2],
            v: a[3],
            cte: a[4],
            epsi: a[5],
        }
    }
}

impl VehicleState<f64> {
    /// True if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }
}

impl BicycleModel {
    pub fn new(lf_m: f64) -> Self {
        Self { lf_m }
    }

    /// Advance `state` by `dt_s` with `act` held constant.
    ///
    /// The errors of the new state are measured against the reference at the old position:
    ///
    /// ```text
    /// x1    = x0 + v0 cos(psi0) dt
    /// y1    = y0 + v0 sin(psi0) dt
    /// psi1  = psi0 + v0 / Lf delta0 dt
    /// v1    = v0 + a0 dt
    /// cte1  = (f(x0) - y0) + v0 sin(epsi0) dt
    /// epsi1 = (psi0 - atan(f'(x0))) + v0 / Lf delta0 dt
    /// ```
    pub fn step<T: DualNum<f64> + Copy>(
        &self,
        state: &VehicleState<T>,
        act: &Actuation<T>,
        poly: &RefPoly,
        dt_s: f64,
    ) -> VehicleState<T> {
        let dt = T::from(dt_s);
        let lf = T::from(self.lf_m);

        let yaw_incr = state.v / lf * act.delta * dt;
        let f0 = poly.eval(state.x);
        let psides0 = poly.tangent_heading(state.x);

        VehicleState {
            x: state.x + state.v * state.psi.cos() * dt,
            y: state.y + state.v * state.psi.sin() * dt,
            psi: state.psi + yaw_incr,
            v: state.v + act.a * dt,
            cte: (f0 - state.y) + state.v * state.epsi.sin() * dt,
            epsi: (state.psi - psides0) + yaw_incr,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use num_dual::Dual64;

    #[test]
    fn test_straight_line() {
        let model = BicycleModel::new(2.67);
        let flat = RefPoly::default();

        let s0 = VehicleState {
            x: 3.0,
            y: -1.0,
            psi: 0.0,
            v: 10.0,
            cte: 0.0,
            epsi: 0.0,
        };

        let s1 = model.step(&s0, &Actuation::default(), &flat, 0.1);

        assert!((s1.x - 4.0).abs() < 1e-12);
        assert!((s1.y + 1.0).abs() < 1e-12);
        assert!(s1.psi.abs() < 1e-12);
        assert!((s1.v - 10.0).abs() < 1e-12);

        // Reference is y = 0 and the vehicle is at y = -1
        assert!((s1.cte - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_turning() {
        let model = BicycleModel::new(2.0);
        let poly = RefPoly::from_coeffs([0.0, 1.0, 0.0, 0.0]);

        let s0 = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.2,
            v: 4.0,
            cte: 0.0,
            epsi: 0.1,
        };
        let act = Actuation { delta: 0.1, a: -1.0 };

        let s1 = model.step(&s0, &act, &poly, 0.5);

        // psi1 = 0.2 + 4 / 2 * 0.1 * 0.5
        assert!((s1.psi - 0.3).abs() < 1e-12);
        assert!((s1.v - 3.5).abs() < 1e-12);
        assert!((s1.cte - 4.0 * 0.1f64.sin() * 0.5).abs() < 1e-12);
        assert!((s1.epsi - (0.2 - 1f64.atan() + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_dual_matches_f64() {
        let model = BicycleModel::new(2.67);
        let poly = RefPoly::from_coeffs([0.3, 0.1, -0.02, 0.001]);

        let s0 = VehicleState {
            x: 1.0,
            y: 0.2,
            psi: 0.05,
            v: 12.0,
            cte: 0.1,
            epsi: 0.02,
        };
        let act = Actuation { delta: 0.05, a: 0.3 };
        let s1 = model.step(&s0, &act, &poly, 0.1);

        let mut comps = [Dual64::from(0.0); NUM_STATES];
        for (c, v) in comps.iter_mut().zip(s0.to_array().iter()) {
            *c = Dual64::from(*v);
        }
        let s0_dual = VehicleState::from_array(comps);
        let act_dual = Actuation {
            delta: Dual64::from(act.delta),
            a: Dual64::from(act.a),
        };
        let s1_dual = model.step(&s0_dual, &act_dual, &poly, 0.1);

        for (a, b) in s1.to_array().iter().zip(s1_dual.to_array().iter()) {
            assert!((a - b.re).abs() < 1e-12);
        }
    }
}
