//! # Reference polynomial
//!
//! The reference path is described in the vehicle frame by a cubic polynomial `y = f(x)` fitted
//! to the upcoming waypoints. The same polynomial is evaluated by the optimiser on dual numbers,
//! so evaluation is generic over the scalar type.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector, Vector2};
use num_dual::DualNum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Order of the reference polynomial.
pub const POLY_ORDER: usize = 3;

/// Number of coefficients in the reference polynomial.
pub const NUM_COEFFS: usize = POLY_ORDER + 1;

/// Above this condition number the Vandermonde system is considered degenerate.
pub const MAX_CONDITION_NUMBER: f64 = 1e12;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A cubic reference polynomial.
///
/// Coefficients are stored lowest order first, so `f(x) = c[0] + c[1] x + c[2] x^2 + c[3] x^3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RefPoly {
    coeffs: [f64; NUM_COEFFS],
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while fitting the reference polynomial.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("At least {required} points are needed to fit the reference polynomial, found {found}")]
    InsufficientPoints { found: usize, required: usize },

    #[error(
        "The waypoints give a degenerate fit (Vandermonde condition number {condition_number:e})"
    )]
    Degenerate { condition_number: f64 },

    #[error("The fitted coefficients are not finite: {0:?}")]
    NonFiniteCoeffs([f64; NUM_COEFFS]),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl RefPoly {
    /// Build a polynomial directly from its coefficients, lowest order first.
    pub fn from_coeffs(coeffs: [f64; NUM_COEFFS]) -> Self {
        Self { coeffs }
    }

    /// The polynomial's coefficients, lowest order first.
    pub fn coeffs(&self) -> &[f64; NUM_COEFFS] {
        &self.coeffs
    }

    /// Least-squares fit of a cubic through the given vehicle frame points.
    ///
    /// The Vandermonde system is solved by SVD. Fits whose condition number exceeds
    /// `MAX_CONDITION_NUMBER` (for example when several points share the same `x`) are rejected.
    pub fn fit(points: &[Vector2<f64>]) -> Result<Self, FitError> {
        if points.len() < NUM_COEFFS {
            return Err(FitError::InsufficientPoints {
                found: points.len(),
                required: NUM_COEFFS,
            });
        }

        let vander = DMatrix::from_fn(points.len(), NUM_COEFFS, |r, c| points[r].x.powi(c as i32));
        let rhs = DVector::from_iterator(points.len(), points.iter().map(|p| p.y));

        let svd = vander.svd(true, true);

        let sv_max = svd.singular_values.max();
        let sv_min = svd.singular_values.min();
        let condition_number = if sv_min > 0.0 {
            sv_max / sv_min
        } else {
            f64::INFINITY
        };

        if !condition_number.is_finite() || condition_number > MAX_CONDITION_NUMBER {
            return Err(FitError::Degenerate { condition_number });
        }

        // Singular values are all non-zero at this point so the pseudo-inverse tolerance only
        // guards against rounding
        let sol = svd
            .solve(&rhs, f64::EPSILON * sv_max)
            .map_err(|_| FitError::Degenerate { condition_number })?;

        let mut coeffs = [0f64; NUM_COEFFS];
        for (i, c) in sol.iter().enumerate() {
            coeffs[i] = *c;
        }

        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(FitError::NonFiniteCoeffs(coeffs));
        }

        Ok(Self { coeffs })
    }

    /// Evaluate `f(x)`.
    pub fn eval<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        // Horner's scheme
        let mut acc = T::from(self.coeffs[POLY_ORDER]);
        for c in self.coeffs[..POLY_ORDER].iter().rev() {
            acc = acc * x + T::from(*c);
        }
        acc
    }

    /// Evaluate the first derivative `f'(x)`.
    pub fn deriv<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        let mut acc = T::from(self.coeffs[POLY_ORDER] * POLY_ORDER as f64);
        for i in (1..POLY_ORDER).rev() {
            acc = acc * x + T::from(self.coeffs[i] * i as f64);
        }
        acc
    }

    /// Heading of the polynomial's tangent at `x`, in (-pi/2, pi/2).
    pub fn tangent_heading<T: DualNum<f64> + Copy>(&self, x: T) -> T {
        self.deriv(x).atan()
    }

    /// Sample the polynomial at `x = inc_m * i` for `i` in `1..num_points`.
    ///
    /// The vehicle's own position (`i = 0`) is not included.
    pub fn sample(&self, inc_m: f64, num_points: usize) -> Vec<Vector2<f64>> {
        (1..num_points)
            .map(|i| {
                let x = inc_m * i as f64;
                Vector2::new(x, self.eval(x))
            })
            .collect()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
