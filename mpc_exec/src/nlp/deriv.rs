//! # Derivatives by automatic differentiation
//!
//! Gradients and Jacobians are computed in forward mode with one `Dual64` sweep per variable.
//! Hessian entries each take one `HyperDual64` sweep, so a sparsity pattern saves most of the
//! work on structured problems.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use num_dual::{Dual64, HyperDual64};

use super::NlpProblem;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Values and first derivatives of a program at a point.
#[derive(Debug, Clone)]
pub struct FirstOrder {
    pub cost: f64,
    pub cons: DVector<f64>,

    /// Gradient of the cost.
    pub grad: DVector<f64>,

    /// Jacobian of the constraints, one row per constraint.
    pub jac: DMatrix<f64>,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Evaluate the cost and constraints at `vars` without derivatives.
pub fn values<P: NlpProblem>(problem: &P, vars: &[f64]) -> (f64, DVector<f64>) {
    let (cost, cons) = problem.eval(vars);
    (cost, DVector::from_vec(cons))
}

/// Evaluate the cost, constraints, gradient and Jacobian at `vars`.
pub fn first_order<P: NlpProblem>(problem: &P, vars: &[f64]) -> FirstOrder {
    let n = problem.num_vars();
    let m = problem.num_cons();

    let (cost, cons) = values(problem, vars);

    let mut grad = DVector::zeros(n);
    let mut jac = DMatrix::zeros(m, n);

    let mut seeded: Vec<Dual64> = vars.iter().map(|v| Dual64::from(*v)).collect();

    for i in 0..n {
        seeded[i].eps = 1.0;
        let (c, g) = problem.eval(&seeded);
        seeded[i].eps = 0.0;

        grad[i] = c.eps;
        for (r, g_r) in g.iter().enumerate() {
            jac[(r, i)] = g_r.eps;
        }
    }

    FirstOrder {
        cost,
        cons,
        grad,
        jac,
    }
}

/// Hessian of the Lagrangian `f(x) + sum_r mult_r g_r(x)` at `vars`.
///
/// Only the entries in `pattern` are evaluated if one is given, all others are zero. Pass empty
/// multipliers for the cost Hessian alone.
pub fn lagrangian_hessian<P: NlpProblem>(
    problem: &P,
    vars: &[f64],
    multipliers: &[f64],
    pattern: Option<&[(usize, usize)]>,
) -> DMatrix<f64> {
    let n = problem.num_vars();
    let mut hess = DMatrix::zeros(n, n);

    let mut seeded: Vec<HyperDual64> = vars.iter().map(|v| HyperDual64::from(*v)).collect();

    let mut entry = |i: usize, j: usize| -> f64 {
        seeded[i].eps1 = 1.0;
        seeded[j].eps2 = 1.0;
        let (c, g) = problem.eval(&seeded);
        seeded[i].eps1 = 0.0;
        seeded[j].eps2 = 0.0;

        c.eps1eps2
            + g.iter()
                .zip(multipliers.iter())
                .map(|(g_r, m_r)| g_r.eps1eps2 * m_r)
                .sum::<f64>()
    };

    match pattern {
        Some(pattern) => {
            for &(i, j) in pattern {
                let h = entry(i, j);
                hess[(i, j)] = h;
                hess[(j, i)] = h;
            }
        }
        None => {
            for i in 0..n {
                for j in i..n {
                    let h = entry(i, j);
                    hess[(i, j)] = h;
                    hess[(j, i)] = h;
                }
            }
        }
    }

    hess
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
