//! # Sequential quadratic programming solver
//!
//! A dense SQP method for programs with equality constraints and box bounds on the variables.
//!
//! Each major iteration linearises the constraints and builds the exact Hessian of the Lagrangian
//! with hyper-dual numbers. The QP subproblem is solved with a primal active set on the variable
//! bounds, each working set being a KKT system over the free variables. The exact Hessian is used
//! whenever the resulting step has positive curvature, otherwise the Hessian is convexified by
//! flooring its eigenvalues and the QP solved again.
//!
//! The solve stops once the KKT conditions hold at the current point: the Lagrangian gradient,
//! projected onto the variable bounds, and the constraint violation are both within the tolerance
//! relative to the size of the problem. Otherwise the step is globalised with a backtracking line
//! search on the L1 merit function `f(x) + mu |g(x) - g_target|_1`, trying a second-order
//! correction when the full step is rejected.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};

use super::{deriv, NlpBounds, NlpError, NlpProblem, NlpSolver, SolveResult, SolveStatus, SolverOptions};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Dense SQP solver.
#[derive(Debug, Clone)]
pub struct SqpSolver {
    /// Sufficient decrease constant of the Armijo condition.
    armijo: f64,

    /// Factor the step length is multiplied by on each backtrack.
    backtrack: f64,

    /// The line search fails below this step length.
    min_step: f64,

    /// Eigenvalues of the Hessian are floored at this fraction of the largest one.
    eig_floor: f64,

    /// Smallest curvature, relative to the largest Hessian entry, accepted along a step computed
    /// with the exact Hessian.
    curvature_tol: f64,

    /// Slack allowed on the variable bounds and on the multiplier signs in the active set.
    bound_tol: f64,
}

/// Bound status of a variable within the active set.
#[derive(Debug, Clone, Copy, PartialEq)]
enum BoundState {
    Free,
    AtLower,
    AtUpper,

    /// Lower and upper bounds are equal.
    Fixed,
}

/// Hessian a QP step was computed with.
#[derive(Debug, Clone, Copy, PartialEq)]
enum HessianKind {
    Exact,
    Convexified,
}

/// Solution of one QP subproblem.
struct QpStep {
    step: DVector<f64>,

    /// Estimates of the constraint multipliers.
    mults: DVector<f64>,
}

/// Outcome of a line search.
enum Search {
    Accepted {
        vars: Vec<f64>,
        alpha: f64,
        corrected: bool,
    },
    Failed(SolveStatus),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Default for SqpSolver {
    fn default() -> Self {
        Self {
            armijo: 1e-4,
            backtrack: 0.5,
            min_step: 1e-10,
            eig_floor: 1e-8,
            curvature_tol: 1e-8,
            bound_tol: 1e-10,
        }
    }
}

impl SqpSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convexify a symmetric matrix by replacing each eigenvalue with its magnitude, floored
    /// relative to the largest.
    fn convexify(&self, hess: DMatrix<f64>) -> DMatrix<f64> {
        let mut eig = hess.symmetric_eigen();

        let scale = eig.eigenvalues.amax().max(1.0);
        let floor = self.eig_floor * scale;
        for l in eig.eigenvalues.iter_mut() {
            *l = l.abs().max(floor);
        }

        eig.recompose()
    }

    /// Compute the step of one major iteration.
    ///
    /// The QP is first solved with the exact Hessian on a copy of the bound states. The step is
    /// kept if it has positive curvature, in which case the states are updated. Otherwise the QP
    /// is solved again with the convexified Hessian.
    #[allow(clippy::too_many_arguments)]
    fn subproblem(
        &self,
        vars: &[f64],
        bounds: &NlpBounds,
        hess: DMatrix<f64>,
        grad: &DVector<f64>,
        jac: &DMatrix<f64>,
        resid: &DVector<f64>,
        states: &mut [BoundState],
    ) -> Option<(QpStep, HessianKind)> {
        let mut exact_states = states.to_vec();

        if let Some(qp) = self.solve_qp(vars, bounds, &hess, grad, jac, resid, &mut exact_states) {
            let curvature = qp.step.dot(&(&hess * &qp.step));
            let scale = hess.amax().max(1.0);

            if curvature >= self.curvature_tol * scale * qp.step.norm_squared() {
                states.copy_from_slice(&exact_states);
                return Some((qp, HessianKind::Exact));
            }
        }

        let hess = self.convexify(hess);
        self.solve_qp(vars, bounds, &hess, grad, jac, resid, states)
            .map(|qp| (qp, HessianKind::Convexified))
    }

    /// Solve the QP subproblem
    ///
    /// ```text
    /// minimise    1/2 d' H d + grad' d
    /// subject to  J d = -resid
    ///             lower - x <= d <= upper - x
    /// ```
    ///
    /// updating the bound states in place. Returns `None` if a KKT system is singular.
    #[allow(clippy::too_many_arguments)]
    fn solve_qp(
        &self,
        vars: &[f64],
        bounds: &NlpBounds,
        hess: &DMatrix<f64>,
        grad: &DVector<f64>,
        jac: &DMatrix<f64>,
        resid: &DVector<f64>,
        states: &mut [BoundState],
    ) -> Option<QpStep> {
        let n = vars.len();
        let m = resid.len();

        let mut last = None;

        for _ in 0..(2 * n + 10) {
            // Steps of the variables held on a bound
            let mut step = DVector::zeros(n);
            for (i, s) in states.iter().enumerate() {
                match s {
                    BoundState::AtLower | BoundState::Fixed => {
                        step[i] = bounds.vars_lower[i] - vars[i]
                    }
                    BoundState::AtUpper => step[i] = bounds.vars_upper[i] - vars[i],
                    BoundState::Free => (),
                }
            }

            let free: Vec<usize> = (0..n).filter(|&i| states[i] == BoundState::Free).collect();
            let nf = free.len();

            let hd = hess * &step;
            let jd = jac * &step;

            let mut kkt = DMatrix::zeros(nf + m, nf + m);
            let mut rhs = DVector::zeros(nf + m);

            for (a, &i) in free.iter().enumerate() {
                for (b, &j) in free.iter().enumerate() {
                    kkt[(a, b)] = hess[(i, j)];
                }
                for r in 0..m {
                    kkt[(a, nf + r)] = jac[(r, i)];
                    kkt[(nf + r, a)] = jac[(r, i)];
                }
                rhs[a] = -(grad[i] + hd[i]);
            }
            for r in 0..m {
                rhs[nf + r] = -(resid[r] + jd[r]);
            }

            let sol = kkt.lu().solve(&rhs)?;
            if sol.iter().any(|v| !v.is_finite()) {
                return None;
            }

            for (a, &i) in free.iter().enumerate() {
                step[i] = sol[a];
            }
            let mults = sol.rows(nf, m).into_owned();

            // Free variables leaving their bounds join the working set
            let mut blocked = false;
            for &i in free.iter() {
                let target = vars[i] + step[i];
                if target < bounds.vars_lower[i] - self.bound_tol {
                    states[i] = BoundState::AtLower;
                    blocked = true;
                } else if target > bounds.vars_upper[i] + self.bound_tol {
                    states[i] = BoundState::AtUpper;
                    blocked = true;
                }
            }

            if blocked {
                last = Some(QpStep { step, mults });
                continue;
            }

            // Release the bound whose multiplier has the most wrong sign. The bound multiplier is
            // r_i at a lower bound and -r_i at an upper bound, both must be non-negative.
            let r = hess * &step + grad + jac.tr_mul(&mults);

            let mut worst: Option<(usize, f64)> = None;
            for (i, s) in states.iter().enumerate() {
                let violation = match s {
                    BoundState::AtLower => -r[i],
                    BoundState::AtUpper => r[i],
                    _ => continue,
                };
                if violation > self.bound_tol && worst.map_or(true, |(_, w)| violation > w) {
                    worst = Some((i, violation));
                }
            }

            match worst {
                Some((i, _)) => {
                    states[i] = BoundState::Free;
                    last = Some(QpStep { step, mults });
                }
                None => return Some(QpStep { step, mults }),
            }
        }

        // The working set cycled, use the latest step, the line search clamps onto the bounds
        last
    }

    /// Backtracking line search on the L1 merit function.
    ///
    /// If the full step is rejected a second-order correction, which pulls the trial point back
    /// onto the linearised constraints, is tried once before backtracking.
    #[allow(clippy::too_many_arguments)]
    fn line_search<P: NlpProblem>(
        &self,
        problem: &P,
        vars: &[f64],
        bounds: &NlpBounds,
        target: &DVector<f64>,
        jac: &DMatrix<f64>,
        states: &[BoundState],
        step: &DVector<f64>,
        merit_0: f64,
        slope: f64,
        penalty: f64,
        start: &Instant,
        max_time_s: f64,
    ) -> Search {
        let mut alpha = 1.0;
        let mut tried_correction = false;

        loop {
            if start.elapsed().as_secs_f64() > max_time_s {
                return Search::Failed(SolveStatus::MaxTimeExceeded);
            }

            let trial = step_clamped(vars, step, alpha, bounds);
            let (cost, cons) = deriv::values(problem, &trial);
            let trial_resid = cons - target;
            let merit = cost + penalty * trial_resid.lp_norm(1);

            if merit.is_finite() && merit <= merit_0 + self.armijo * alpha * slope {
                return Search::Accepted {
                    vars: trial,
                    alpha,
                    corrected: false,
                };
            }

            if !tried_correction {
                tried_correction = true;

                if let Some(corr) = correction(jac, states, &trial_resid) {
                    let corrected = step_clamped(&trial, &corr, 1.0, bounds);
                    let (cost, cons) = deriv::values(problem, &corrected);
                    let merit = cost + penalty * (cons - target).lp_norm(1);

                    if merit.is_finite() && merit <= merit_0 + self.armijo * slope {
                        return Search::Accepted {
                            vars: corrected,
                            alpha,
                            corrected: true,
                        };
                    }
                }
            }

            alpha *= self.backtrack;
            if alpha < self.min_step {
                return Search::Failed(SolveStatus::LineSearchFailed);
            }
        }
    }
}

impl NlpSolver for SqpSolver {
    fn solve<P: NlpProblem>(
        &mut self,
        problem: &P,
        initial_guess: &[f64],
        bounds: &NlpBounds,
        options: &SolverOptions,
    ) -> Result<SolveResult, NlpError> {
        options.validate()?;
        bounds.check(problem)?;

        let n = problem.num_vars();
        if initial_guess.len() != n {
            return Err(NlpError::LengthMismatch {
                what: "initial_guess",
                expected: n,
                found: initial_guess.len(),
            });
        }

        for (row, (lower, upper)) in bounds.cons_lower.iter().zip(bounds.cons_upper.iter()).enumerate()
        {
            if lower != upper {
                return Err(NlpError::UnsupportedConstraint {
                    row,
                    lower: *lower,
                    upper: *upper,
                });
            }
        }

        let start = Instant::now();
        let target = DVector::from_column_slice(&bounds.cons_lower);
        let cons_scale = target.amax().max(1.0);
        let pattern = if options.sparse {
            problem.hessian_sparsity()
        } else {
            None
        };

        let mut vars = step_clamped(initial_guess, &DVector::zeros(n), 0.0, bounds);
        let mut states: Vec<BoundState> = (0..n)
            .map(|i| {
                if bounds.vars_lower[i] == bounds.vars_upper[i] {
                    BoundState::Fixed
                } else {
                    BoundState::Free
                }
            })
            .collect();
        let mut mults: Vec<f64> = vec![0.0; problem.num_cons()];
        let mut penalty = 1.0f64;
        let mut iterations = 0;

        let status = loop {
            if iterations >= options.max_iters {
                break SolveStatus::MaxIterationsExceeded;
            }
            if start.elapsed().as_secs_f64() > options.max_solve_time_s {
                break SolveStatus::MaxTimeExceeded;
            }

            let fo = deriv::first_order(problem, &vars);
            let resid = &fo.cons - &target;

            if !fo.cost.is_finite()
                || resid.iter().chain(fo.grad.iter()).chain(fo.jac.iter()).any(|v| !v.is_finite())
            {
                break SolveStatus::NonFiniteValue;
            }

            let hess = deriv::lagrangian_hessian(problem, &vars, &mults, pattern.as_deref());
            if hess.iter().any(|v| !v.is_finite()) {
                break SolveStatus::NonFiniteValue;
            }

            let (qp, kind) = match self.subproblem(
                &vars,
                bounds,
                hess,
                &fo.grad,
                &fo.jac,
                &resid,
                &mut states,
            ) {
                Some(o) => o,
                None => break SolveStatus::SingularSystem,
            };

            iterations += 1;
            mults = qp.mults.iter().copied().collect();

            let violation = resid.amax();
            let stationarity = stationarity_error(
                &vars,
                bounds,
                &fo.grad,
                &fo.jac,
                &qp.mults,
                self.bound_tol,
            );

            if options.print_level >= 2 {
                trace!(
                    "SQP iter {:3}: cost {:.6e}, violation {:.3e}, stationarity {:.3e}, step \
                    {:.3e} ({:?} Hessian)",
                    iterations,
                    fo.cost,
                    violation,
                    stationarity,
                    qp.step.amax(),
                    kind
                );
            }

            if stationarity <= options.tolerance * fo.grad.amax().max(1.0)
                && violation <= options.tolerance * cons_scale
            {
                break SolveStatus::Success;
            }

            penalty = penalty.max(2.0 * qp.mults.amax() + 1.0);
            let l1_violation = resid.lp_norm(1);
            let merit_0 = fo.cost + penalty * l1_violation;
            let slope = (fo.grad.dot(&qp.step) - penalty * l1_violation).min(0.0);

            match self.line_search(
                problem,
                &vars,
                bounds,
                &target,
                &fo.jac,
                &states,
                &qp.step,
                merit_0,
                slope,
                penalty,
                &start,
                options.max_solve_time_s,
            ) {
                Search::Accepted {
                    vars: v,
                    alpha,
                    corrected,
                } => {
                    if options.print_level >= 2 {
                        trace!("    step length {:.3e}, corrected: {}", alpha, corrected);
                    }
                    vars = v;
                }
                Search::Failed(status) => break status,
            }
        };

        let (objective, cons) = deriv::values(problem, &vars);
        let solve_time_s = start.elapsed().as_secs_f64();

        if options.print_level >= 1 {
            debug!(
                "SQP finished with {:?} after {} iterations in {:.3} ms, objective {:.6e}",
                status,
                iterations,
                solve_time_s * 1e3,
                objective
            );
        }

        Ok(SolveResult {
            status,
            objective,
            vars,
            cons: cons.iter().copied().collect(),
            iterations,
            solve_time_s,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// `vars + alpha * step` clamped onto the variable bounds.
fn step_clamped(vars: &[f64], step: &DVector<f64>, alpha: f64, bounds: &NlpBounds) -> Vec<f64> {
    vars.iter()
        .enumerate()
        .map(|(i, v)| {
            (v + alpha * step[i])
                .max(bounds.vars_lower[i])
                .min(bounds.vars_upper[i])
        })
        .collect()
}

/// Largest violation of the stationarity of the Lagrangian at `vars`.
///
/// Variables resting on a bound only count when the Lagrangian gradient pushes them off it, fixed
/// variables never count.
fn stationarity_error(
    vars: &[f64],
    bounds: &NlpBounds,
    grad: &DVector<f64>,
    jac: &DMatrix<f64>,
    mults: &DVector<f64>,
    bound_tol: f64,
) -> f64 {
    let lag_grad = grad + jac.tr_mul(mults);

    vars.iter()
        .enumerate()
        .map(|(i, &v)| {
            let lower = bounds.vars_lower[i];
            let upper = bounds.vars_upper[i];

            if lower == upper {
                0.0
            } else if v - lower <= bound_tol * lower.abs().max(1.0) {
                (-lag_grad[i]).max(0.0)
            } else if upper - v <= bound_tol * upper.abs().max(1.0) {
                lag_grad[i].max(0.0)
            } else {
                lag_grad[i].abs()
            }
        })
        .fold(0.0, f64::max)
}

/// Second-order correction: the smallest change to the free variables which cancels the
/// linearised constraint residual `resid` left at a trial point.
///
/// ```text
/// [ I   Jf' ] [ dc ]   [    0   ]
/// [ Jf  0   ] [ y  ] = [ -resid ]
/// ```
fn correction(
    jac: &DMatrix<f64>,
    states: &[BoundState],
    resid: &DVector<f64>,
) -> Option<DVector<f64>> {
    let n = states.len();
    let m = resid.len();

    let free: Vec<usize> = (0..n).filter(|&i| states[i] == BoundState::Free).collect();
    let nf = free.len();

    let mut kkt = DMatrix::zeros(nf + m, nf + m);
    let mut rhs = DVector::zeros(nf + m);

    for (a, &i) in free.iter().enumerate() {
        kkt[(a, a)] = 1.0;
        for r in 0..m {
            kkt[(a, nf + r)] = jac[(r, i)];
            kkt[(nf + r, a)] = jac[(r, i)];
        }
    }
    for r in 0..m {
        rhs[nf + r] = -resid[r];
    }

    let sol = kkt.lu().solve(&rhs)?;
    if sol.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut corr = DVector::zeros(n);
    for (a, &i) in free.iter().enumerate() {
        corr[i] = sol[a];
    }

    Some(corr)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::nlp::INFINITE_BOUND;
    use num_dual::DualNum;

    /// minimise (x0 - 1)^2 + (x1 - 2)^2 subject to x0 + x1 = c, c given by the bounds
    struct Plane;

    impl NlpProblem for Plane {
        fn num_vars(&self) -> usize {
            2
        }

        fn num_cons(&self) -> usize {
            1
        }

        fn eval<T: DualNum<f64> + Copy>(&self, v: &[T]) -> (T, Vec<T>) {
            let one = T::from(1.0);
            let two = T::from(2.0);
            let cost = (v[0] - one) * (v[0] - one) + (v[1] - two) * (v[1] - two);
            (cost, vec![v[0] + v[1]])
        }

        fn hessian_sparsity(&self) -> Option<Vec<(usize, usize)>> {
            Some(vec![(0, 0), (1, 1)])
        }
    }

    /// minimise x0^2 + x1^2 subject to x1 = exp(x0) - 2 (a curved constraint)
    struct Curve;

    impl NlpProblem for Curve {
        fn num_vars(&self) -> usize {
            2
        }

        fn num_cons(&self) -> usize {
            1
        }

        fn eval<T: DualNum<f64> + Copy>(&self, v: &[T]) -> (T, Vec<T>) {
            let cost = v[0] * v[0] + v[1] * v[1];
            (cost, vec![v[1] - v[0].exp() + T::from(2.0)])
        }
    }

    /// minimise x0^2 + x1^2 + x2^2 subject to x1 - exp(x0) + 2 + x2 = 0, with x2 fixed by its
    /// bounds
    struct PinnedCurve;

    impl NlpProblem for PinnedCurve {
        fn num_vars(&self) -> usize {
            3
        }

        fn num_cons(&self) -> usize {
            1
        }

        fn eval<T: DualNum<f64> + Copy>(&self, v: &[T]) -> (T, Vec<T>) {
            let cost = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
            (cost, vec![v[1] - v[0].exp() + T::from(2.0) + v[2]])
        }
    }

    /// minimise x1^2 - x0^2 subject to x0 + x1 = c, which has no curvature along the constraint
    struct Saddle;

    impl NlpProblem for Saddle {
        fn num_vars(&self) -> usize {
            2
        }

        fn num_cons(&self) -> usize {
            1
        }

        fn eval<T: DualNum<f64> + Copy>(&self, v: &[T]) -> (T, Vec<T>) {
            (v[1] * v[1] - v[0] * v[0], vec![v[0] + v[1]])
        }

        fn hessian_sparsity(&self) -> Option<Vec<(usize, usize)>> {
            Some(vec![(0, 0), (1, 1)])
        }
    }

    fn options() -> SolverOptions {
        SolverOptions::default()
    }

    fn free_bounds(n: usize, cons: &[f64]) -> NlpBounds {
        NlpBounds {
            vars_lower: vec![-INFINITE_BOUND; n],
            vars_upper: vec![INFINITE_BOUND; n],
            cons_lower: cons.to_vec(),
            cons_upper: cons.to_vec(),
        }
    }

    #[test]
    fn test_equality_qp() {
        let mut solver = SqpSolver::new();
        let res = solver
            .solve(&Plane, &[0.0, 0.0], &free_bounds(2, &[1.0]), &options())
            .unwrap();

        assert_eq!(res.status, SolveStatus::Success);
        assert!((res.vars[0] - 0.0).abs() < 1e-6);
        assert!((res.vars[1] - 1.0).abs() < 1e-6);
        assert!((res.cons[0] - 1.0).abs() < 1e-8);
        assert!((res.objective - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_active_bound() {
        // Unbounded optimum is (0, 1), bounding x0 >= 0.5 moves it to (0.5, 0.5)
        let mut bounds = free_bounds(2, &[1.0]);
        bounds.vars_lower[0] = 0.5;

        let mut solver = SqpSolver::new();
        let res = solver
            .solve(&Plane, &[2.0, 2.0], &bounds, &options())
            .unwrap();

        assert_eq!(res.status, SolveStatus::Success);
        assert!((res.vars[0] - 0.5).abs() < 1e-6);
        assert!((res.vars[1] - 0.5).abs() < 1e-6);
        assert!(res.vars[0] >= 0.5);

        // An inactive bound leaves the optimum unchanged
        let mut bounds = free_bounds(2, &[1.0]);
        bounds.vars_upper[1] = 1.5;
        let res = solver
            .solve(&Plane, &[-3.0, 1.5], &bounds, &options())
            .unwrap();

        assert_eq!(res.status, SolveStatus::Success);
        assert!((res.vars[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_variable() {
        let mut bounds = free_bounds(2, &[1.0]);
        bounds.vars_lower[1] = 3.0;
        bounds.vars_upper[1] = 3.0;

        let mut solver = SqpSolver::new();
        let res = solver
            .solve(&Plane, &[0.0, 0.0], &bounds, &options())
            .unwrap();

        assert_eq!(res.status, SolveStatus::Success);
        assert_eq!(res.vars[1], 3.0);
        assert!((res.vars[0] + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_nonlinear_constraint() {
        let mut solver = SqpSolver::new();
        let res = solver
            .solve(&Curve, &[1.0, 1.0], &free_bounds(2, &[0.0]), &options())
            .unwrap();

        assert_eq!(res.status, SolveStatus::Success);
        assert!(res.cons[0].abs() < 1e-8);

        // Stationarity: grad f = (2 x0, 2 x1) parallel to grad g = (-exp(x0), 1)
        let (x0, x1) = (res.vars[0], res.vars[1]);
        assert!((2.0 * x0 + 2.0 * x1 * x0.exp()).abs() < 1e-6);
    }

    #[test]
    fn test_input_errors() {
        let mut solver = SqpSolver::new();

        let mut bounds = free_bounds(2, &[1.0]);
        bounds.cons_upper[0] = 2.0;
        assert_eq!(
            solver
                .solve(&Plane, &[0.0, 0.0], &bounds, &options())
                .unwrap_err(),
            NlpError::UnsupportedConstraint {
                row: 0,
                lower: 1.0,
                upper: 2.0
            }
        );

        let bounds = free_bounds(3, &[1.0]);
        match solver.solve(&Plane, &[0.0, 0.0], &bounds, &options()) {
            Err(NlpError::LengthMismatch { what, .. }) => assert_eq!(what, "vars_lower"),
            r => panic!("Expected a length mismatch, got {:?}", r),
        }

        let bounds = free_bounds(2, &[1.0]);
        match solver.solve(&Plane, &[0.0], &bounds, &options()) {
            Err(NlpError::LengthMismatch { what, .. }) => assert_eq!(what, "initial_guess"),
            r => panic!("Expected a length mismatch, got {:?}", r),
        }
    }

    #[test]
    fn test_iteration_cap() {
        let mut solver = SqpSolver::new();
        let opts = SolverOptions {
            max_iters: 1,
            ..options()
        };

        let res = solver
            .solve(&Curve, &[1.0, 1.0], &free_bounds(2, &[0.0]), &opts)
            .unwrap();

        assert_eq!(res.status, SolveStatus::MaxIterationsExceeded);
        assert_eq!(res.iterations, 1);
    }

    #[test]
    fn test_fixed_variable_curved() {
        let mut bounds = free_bounds(3, &[0.0]);
        bounds.vars_lower[2] = 0.5;
        bounds.vars_upper[2] = 0.5;

        let mut solver = SqpSolver::new();
        let res = solver
            .solve(&PinnedCurve, &[1.0, 1.0, 0.0], &bounds, &options())
            .unwrap();

        assert_eq!(res.status, SolveStatus::Success);
        assert!(res.iterations <= 10);
        assert_eq!(res.vars[2], 0.5);
        assert!(res.cons[0].abs() < 1e-8);

        let (x0, x1) = (res.vars[0], res.vars[1]);
        assert!((2.0 * x0 + 2.0 * x1 * x0.exp()).abs() < 1e-6);
    }

    #[test]
    fn test_indefinite_hessian() {
        // Along x0 + x1 = 1 the cost is 1 - 2 x0, so the optimum sits on the upper bound of x0
        let mut bounds = free_bounds(2, &[1.0]);
        bounds.vars_lower[0] = -2.0;
        bounds.vars_upper[0] = 2.0;

        let mut solver = SqpSolver::new();
        let res = solver
            .solve(&Saddle, &[0.0, 0.0], &bounds, &options())
            .unwrap();

        assert_eq!(res.status, SolveStatus::Success);
        assert!((res.vars[0] - 2.0).abs() < 1e-6);
        assert!((res.vars[1] + 1.0).abs() < 1e-6);
        assert!((res.objective + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_stationarity_error() {
        let mut bounds = free_bounds(2, &[0.0]);
        bounds.vars_lower[0] = 0.0;
        bounds.vars_upper[1] = 1.0;

        let jac = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let mults = DVector::from_column_slice(&[1.0]);

        // Lagrangian gradient (3, -2): x0 pushed into its lower bound, x1 into its upper bound
        let grad = DVector::from_column_slice(&[2.0, -3.0]);
        assert_eq!(
            stationarity_error(&[0.0, 1.0], &bounds, &grad, &jac, &mults, 1e-10),
            0.0
        );

        // Off the bounds every component counts
        assert_eq!(
            stationarity_error(&[0.5, 0.5], &bounds, &grad, &jac, &mults, 1e-10),
            3.0
        );

        // Lagrangian gradient (-2, 3) pulls both variables off their bounds
        let grad = DVector::from_column_slice(&[-3.0, 2.0]);
        assert_eq!(
            stationarity_error(&[0.0, 1.0], &bounds, &grad, &jac, &mults, 1e-10),
            3.0
        );
    }
}
