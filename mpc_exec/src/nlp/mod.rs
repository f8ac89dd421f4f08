//! # Nonlinear programs
//!
//! Interfaces between a problem, which evaluates its cost and constraints on any dual-number
//! scalar, and a solver, which consumes the problem together with an initial guess and bounds.
//!
//! Problems have the form
//!
//! ```text
//! minimise    f(x)
//! subject to  g_l <= g(x) <= g_u
//!             x_l <= x <= x_u
//! ```

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod deriv;
mod sqp;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use num_dual::DualNum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqp::SqpSolver;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Bounds at or beyond this magnitude are treated as infinite.
pub const INFINITE_BOUND: f64 = 1.0e19;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A nonlinear program.
pub trait NlpProblem {
    /// Number of decision variables.
    fn num_vars(&self) -> usize;

    /// Number of constraint rows.
    fn num_cons(&self) -> usize;

    /// Evaluate the cost and the constraint vector at `vars`.
    ///
    /// The returned vector must have `num_cons()` entries.
    fn eval<T: DualNum<f64> + Copy>(&self, vars: &[T]) -> (T, Vec<T>);

    /// The entries `(i, j)` with `i <= j` of the Lagrangian Hessian (the cost Hessian plus any
    /// constraint curvature) which may be non-zero.
    ///
    /// `None` means the Hessian is treated as dense.
    fn hessian_sparsity(&self) -> Option<Vec<(usize, usize)>> {
        None
    }
}

/// A solver for nonlinear programs.
pub trait NlpSolver {
    /// Solve `problem` starting from `initial_guess`.
    ///
    /// An `Err` is returned only if the inputs are inconsistent. Solves which run but do not
    /// converge return `Ok` with a non-success status.
    fn solve<P: NlpProblem>(
        &mut self,
        problem: &P,
        initial_guess: &[f64],
        bounds: &NlpBounds,
        options: &SolverOptions,
    ) -> Result<SolveResult, NlpError>;
}

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Variable and constraint bounds of a program.
#[derive(Debug, Clone, Default)]
pub struct NlpBounds {
    pub vars_lower: Vec<f64>,
    pub vars_upper: Vec<f64>,
    pub cons_lower: Vec<f64>,
    pub cons_upper: Vec<f64>,
}

/// Options given to the solver for each solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Verbosity of the solver's own logging, 0 for silent, 1 for a per-solve summary and 2 or
    /// more for per-iteration traces.
    pub print_level: u8,

    /// Only evaluate the Hessian entries the problem declares as non-zero.
    pub sparse: bool,

    /// Wall-clock limit on a single solve.
    ///
    /// Units: seconds
    pub max_solve_time_s: f64,

    /// Maximum number of major iterations.
    pub max_iters: usize,

    /// Convergence tolerance on the KKT conditions, relative to the size of the cost gradient
    /// for stationarity and to the size of the constraint targets for feasibility.
    pub tolerance: f64,
}

/// Result of a solve.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub status: SolveStatus,

    /// Cost at `vars`.
    pub objective: f64,

    /// Final decision vector.
    pub vars: Vec<f64>,

    /// Constraint vector at `vars`.
    pub cons: Vec<f64>,

    /// Number of major iterations performed.
    pub iterations: usize,

    /// Units: seconds
    pub solve_time_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// Converged to a point satisfying the tolerances.
    Success,

    MaxIterationsExceeded,

    MaxTimeExceeded,

    /// The problem produced a NaN or infinite value.
    NonFiniteValue,

    /// No acceptable step could be found along the search direction.
    LineSearchFailed,

    /// The step's linear system could not be solved.
    SingularSystem,
}

/// Errors caused by an inconsistent program or inconsistent solver inputs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NlpError {
    #[error("{what} has length {found}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Variable {index} has lower bound {lower} above upper bound {upper}")]
    InvertedVarBounds { index: usize, lower: f64, upper: f64 },

    #[error(
        "Constraint row {row} is a range ({lower}, {upper}), only equality rows are supported"
    )]
    UnsupportedConstraint { row: usize, lower: f64, upper: f64 },

    #[error("Invalid solver options: {0}")]
    InvalidOptions(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            print_level: 0,
            sparse: true,
            max_solve_time_s: 0.5,
            max_iters: 100,
            tolerance: 1e-8,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<(), NlpError> {
        if !(self.max_solve_time_s > 0.0) {
            return Err(NlpError::InvalidOptions(format!(
                "max_solve_time_s must be positive, found {}",
                self.max_solve_time_s
            )));
        }
        if self.max_iters == 0 {
            return Err(NlpError::InvalidOptions("max_iters must be at least 1".into()));
        }
        if !(self.tolerance > 0.0) {
            return Err(NlpError::InvalidOptions(format!(
                "tolerance must be positive, found {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

impl NlpBounds {
    /// Check the bounds against the size of `problem`.
    pub fn check<P: NlpProblem>(&self, problem: &P) -> Result<(), NlpError> {
        let n = problem.num_vars();
        let m = problem.num_cons();

        for &(what, len, expected) in [
            ("vars_lower", self.vars_lower.len(), n),
            ("vars_upper", self.vars_upper.len(), n),
            ("cons_lower", self.cons_lower.len(), m),
            ("cons_upper", self.cons_upper.len(), m),
        ]
        .iter()
        {
            if len != expected {
                return Err(NlpError::LengthMismatch {
                    what,
                    expected,
                    found: len,
                });
            }
        }

        for (index, (lower, upper)) in self.vars_lower.iter().zip(self.vars_upper.iter()).enumerate()
        {
            if lower > upper {
                return Err(NlpError::InvertedVarBounds {
                    index,
                    lower: *lower,
                    upper: *upper,
                });
            }
        }

        Ok(())
    }
}

impl SolveStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Success)
    }
}
