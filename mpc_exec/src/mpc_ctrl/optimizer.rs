//! Trajectory optimiser

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use nalgebra::Vector2;

use super::{build_bounds, ConfigError, HorizonConfig, MpcError, MpcProblem, VarLayout};
use crate::model::{Actuation, VehicleState};
use crate::nlp::{NlpSolver, SolveStatus, SolverOptions, SqpSolver};
use crate::poly::RefPoly;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Builds and solves the MPC program each cycle.
pub struct TrajectoryOptimizer<S: NlpSolver = SqpSolver> {
    horizon: HorizonConfig,
    layout: VarLayout,
    options: SolverOptions,
    solver: S,

    /// If true the first interval's actuation is pinned to `applied`.
    pin_first: bool,

    /// The actuation in effect over the first interval of the next solve.
    applied: Actuation,
}

/// A converged solve.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// The actuation to send.
    pub actuation: Actuation,

    /// Predicted vehicle frame positions of steps 1 to N - 1.
    ///
    /// Units: meters
    pub path_m: Vec<Vector2<f64>>,

    pub status: SolveStatus,
    pub objective: f64,
    pub iterations: usize,

    /// Units: seconds
    pub solve_time_s: f64,

    /// The full decision vector.
    pub solution: Vec<f64>,

    /// Constraint values minus their targets at the solution.
    pub residuals: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl TrajectoryOptimizer<SqpSolver> {
    /// Create an optimiser using the built-in SQP solver.
    pub fn with_sqp(
        horizon: HorizonConfig,
        options: SolverOptions,
        pin_first: bool,
    ) -> Result<Self, ConfigError> {
        Self::new(horizon, options, pin_first, SqpSolver::new())
    }
}

impl<S: NlpSolver> TrajectoryOptimizer<S> {
    pub fn new(
        horizon: HorizonConfig,
        options: SolverOptions,
        pin_first: bool,
        solver: S,
    ) -> Result<Self, ConfigError> {
        let min_steps = if pin_first { 3 } else { 2 };
        if horizon.steps < min_steps {
            return Err(ConfigError::TooSmall {
                name: "horizon_steps",
                value: horizon.steps,
                min: min_steps,
            });
        }

        options.validate().map_err(ConfigError::Solver)?;

        // The bounds are rebuilt every cycle, check once that they fit the program
        let layout = VarLayout::new(horizon.steps);
        let poly = RefPoly::default();
        let bounds = build_bounds(&layout, &horizon, &VehicleState::default(), None);
        bounds
            .check(&MpcProblem::new(&horizon, &poly))
            .map_err(ConfigError::BoundsMismatch)?;

        Ok(Self {
            horizon,
            layout,
            options,
            solver,
            pin_first,
            applied: Actuation::default(),
        })
    }

    pub fn horizon(&self) -> &HorizonConfig {
        &self.horizon
    }

    pub fn layout(&self) -> &VarLayout {
        &self.layout
    }

    /// The actuation recorded as currently in effect.
    pub fn applied(&self) -> Actuation {
        self.applied
    }

    /// Record the actuation actually sent, for example when a fallback replaced the solution.
    pub fn set_applied(&mut self, applied: Actuation) {
        self.applied = applied;
    }

    /// Solve the program from `initial` along `poly`.
    ///
    /// Only converged solutions are returned. When pinning, the returned actuation is the
    /// second interval's, and it becomes the actuation in effect for the next solve.
    pub fn solve(
        &mut self,
        initial: &VehicleState,
        poly: &RefPoly,
    ) -> Result<Trajectory, MpcError> {
        if !initial.is_finite() {
            return Err(MpcError::NonFiniteState(initial.to_array()));
        }

        let problem = MpcProblem::new(&self.horizon, poly);

        let pinned = if self.pin_first {
            Some(&self.applied)
        } else {
            None
        };
        let bounds = build_bounds(&self.layout, &self.horizon, initial, pinned);

        // Zero everywhere except the known initial state
        let mut guess = vec![0.0; self.layout.num_vars()];
        self.layout.set_state(&mut guess, 0, initial);

        let result = self
            .solver
            .solve(&problem, &guess, &bounds, &self.options)?;

        debug!(
            "MPC solve: {:?}, objective {:.4}, {} iterations, {:.2} ms",
            result.status,
            result.objective,
            result.iterations,
            result.solve_time_s * 1e3
        );

        if !result.status.is_success() {
            return Err(MpcError::NotConverged {
                status: result.status,
                iterations: result.iterations,
                solve_time_s: result.solve_time_s,
            });
        }

        if result.vars.iter().any(|v| !v.is_finite()) || !result.objective.is_finite() {
            return Err(MpcError::NonFiniteSolution);
        }

        let first = if self.pin_first { 1 } else { 0 };
        let actuation = self.layout.actuation_at(&result.vars, first);

        if self.pin_first {
            self.applied = actuation;
        }

        let path_m = (1..self.layout.steps())
            .map(|t| {
                Vector2::new(
                    result.vars[self.layout.x_start() + t],
                    result.vars[self.layout.y_start() + t],
                )
            })
            .collect();

        let residuals: Vec<f64> = result
            .cons
            .iter()
            .zip(bounds.cons_lower.iter())
            .map(|(c, t)| c - t)
            .collect();

        trace!("MPC actuation: {:?}", actuation);

        Ok(Trajectory {
            actuation,
            path_m,
            status: result.status,
            objective: result.objective,
            iterations: result.iterations,
            solve_time_s: result.solve_time_s,
            solution: result.vars,
            residuals,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::Profile;
    use crate::nlp::{NlpBounds, NlpError, NlpProblem, SolveResult};

    fn horizon(steps: usize, profile: Profile) -> HorizonConfig {
        HorizonConfig {
            steps,
            dt_s: 0.1,
            lf_m: 2.67,
            ref_speed: 50.0,
            ref_cte_m: 0.0,
            ref_epsi_rad: 0.0,
            weights: profile.weights(),
            steer_limit: 0.436332,
            max_throttle: 1.0,
        }
    }

    fn options() -> SolverOptions {
        SolverOptions::default()
    }

    fn assert_residuals_zero(traj: &Trajectory) {
        for (r, res) in traj.residuals.iter().enumerate() {
            assert!(res.abs() < 1e-6, "Residual {} is {}", r, res);
        }
    }

    fn assert_within_bounds(opt: &TrajectoryOptimizer, traj: &Trajectory) {
        let l = opt.layout();
        let h = opt.horizon();
        for t in 0..l.intervals() {
            let act = l.actuation_at(&traj.solution, t);
            assert!(act.delta.abs() <= h.steer_limit + 1e-12);
            assert!(act.a.abs() <= h.max_throttle + 1e-12);
        }
    }

    #[test]
    fn test_at_reference() {
        let mut opt =
            TrajectoryOptimizer::with_sqp(horizon(10, Profile::Quiz), options(), false).unwrap();

        let init = VehicleState {
            v: 50.0,
            ..Default::default()
        };
        let traj = opt.solve(&init, &RefPoly::default()).unwrap();

        assert!(traj.actuation.delta.abs() < 1e-6);
        assert!(traj.actuation.a.abs() < 1e-6);
        assert_residuals_zero(&traj);

        // Straight ahead at the reference speed
        assert_eq!(traj.path_m.len(), 9);
        for (i, p) in traj.path_m.iter().enumerate() {
            assert!((p.x - 5.0 * (i + 1) as f64).abs() < 1e-6);
            assert!(p.y.abs() < 1e-6);
        }
    }

    #[test]
    fn test_offset_start() {
        let mut opt =
            TrajectoryOptimizer::with_sqp(horizon(10, Profile::Quiz), options(), false).unwrap();

        let init = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 10.0,
            cte: 1.0,
            epsi: 0.05,
        };
        let traj = opt.solve(&init, &RefPoly::default()).unwrap();

        // epsi only enters the first cross track error, which steering cannot change, so the
        // steering never takes the sign of epsi
        assert!(traj.actuation.delta < 1e-6);

        // Below the reference speed, so accelerate
        assert!(traj.actuation.a > 0.0);

        assert_residuals_zero(&traj);
        assert_within_bounds(&opt, &traj);
    }

    #[test]
    fn test_heading_error_steers_back() {
        let mut opt =
            TrajectoryOptimizer::with_sqp(horizon(10, Profile::Quiz), options(), false).unwrap();

        // Heading off to the left of a straight reference
        let init = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.05,
            v: 10.0,
            cte: 0.0,
            epsi: 0.05,
        };
        let traj = opt.solve(&init, &RefPoly::default()).unwrap();

        assert!(traj.actuation.delta < -1e-3);
        assert_residuals_zero(&traj);
        assert_within_bounds(&opt, &traj);
    }

    #[test]
    fn test_walkthrough_on_curve() {
        let mut opt =
            TrajectoryOptimizer::with_sqp(horizon(10, Profile::Walkthrough), options(), false)
                .unwrap();

        let poly = RefPoly::from_coeffs([0.8, 0.05, 0.004, -0.0001]);
        let init = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 30.0,
            cte: poly.eval(0.0),
            epsi: -poly.tangent_heading(0.0),
        };
        let traj = opt.solve(&init, &poly).unwrap();

        // The reference is to the left, steer left
        assert!(traj.actuation.delta > 0.0);
        assert_residuals_zero(&traj);
        assert_within_bounds(&opt, &traj);
    }

    #[test]
    fn test_pin_rows_for_any_horizon() {
        for &steps in [3usize, 4, 6, 10].iter() {
            let mut opt =
                TrajectoryOptimizer::with_sqp(horizon(steps, Profile::Quiz), options(), false)
                    .unwrap();

            let init = VehicleState {
                x: 0.3,
                y: -0.2,
                psi: 0.1,
                v: 12.0,
                cte: 0.4,
                epsi: 0.02,
            };
            let traj = opt.solve(&init, &RefPoly::default()).unwrap();
            let l = *opt.layout();

            assert!((l.state_at(&traj.solution, 0).v - 12.0).abs() < 1e-9);
            for c in 0..6 {
                assert!(traj.residuals[l.state_block(c)].abs() < 1e-9);
            }
            assert_residuals_zero(&traj);
        }

        // Two steps is the shortest horizon without pinning
        let mut opt =
            TrajectoryOptimizer::with_sqp(horizon(2, Profile::Quiz), options(), false).unwrap();
        let traj = opt
            .solve(&VehicleState::default(), &RefPoly::default())
            .unwrap();
        assert_eq!(traj.path_m.len(), 1);
    }

    #[test]
    fn test_pin_first_actuation() {
        let mut opt =
            TrajectoryOptimizer::with_sqp(horizon(10, Profile::Quiz), options(), true).unwrap();
        opt.set_applied(Actuation { delta: 0.1, a: 0.2 });

        let init = VehicleState {
            v: 20.0,
            ..Default::default()
        };
        let traj = opt.solve(&init, &RefPoly::default()).unwrap();
        let l = *opt.layout();

        // The first interval holds the applied actuation, the second is returned and remembered
        assert_eq!(l.actuation_at(&traj.solution, 0), Actuation { delta: 0.1, a: 0.2 });
        assert_eq!(traj.actuation, l.actuation_at(&traj.solution, 1));
        assert_eq!(opt.applied(), traj.actuation);
        assert_residuals_zero(&traj);
    }

    #[test]
    fn test_pinned_walkthrough() {
        let walkthrough = HorizonConfig {
            steer_limit: 0.436332 * 2.67,
            ..horizon(10, Profile::Walkthrough)
        };
        let poly = RefPoly::from_coeffs([0.5, 0.0, 0.0, 0.0]);
        let init = VehicleState {
            v: 20.0,
            cte: 0.5,
            ..Default::default()
        };

        for &applied in [
            Actuation { delta: 0.0, a: 0.0 },
            Actuation { delta: -0.3, a: 0.7 },
        ]
        .iter()
        {
            let mut opt =
                TrajectoryOptimizer::with_sqp(walkthrough, options(), true).unwrap();
            opt.set_applied(applied);

            let traj = opt.solve(&init, &poly).unwrap();
            let l = *opt.layout();

            assert_eq!(traj.status, SolveStatus::Success);
            assert!(traj.iterations <= 20, "{} iterations", traj.iterations);
            assert_eq!(l.actuation_at(&traj.solution, 0), applied);

            // The reference is to the left, steer left
            assert!(traj.actuation.delta > 0.0);
            assert_residuals_zero(&traj);
            assert_within_bounds(&opt, &traj);
        }
    }

    #[test]
    fn test_below_reference_speed() {
        let mut opt = TrajectoryOptimizer::with_sqp(
            HorizonConfig {
                ref_speed: 20.0,
                steer_limit: 0.436332 * 2.67,
                ..horizon(10, Profile::Walkthrough)
            },
            options(),
            false,
        )
        .unwrap();

        let init = VehicleState {
            v: 10.0,
            cte: 1.0,
            ..Default::default()
        };
        let traj = opt
            .solve(&init, &RefPoly::from_coeffs([1.0, 0.0, 0.0, 0.0]))
            .unwrap();

        assert_eq!(traj.status, SolveStatus::Success);
        assert!(traj.actuation.delta > 0.0);
        assert!(traj.actuation.a > 0.0);
        assert_residuals_zero(&traj);
    }

    #[test]
    fn test_config_errors() {
        assert_eq!(
            TrajectoryOptimizer::with_sqp(horizon(2, Profile::Quiz), options(), true).err(),
            Some(ConfigError::TooSmall {
                name: "horizon_steps",
                value: 2,
                min: 3
            })
        );

        let bad = SolverOptions {
            tolerance: 0.0,
            ..options()
        };
        assert!(matches!(
            TrajectoryOptimizer::with_sqp(horizon(5, Profile::Quiz), bad, false),
            Err(ConfigError::Solver(_))
        ));
    }

    /// A solver which never converges.
    struct Stalled;

    impl NlpSolver for Stalled {
        fn solve<P: NlpProblem>(
            &mut self,
            problem: &P,
            initial_guess: &[f64],
            _bounds: &NlpBounds,
            _options: &SolverOptions,
        ) -> Result<SolveResult, NlpError> {
            Ok(SolveResult {
                status: SolveStatus::MaxTimeExceeded,
                objective: 1.0,
                vars: initial_guess.to_vec(),
                cons: vec![0.0; problem.num_cons()],
                iterations: 3,
                solve_time_s: 0.5,
            })
        }
    }

    #[test]
    fn test_unconverged_is_an_error() {
        let mut opt =
            TrajectoryOptimizer::new(horizon(5, Profile::Quiz), options(), true, Stalled).unwrap();
        opt.set_applied(Actuation { delta: 0.2, a: 0.1 });

        let res = opt.solve(
            &VehicleState {
                v: 5.0,
                ..Default::default()
            },
            &RefPoly::default(),
        );

        assert_eq!(
            res.err(),
            Some(MpcError::NotConverged {
                status: SolveStatus::MaxTimeExceeded,
                iterations: 3,
                solve_time_s: 0.5
            })
        );

        // Nothing from the failed solve is remembered
        assert_eq!(opt.applied(), Actuation { delta: 0.2, a: 0.1 });

        let nan_state = VehicleState {
            v: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            opt.solve(&nan_state, &RefPoly::default()),
            Err(MpcError::NonFiniteState(_))
        ));
    }
}
