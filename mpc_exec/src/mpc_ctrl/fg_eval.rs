//! Cost and constraint evaluation of the MPC program

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeSet;

use num_dual::DualNum;

use super::{HorizonConfig, VarLayout};
use crate::model::{BicycleModel, NUM_STATES};
use crate::nlp::NlpProblem;
use crate::poly::RefPoly;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The MPC program for one cycle.
///
/// Costs, all weighted squares:
/// - `cte`, `epsi` and speed deviation at every step,
/// - `delta` and `a` over every interval,
/// - differences of consecutive `delta` and of consecutive `a`.
///
/// Constraints: row `block + 0` of each state block is the step 0 value itself (pinned by its
/// bounds), rows `block + t` are the model transition residuals `state_t - step(state_t-1)`.
pub struct MpcProblem<'a> {
    layout: VarLayout,
    horizon: &'a HorizonConfig,
    model: BicycleModel,
    poly: &'a RefPoly,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl<'a> MpcProblem<'a> {
    pub fn new(horizon: &'a HorizonConfig, poly: &'a RefPoly) -> Self {
        Self {
            layout: VarLayout::new(horizon.steps),
            horizon,
            model: BicycleModel::new(horizon.lf_m),
            poly,
        }
    }

    pub fn layout(&self) -> &VarLayout {
        &self.layout
    }

    fn cost<T: DualNum<f64> + Copy>(&self, vars: &[T]) -> T {
        let l = &self.layout;
        let w = &self.horizon.weights;

        let ref_cte = T::from(self.horizon.ref_cte_m);
        let ref_epsi = T::from(self.horizon.ref_epsi_rad);
        let ref_v = T::from(self.horizon.ref_speed);

        let mut cost = T::from(0.0);

        for t in 0..l.steps() {
            let cte = vars[l.cte_start() + t] - ref_cte;
            let epsi = vars[l.epsi_start() + t] - ref_epsi;
            let dv = vars[l.v_start() + t] - ref_v;

            cost += cte * cte * w.cte + epsi * epsi * w.epsi + dv * dv * w.speed;
        }

        for t in 0..l.intervals() {
            let act = l.actuation_at(vars, t);
            cost += act.delta * act.delta * w.steer + act.a * act.a * w.throttle;
        }

        for t in 0..l.intervals().saturating_sub(1) {
            let this = l.actuation_at(vars, t);
            let next = l.actuation_at(vars, t + 1);
            let dd = next.delta - this.delta;
            let da = next.a - this.a;
            cost += dd * dd * w.steer_rate + da * da * w.throttle_rate;
        }

        cost
    }
}

impl<'a> NlpProblem for MpcProblem<'a> {
    fn num_vars(&self) -> usize {
        self.layout.num_vars()
    }

    fn num_cons(&self) -> usize {
        self.layout.num_cons()
    }

    fn eval<T: DualNum<f64> + Copy>(&self, vars: &[T]) -> (T, Vec<T>) {
        let l = &self.layout;
        let mut cons = vec![T::from(0.0); l.num_cons()];

        // Initial state rows
        for c in 0..NUM_STATES {
            cons[l.state_block(c)] = vars[l.state_block(c)];
        }

        // Transition rows
        for t in 1..l.steps() {
            let prev = l.state_at(vars, t - 1);
            let act = l.actuation_at(vars, t - 1);
            let next = l.state_at(vars, t);

            let pred = self
                .model
                .step(&prev, &act, self.poly, self.horizon.dt_s)
                .to_array();

            for (c, (n, p)) in next.to_array().iter().zip(pred.iter()).enumerate() {
                cons[l.state_block(c) + t] = *n - *p;
            }
        }

        (self.cost(vars), cons)
    }

    fn hessian_sparsity(&self) -> Option<Vec<(usize, usize)>> {
        let l = &self.layout;
        let mut pattern = BTreeSet::new();

        // Each transition couples the variables of the previous step
        for t in 0..l.steps() {
            let mut vars: Vec<usize> = (0..NUM_STATES).map(|c| l.state_block(c) + t).collect();
            if t < l.intervals() {
                vars.push(l.delta_start() + t);
                vars.push(l.a_start() + t);
            }

            for (k, &i) in vars.iter().enumerate() {
                for &j in vars[k..].iter() {
                    pattern.insert((i.min(j), i.max(j)));
                }
            }
        }

        // Actuation rate costs couple consecutive intervals
        for t in 0..l.intervals().saturating_sub(1) {
            for start in [l.delta_start(), l.a_start()].iter() {
                pattern.insert((start + t, start + t + 1));
            }
        }

        Some(pattern.into_iter().collect())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::{Profile, Weights};
    use crate::nlp::deriv;

    fn horizon(steps: usize) -> HorizonConfig {
        HorizonConfig {
            steps,
            dt_s: 0.1,
            lf_m: 2.67,
            ref_speed: 50.0,
            ref_cte_m: 0.0,
            ref_epsi_rad: 0.0,
            weights: Profile::Walkthrough.weights(),
            steer_limit: 0.436332 * 2.67,
            max_throttle: 1.0,
        }
    }

    #[test]
    fn test_sizes() {
        let h = horizon(10);
        let poly = RefPoly::default();
        let p = MpcProblem::new(&h, &poly);

        let (_, cons) = p.eval(&vec![0.0; p.num_vars()]);
        assert_eq!(p.num_vars(), 78);
        assert_eq!(cons.len(), 60);
    }

    #[test]
    fn test_cost_terms() {
        let mut h = horizon(3);
        h.weights = Weights {
            cte: 1.0,
            epsi: 2.0,
            speed: 3.0,
            steer: 4.0,
            throttle: 5.0,
            steer_rate: 6.0,
            throttle_rate: 7.0,
        };
        h.ref_speed = 1.0;
        let poly = RefPoly::default();
        let p = MpcProblem::new(&h, &poly);
        let l = p.layout();

        let mut vars = vec![0.0; p.num_vars()];
        vars[l.cte_start() + 2] = 1.0;
        vars[l.epsi_start()] = 1.0;
        for t in 0..3 {
            vars[l.v_start() + t] = 1.0;
        }
        vars[l.v_start() + 1] = 2.0;
        vars[l.delta_start() + 1] = 1.0;
        vars[l.a_start()] = 1.0;

        let (cost, _) = p.eval(&vars);

        // cte 1, epsi 2, speed 3, steer 4, throttle 5, steer rate 6 (0 -> 1), throttle rate 7
        // (1 -> 0)
        assert!((cost - 28.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_actuation_transition() {
        let h = horizon(4);
        let poly = RefPoly::default();
        let p = MpcProblem::new(&h, &poly);
        let l = p.layout();

        let mut vars = vec![0.0; p.num_vars()];
        vars[l.x_start()] = 2.0;
        vars[l.v_start()] = 10.0;

        let (_, cons) = p.eval(&vars);

        // The step 0 rows hold the step 0 values
        assert_eq!(cons[l.x_start()], 2.0);
        assert_eq!(cons[l.v_start()], 10.0);

        // Step 1 is all zero, so the residual is minus the predicted state: x1 = x0 + v0 dt and
        // y1 = y0
        assert!((cons[l.x_start() + 1] + 3.0).abs() < 1e-12);
        assert!(cons[l.y_start() + 1].abs() < 1e-12);
        assert!((cons[l.v_start() + 1] + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_sparsity_covers_hessian() {
        let h = horizon(5);
        let poly = RefPoly::from_coeffs([0.5, 0.1, -0.02, 0.003]);
        let p = MpcProblem::new(&h, &poly);
        let n = p.num_vars();

        let vars: Vec<f64> = (0..n).map(|i| 0.1 * (i as f64 % 7.0) - 0.2).collect();
        let mults: Vec<f64> = (0..p.num_cons()).map(|r| 1.0 + (r % 3) as f64).collect();

        let dense = deriv::lagrangian_hessian(&p, &vars, &mults, None);
        let pattern = p.hessian_sparsity().unwrap();
        let sparse = deriv::lagrangian_hessian(&p, &vars, &mults, Some(&pattern));

        for i in 0..n {
            for j in 0..n {
                assert!(
                    (dense[(i, j)] - sparse[(i, j)]).abs() < 1e-9,
                    "Entry ({}, {}) missing from the sparsity pattern",
                    i,
                    j
                );
            }
        }
    }
}
