//! Variable and constraint bounds of the MPC program

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{HorizonConfig, VarLayout};
use crate::model::{Actuation, VehicleState};
use crate::nlp::{NlpBounds, INFINITE_BOUND};

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the bounds for one solve.
///
/// - States are unbounded.
/// - Steering is bounded by `steer_limit` and throttle by `max_throttle`.
/// - If `pinned` is given the first interval's actuation is fixed to it.
/// - The step 0 constraint rows equal the initial state, all transition rows equal zero.
pub fn build_bounds(
    layout: &VarLayout,
    horizon: &HorizonConfig,
    initial: &VehicleState,
    pinned: Option<&Actuation>,
) -> NlpBounds {
    let n = layout.num_vars();
    let mut vars_lower = vec![-INFINITE_BOUND; n];
    let mut vars_upper = vec![INFINITE_BOUND; n];

    for t in 0..layout.intervals() {
        vars_lower[layout.delta_start() + t] = -horizon.steer_limit;
        vars_upper[layout.delta_start() + t] = horizon.steer_limit;
        vars_lower[layout.a_start() + t] = -horizon.max_throttle;
        vars_upper[layout.a_start() + t] = horizon.max_throttle;
    }

    if let Some(act) = pinned {
        let delta = act.delta.max(-horizon.steer_limit).min(horizon.steer_limit);
        let a = act.a.max(-horizon.max_throttle).min(horizon.max_throttle);

        vars_lower[layout.delta_start()] = delta;
        vars_upper[layout.delta_start()] = delta;
        vars_lower[layout.a_start()] = a;
        vars_upper[layout.a_start()] = a;
    }

    let mut cons = vec![0.0; layout.num_cons()];
    for (c, value) in initial.to_array().iter().enumerate() {
        cons[layout.state_block(c)] = *value;
    }

    NlpBounds {
        vars_lower,
        vars_upper,
        cons_lower: cons.clone(),
        cons_upper: cons,
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::Profile;

    fn horizon() -> HorizonConfig {
        HorizonConfig {
            steps: 4,
            dt_s: 0.1,
            lf_m: 2.67,
            ref_speed: 50.0,
            ref_cte_m: 0.0,
            ref_epsi_rad: 0.0,
            weights: Profile::Quiz.weights(),
            steer_limit: 0.4,
            max_throttle: 1.0,
        }
    }

    #[test]
    fn test_bounds() {
        let h = horizon();
        let l = VarLayout::new(h.steps);
        let init = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 10.0,
            cte: 1.0,
            epsi: 0.05,
        };

        let b = build_bounds(&l, &h, &init, None);

        assert_eq!(b.vars_lower.len(), l.num_vars());
        assert_eq!(b.cons_lower.len(), l.num_cons());
        assert_eq!(b.vars_lower[l.epsi_start() + 3], -INFINITE_BOUND);
        assert_eq!(b.vars_upper[l.delta_start() + 2], 0.4);
        assert_eq!(b.vars_lower[l.a_start()], -1.0);

        assert_eq!(b.cons_lower[l.v_start()], 10.0);
        assert_eq!(b.cons_upper[l.cte_start()], 1.0);
        assert_eq!(b.cons_lower[l.epsi_start()], 0.05);
        assert_eq!(b.cons_upper[l.epsi_start() + 1], 0.0);
        assert_eq!(b.cons_lower, b.cons_upper);
    }

    #[test]
    fn test_pinned_actuation() {
        let h = horizon();
        let l = VarLayout::new(h.steps);

        let pinned = Actuation { delta: 0.9, a: -0.3 };
        let b = build_bounds(&l, &h, &VehicleState::default(), Some(&pinned));

        // Pins are clamped onto the actuator limits
        assert_eq!(b.vars_lower[l.delta_start()], 0.4);
        assert_eq!(b.vars_upper[l.delta_start()], 0.4);
        assert_eq!(b.vars_lower[l.a_start()], -0.3);
        assert_eq!(b.vars_upper[l.a_start()], -0.3);

        // Later intervals are free
        assert_eq!(b.vars_lower[l.a_start() + 1], -1.0);
    }
}
