//! Decision vector layout
//!
//! The decision vector holds each state component for all N steps, followed by each actuation
//! component for the N - 1 intervals:
//!
//! ```text
//! | x * N | y * N | psi * N | v * N | cte * N | epsi * N | delta * (N-1) | a * (N-1) |
//! ```
//!
//! The constraint vector has one row per state variable, laid out in the same blocks.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::model::{Actuation, VehicleState, NUM_ACTUATIONS, NUM_STATES};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Offsets into the decision and constraint vectors for a horizon of N steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLayout {
    steps: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl VarLayout {
    pub fn new(steps: usize) -> Self {
        Self { steps }
    }

    /// Number of model steps, N.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of actuation intervals, N - 1.
    pub fn intervals(&self) -> usize {
        self.steps.saturating_sub(1)
    }

    pub fn num_vars(&self) -> usize {
        NUM_STATES * self.steps + NUM_ACTUATIONS * self.intervals()
    }

    pub fn num_cons(&self) -> usize {
        NUM_STATES * self.steps
    }

    /// Start of the block of state component `c` (0 for x through 5 for epsi).
    pub fn state_block(&self, c: usize) -> usize {
        c * self.steps
    }

    pub fn x_start(&self) -> usize {
        self.state_block(0)
    }

    pub fn y_start(&self) -> usize {
        self.state_block(1)
    }

    pub fn psi_start(&self) -> usize {
        self.state_block(2)
    }

    pub fn v_start(&self) -> usize {
        self.state_block(3)
    }

    pub fn cte_start(&self) -> usize {
        self.state_block(4)
    }

    pub fn epsi_start(&self) -> usize {
        self.state_block(5)
    }

    pub fn delta_start(&self) -> usize {
        NUM_STATES * self.steps
    }

    pub fn a_start(&self) -> usize {
        self.delta_start() + self.intervals()
    }

    /// Read the state at step `t` from a decision vector.
    pub fn state_at<T: Copy>(&self, vars: &[T], t: usize) -> VehicleState<T> {
        let mut comps = [vars[t]; NUM_STATES];
        for (c, comp) in comps.iter_mut().enumerate() {
            *comp = vars[self.state_block(c) + t];
        }
        VehicleState::from_array(comps)
    }

    /// Read the actuation over interval `t` from a decision vector.
    pub fn actuation_at<T: Copy>(&self, vars: &[T], t: usize) -> Actuation<T> {
        Actuation {
            delta: vars[self.delta_start() + t],
            a: vars[self.a_start() + t],
        }
    }

    /// Write the state at step `t` into a decision vector.
    pub fn set_state<T: Copy>(&self, vars: &mut [T], t: usize, state: &VehicleState<T>) {
        for (c, comp) in state.to_array().iter().enumerate() {
            vars[self.state_block(c) + t] = *comp;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
