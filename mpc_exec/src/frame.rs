//! # Frame conversions
//!
//! Waypoints arrive in the world frame. The controller works in the vehicle frame, whose origin
//! is the vehicle's position with X along its heading, so the vehicle itself always sits at
//! `(0, 0)` with zero heading.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Rotation2, Vector2};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Transforms points from the world frame into the frame of a vehicle at a given pose.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateTransformer {
    /// Vehicle position in the world frame.
    ///
    /// Units: meters
    position_m: Vector2<f64>,

    /// Rotation taking world axes onto vehicle axes (by minus the heading).
    world_to_vehicle: Rotation2<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl CoordinateTransformer {
    /// Create a transformer for a vehicle at world position `(x_m, y_m)` with heading `psi_rad`.
    pub fn new(x_m: f64, y_m: f64, psi_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            world_to_vehicle: Rotation2::new(-psi_rad),
        }
    }

    /// Transform a single world frame point into the vehicle frame.
    pub fn to_vehicle(&self, point_m: &Vector2<f64>) -> Vector2<f64> {
        self.world_to_vehicle * (point_m - self.position_m)
    }

    /// Transform a sequence of world frame points, preserving order and length.
    pub fn transform(&self, points_m: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        points_m.iter().map(|p| self.to_vehicle(p)).collect()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
