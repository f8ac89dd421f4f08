//! # Simulated vehicle
//!
//! A kinematic vehicle driving around a closed waypoint track. Each cycle the simulator provides
//! the telemetry the controller expects (pose, speed, the waypoints ahead and the actuation being
//! applied) and takes the demands back. Demands only act on the vehicle once the actuator latency
//! has elapsed, so the controller sees the same delay it would on the real vehicle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::path::Path;

use log::{debug, trace};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use comms_if::{dems::CtrlDems, tlm::Telemetry};
use util::maths::{norm, wrap_to_pi};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Minimum number of points in a track.
pub const MIN_TRACK_POINTS: usize = 3;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters of the simulation harness, loaded from `mpc_exec.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    /// Target period of one control cycle.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Number of cycles to run if not given on the command line.
    pub num_cycles: u64,

    /// Delay between a demand being sent and it acting on the vehicle.
    ///
    /// Units: seconds
    pub actuator_latency_s: f64,

    /// Step used to integrate the vehicle motion within a cycle.
    ///
    /// Units: seconds
    pub integration_step_s: f64,

    /// Front axle to centre of gravity distance of the simulated vehicle.
    ///
    /// Units: meters
    pub lf_m: f64,

    /// Steering angle reached at a full demand.
    ///
    /// Units: radians
    pub steer_limit_rad: f64,

    /// If true positive steering demands turn right.
    pub invert_steering: bool,

    /// Acceleration reached at a full throttle demand.
    ///
    /// Units: meters/second^2
    pub max_accel_mss: f64,

    /// Speed at the start of the run.
    ///
    /// Units: meters/second
    pub initial_speed_ms: f64,

    /// Number of waypoints given in the telemetry.
    pub num_tlm_waypoints: usize,

    pub track: TrackSource,
}

/// Where the track comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TrackSource {
    /// An elliptical loop centred on the origin.
    Ellipse {
        semi_major_m: f64,
        semi_minor_m: f64,
        num_points: usize,
    },

    /// A CSV file of `x,y` rows, relative to `$MPC_SW_ROOT/params`.
    Csv { path: String },
}

/// A closed loop of waypoints, in world frame, ordered in the driving direction.
#[derive(Debug, Clone)]
pub struct Track {
    points: Vec<Vector2<f64>>,
}

/// One row of a track file.
#[derive(Debug, Deserialize)]
struct TrackRecord {
    x: f64,
    y: f64,
}

/// Pose and speed of the simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehiclePose {
    pub x_m: f64,
    pub y_m: f64,

    /// Counter-clockwise from the world X axis.
    ///
    /// Units: radians
    pub psi_rad: f64,

    /// Units: meters/second
    pub speed_ms: f64,
}

/// Demand values as the actuators see them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct AppliedDems {
    steering_norm: f64,
    throttle: f64,
}

/// The simulated vehicle and its track.
pub struct Sim {
    params: SimParams,
    track: Track,
    pose: VehiclePose,

    /// Demands in effect.
    applied: AppliedDems,

    /// Demands sent but not yet in effect, with the simulation time they start acting.
    pending: VecDeque<(f64, AppliedDems)>,

    /// Index of the track point closest to the vehicle.
    nearest_idx: usize,

    /// Units: seconds
    time_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("The track must have at least {} points, found {0}", MIN_TRACK_POINTS)]
    TrackTooShort(usize),

    #[error("Cannot read the track file: {0}")]
    TrackFile(#[from] csv::Error),

    #[error("The software root environment variable (MPC_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Invalid simulation parameter {name}: {value}")]
    InvalidParam { name: &'static str, value: f64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl SimParams {
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = [
            ("cycle_period_s", self.cycle_period_s),
            ("integration_step_s", self.integration_step_s),
            ("lf_m", self.lf_m),
            ("steer_limit_rad", self.steer_limit_rad),
            ("max_accel_mss", self.max_accel_mss),
        ];

        for &(name, value) in positive.iter() {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SimError::InvalidParam { name, value });
            }
        }

        if !(self.actuator_latency_s >= 0.0 && self.actuator_latency_s.is_finite()) {
            return Err(SimError::InvalidParam {
                name: "actuator_latency_s",
                value: self.actuator_latency_s,
            });
        }

        if self.num_tlm_waypoints < 2 {
            return Err(SimError::InvalidParam {
                name: "num_tlm_waypoints",
                value: self.num_tlm_waypoints as f64,
            });
        }

        Ok(())
    }
}

impl Track {
    pub fn new(points: Vec<Vector2<f64>>) -> Result<Self, SimError> {
        if points.len() < MIN_TRACK_POINTS {
            return Err(SimError::TrackTooShort(points.len()));
        }

        Ok(Self { points })
    }

    /// Build the track described by `source`.
    pub fn from_source(source: &TrackSource) -> Result<Self, SimError> {
        match source {
            TrackSource::Ellipse {
                semi_major_m,
                semi_minor_m,
                num_points,
            } => Self::ellipse(*semi_major_m, *semi_minor_m, *num_points),
            TrackSource::Csv { path } => {
                let mut full_path =
                    util::host::get_mpc_sw_root().map_err(|_| SimError::SwRootNotSet)?;
                full_path.push("params");
                full_path.push(path);

                Self::load(full_path)
            }
        }
    }

    /// Counter-clockwise ellipse starting on the positive X axis.
    pub fn ellipse(
        semi_major_m: f64,
        semi_minor_m: f64,
        num_points: usize,
    ) -> Result<Self, SimError> {
        let step = 2.0 * std::f64::consts::PI / num_points as f64;

        Self::new(
            (0..num_points)
                .map(|i| {
                    let t = step * i as f64;
                    Vector2::new(semi_major_m * t.cos(), semi_minor_m * t.sin())
                })
                .collect(),
        )
    }

    /// Load a track from a CSV file with an `x,y` header.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let mut reader = csv::Reader::from_path(path)?;

        let mut points = Vec::new();
        for row in reader.deserialize() {
            let rec: TrackRecord = row?;
            points.push(Vector2::new(rec.x, rec.y));
        }

        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, idx: usize) -> Vector2<f64> {
        self.points[idx % self.points.len()]
    }

    /// Heading of the segment leaving point `idx`.
    pub fn heading_at(&self, idx: usize) -> f64 {
        let d = self.point(idx + 1) - self.point(idx);
        d.y.atan2(d.x)
    }

    /// Search forward from `start_idx` for the closest point to `pos`.
    ///
    /// The search stops as soon as the distance starts growing, so the vehicle can't jump to a
    /// different part of the track passing close by.
    pub fn nearest_from(&self, start_idx: usize, pos: &Vector2<f64>) -> usize {
        let dist = |i: usize| {
            let p = self.point(i);
            norm(&[p.x, p.y], &[pos.x, pos.y]).unwrap_or(std::f64::INFINITY)
        };

        let mut idx = start_idx % self.points.len();
        let mut best = dist(idx);

        for _ in 0..self.points.len() {
            let next = (idx + 1) % self.points.len();
            let d = dist(next);
            if d > best {
                break;
            }
            idx = next;
            best = d;
        }

        idx
    }

    /// Distance from `pos` to the track segments either side of point `idx`.
    pub fn distance_near(&self, idx: usize, pos: &Vector2<f64>) -> f64 {
        let prev = idx + self.points.len() - 1;

        segment_distance(&self.point(prev), &self.point(idx), pos)
            .min(segment_distance(&self.point(idx), &self.point(idx + 1), pos))
    }
}

impl Sim {
    /// Place the vehicle on the first track point, facing along the track.
    pub fn new(params: SimParams, track: Track) -> Result<Self, SimError> {
        params.validate()?;

        let start = track.point(0);
        let pose = VehiclePose {
            x_m: start.x,
            y_m: start.y,
            psi_rad: track.heading_at(0),
            speed_ms: params.initial_speed_ms,
        };

        debug!("Sim starting at {:?} on a track of {} points", pose, track.len());

        Ok(Self {
            params,
            track,
            pose,
            applied: AppliedDems::default(),
            pending: VecDeque::new(),
            nearest_idx: 0,
            time_s: 0.0,
        })
    }

    pub fn pose(&self) -> &VehiclePose {
        &self.pose
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Simulation time.
    ///
    /// Units: seconds
    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    /// Distance between the vehicle and the track.
    ///
    /// Units: meters
    pub fn track_error_m(&self) -> f64 {
        self.track
            .distance_near(self.nearest_idx, &Vector2::new(self.pose.x_m, self.pose.y_m))
    }

    /// Telemetry for the current state.
    ///
    /// The waypoints start at the closest track point behind the vehicle.
    pub fn telemetry(&self) -> Telemetry {
        let pos = Vector2::new(self.pose.x_m, self.pose.y_m);
        let ahead = self.track.point(self.nearest_idx + 1) - self.track.point(self.nearest_idx);
        let start_idx = if ahead.dot(&(pos - self.track.point(self.nearest_idx))) < 0.0 {
            self.nearest_idx + self.track.len() - 1
        } else {
            self.nearest_idx
        };

        let (ptsx_m, ptsy_m): (Vec<f64>, Vec<f64>) = (0..self.params.num_tlm_waypoints)
            .map(|i| self.track.point(start_idx + i))
            .map(|p| (p.x, p.y))
            .unzip();

        Telemetry {
            x_m: self.pose.x_m,
            y_m: self.pose.y_m,
            psi_rad: self.pose.psi_rad,
            speed_ms: self.pose.speed_ms,
            ptsx_m,
            ptsy_m,
            steering_norm: self.applied.steering_norm,
            throttle: self.applied.throttle,
        }
    }

    /// Send demands, they act once the actuator latency has passed.
    pub fn send(&mut self, dems: &CtrlDems) {
        let dems = AppliedDems {
            steering_norm: dems.steering_norm.max(-1.0).min(1.0),
            throttle: dems.throttle.max(-1.0).min(1.0),
        };

        self.pending
            .push_back((self.time_s + self.params.actuator_latency_s, dems));
    }

    /// Advance the simulation by one cycle period.
    pub fn advance(&mut self) {
        let end_s = self.time_s + self.params.cycle_period_s;

        while self.time_s < end_s {
            self.apply_due();

            let dt = self.params.integration_step_s.min(end_s - self.time_s);
            self.integrate(dt);
            self.time_s += dt;
        }

        self.apply_due();

        self.nearest_idx = self
            .track
            .nearest_from(self.nearest_idx, &Vector2::new(self.pose.x_m, self.pose.y_m));

        trace!(
            "Sim t = {:.3} s: {:?}, nearest track point {}",
            self.time_s,
            self.pose,
            self.nearest_idx
        );
    }

    /// Put demands whose latency has passed into effect.
    fn apply_due(&mut self) {
        while let Some(&(start_s, dems)) = self.pending.front() {
            if start_s > self.time_s {
                break;
            }
            self.applied = dems;
            self.pending.pop_front();
        }
    }

    fn integrate(&mut self, dt: f64) {
        let sign = if self.params.invert_steering { -1.0 } else { 1.0 };
        let delta = sign * self.applied.steering_norm * self.params.steer_limit_rad;
        let accel = self.applied.throttle * self.params.max_accel_mss;

        let p = &mut self.pose;
        p.x_m += p.speed_ms * p.psi_rad.cos() * dt;
        p.y_m += p.speed_ms * p.psi_rad.sin() * dt;
        p.psi_rad = wrap_to_pi(p.psi_rad + p.speed_ms / self.params.lf_m * delta * dt);
        p.speed_ms = (p.speed_ms + accel * dt).max(0.0);
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Distance from `p` to the segment between `a` and `b`.
fn segment_distance(a: &Vector2<f64>, b: &Vector2<f64>, p: &Vector2<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();

    if len_sq == 0.0 {
        return (p - a).norm();
    }

    let t = ((p - a).dot(&ab) / len_sq).max(0.0).min(1.0);
    (p - (a + ab * t)).norm()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
