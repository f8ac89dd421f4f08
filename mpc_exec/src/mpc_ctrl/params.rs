//! MPC control parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::nlp::SolverOptions;
use crate::poly::NUM_COEFFS;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for MPC control, loaded from `mpc_ctrl.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    // ---- PROFILE ----
    /// Named tuning profile giving the cost weights and the steering scaling.
    pub profile: Profile,

    /// Cost weights overriding the profile's.
    #[serde(default)]
    pub weights: Option<Weights>,

    /// Steering scaling overriding the profile's.
    #[serde(default)]
    pub steer_scaling: Option<SteerScaling>,

    // ---- HORIZON ----
    /// Number of model steps in the horizon (N).
    pub horizon_steps: usize,

    /// Duration of one model step.
    ///
    /// Units: seconds
    pub step_s: f64,

    /// Distance between the front axle and the centre of gravity.
    ///
    /// Units: meters
    pub lf_m: f64,

    /// Speed the controller aims for, in the same unit as the telemetry speed.
    pub ref_speed: f64,

    // ---- ACTUATORS ----
    /// Steering angle limit before scaling.
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Throttle limit, the throttle is bounded to `[-max_throttle, max_throttle]`.
    pub max_throttle: f64,

    /// If true positive steering demands turn right, as the simulator expects.
    #[serde(default = "default_invert_steering")]
    pub invert_steering: bool,

    // ---- LATENCY ----
    pub latency: LatencyParams,

    // ---- ROBUSTNESS ----
    /// Demands sent when a cycle fails.
    pub fallback: FallbackPolicy,

    /// Minimum number of waypoints needed in the telemetry.
    pub min_waypoints: usize,

    // ---- OUTPUT ----
    /// Spacing of the reference path points sent with the demands.
    ///
    /// Units: meters
    pub ref_path_inc_m: f64,

    /// Number of reference path points, including the unsent point at the vehicle.
    pub ref_path_num_points: usize,

    // ---- SOLVER ----
    #[serde(default)]
    pub solver: SolverOptions,
}

/// Weights of the cost terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub cte: f64,
    pub epsi: f64,

    /// Speed deviation from the reference speed.
    pub speed: f64,

    pub steer: f64,
    pub throttle: f64,

    /// Difference between consecutive steering actuations.
    pub steer_rate: f64,

    /// Difference between consecutive throttle actuations.
    pub throttle_rate: f64,
}

/// Latency handling parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyParams {
    pub mode: LatencyMode,

    /// Delay between sampling the telemetry and the demands taking effect.
    ///
    /// Units: seconds
    pub latency_s: f64,
}

/// The fixed values the horizon is built from, derived once from `Params`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonConfig {
    /// Number of model steps (N).
    pub steps: usize,

    /// Units: seconds
    pub dt_s: f64,

    /// Units: meters
    pub lf_m: f64,

    pub ref_speed: f64,

    /// Units: meters
    pub ref_cte_m: f64,

    /// Units: radians
    pub ref_epsi_rad: f64,

    pub weights: Weights,

    /// Bound on the steering variables, after scaling.
    pub steer_limit: f64,

    pub max_throttle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Named tuning profiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Unit weights, steering bounded by the steering angle limit.
    Quiz,

    /// Weights tuned for driving the track at speed, steering bounded by the limit scaled by
    /// `lf_m`.
    Walkthrough,
}

/// How the steering angle limit maps onto the steering variable bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteerScaling {
    /// The bound is `max_steer_rad`.
    Direct,

    /// The bound is `max_steer_rad * lf_m`.
    Wheelbase,
}

/// Latency handling modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyMode {
    /// Latency is ignored.
    Off,

    /// The initial state is predicted across the latency with the actuation currently applied.
    PredictState,

    /// The first actuation of the horizon is held at the previously sent actuation and the
    /// second one is sent.
    PinFirstActuation,
}

/// Demands sent when a cycle fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Repeat the previous cycle's steering and throttle.
    HoldPrevious,

    /// Centre the steering and release the throttle.
    SafeDefault,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

fn default_invert_steering() -> bool {
    true
}

impl Profile {
    pub fn weights(&self) -> Weights {
        match self {
            Profile::Quiz => Weights {
                cte: 1.0,
                epsi: 1.0,
                speed: 1.0,
                steer: 1.0,
                throttle: 1.0,
                steer_rate: 1.0,
                throttle_rate: 1.0,
            },
            Profile::Walkthrough => Weights {
                cte: 2000.0,
                epsi: 2000.0,
                speed: 0.5,
                steer: 50.0,
                throttle: 5.0,
                steer_rate: 6000.0,
                throttle_rate: 10.0,
            },
        }
    }

    pub fn steer_scaling(&self) -> SteerScaling {
        match self {
            Profile::Quiz => SteerScaling::Direct,
            Profile::Walkthrough => SteerScaling::Wheelbase,
        }
    }
}

impl Weights {
    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("cte", self.cte),
            ("epsi", self.epsi),
            ("speed", self.speed),
            ("steer", self.steer),
            ("throttle", self.throttle),
            ("steer_rate", self.steer_rate),
            ("throttle_rate", self.throttle_rate),
        ]
    }
}

impl Params {
    /// The cost weights in use, explicit weights taking precedence over the profile.
    pub fn weights(&self) -> Weights {
        self.weights.unwrap_or_else(|| self.profile.weights())
    }

    pub fn steer_scaling(&self) -> SteerScaling {
        self.steer_scaling
            .unwrap_or_else(|| self.profile.steer_scaling())
    }

    /// Bound on the steering variables.
    ///
    /// This is also the steering value which normalises to a full demand of 1, so the bound and
    /// the normalisation always agree.
    pub fn steer_limit(&self) -> f64 {
        match self.steer_scaling() {
            SteerScaling::Direct => self.max_steer_rad,
            SteerScaling::Wheelbase => self.max_steer_rad * self.lf_m,
        }
    }

    /// Smallest horizon the latency mode can work with.
    pub fn min_horizon_steps(&self) -> usize {
        match self.latency.mode {
            LatencyMode::PinFirstActuation => 3,
            _ => 2,
        }
    }

    /// Check the parameters, returning the first problem found.
    ///
    /// Weights which look mistuned only raise a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let min_steps = self.min_horizon_steps();
        if self.horizon_steps < min_steps {
            return Err(ConfigError::TooSmall {
                name: "horizon_steps",
                value: self.horizon_steps,
                min: min_steps,
            });
        }

        if self.min_waypoints < NUM_COEFFS {
            return Err(ConfigError::TooSmall {
                name: "min_waypoints",
                value: self.min_waypoints,
                min: NUM_COEFFS,
            });
        }

        if self.ref_path_num_points < 2 {
            return Err(ConfigError::TooSmall {
                name: "ref_path_num_points",
                value: self.ref_path_num_points,
                min: 2,
            });
        }

        let positives = [
            ("step_s", self.step_s),
            ("lf_m", self.lf_m),
            ("max_steer_rad", self.max_steer_rad),
            ("ref_path_inc_m", self.ref_path_inc_m),
        ];
        for &(name, value) in positives.iter() {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        if !self.ref_speed.is_finite() {
            return Err(ConfigError::NotPositive {
                name: "ref_speed",
                value: self.ref_speed,
            });
        }

        if !(self.max_throttle > 0.0 && self.max_throttle <= 1.0) {
            return Err(ConfigError::OutOfUnitRange {
                name: "max_throttle",
                value: self.max_throttle,
            });
        }

        if self.latency.mode == LatencyMode::PredictState
            && !(self.latency.latency_s.is_finite() && self.latency.latency_s >= 0.0)
        {
            return Err(ConfigError::NotPositive {
                name: "latency_s",
                value: self.latency.latency_s,
            });
        }

        let weights = self.weights();
        for &(name, value) in weights.named().iter() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }

        // Tracking errors should dominate, otherwise the controller trades them for speed
        if weights.cte < weights.speed || weights.epsi < weights.speed {
            warn!(
                "Tracking weights (cte {}, epsi {}) are below the speed weight ({}), the vehicle \
                 may leave the path to hold its speed",
                weights.cte, weights.epsi, weights.speed
            );
        }
        if weights.steer + weights.steer_rate == 0.0 {
            warn!("Steering is not penalised, expect oscillating steering demands");
        }
        if weights.steer_rate <= weights.throttle_rate {
            warn!(
                "Steering rate weight ({}) does not exceed the throttle rate weight ({}), expect \
                 abrupt steering changes between steps",
                weights.steer_rate, weights.throttle_rate
            );
        }

        self.solver.validate().map_err(ConfigError::Solver)
    }
}

impl HorizonConfig {
    /// Validate the parameters and build the horizon from them.
    pub fn from_params(params: &Params) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            steps: params.horizon_steps,
            dt_s: params.step_s,
            lf_m: params.lf_m,
            ref_speed: params.ref_speed,
            ref_cte_m: 0.0,
            ref_epsi_rad: 0.0,
            weights: params.weights(),
            steer_limit: params.steer_limit(),
            max_throttle: params.max_throttle,
        })
    }
}

/// Parameters shared by the module's tests.
#[cfg(test)]
pub(crate) const TEST_PARAMS_TOML: &str = r#"
    profile = "walkthrough"
    horizon_steps = 10
    step_s = 0.1
    lf_m = 2.67
    ref_speed = 50.0
    max_steer_rad = 0.436332
    max_throttle = 1.0
    fallback = "hold_previous"
    min_waypoints = 4
    ref_path_inc_m = 2.5
    ref_path_num_points = 25

    [latency]
    mode = "pin_first_actuation"
    latency_s = 0.1

    [solver]
    print_level = 0
    sparse = true
    max_solve_time_s = 0.5
    max_iters = 100
    tolerance = 1e-8
"#;

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> Params {
        util::params::load_str(TEST_PARAMS_TOML).unwrap()
    }

    #[test]
    fn test_load_and_profile() {
        let p = params();

        assert!(p.validate().is_ok());
        assert!(p.invert_steering);
        assert_eq!(p.weights(), Profile::Walkthrough.weights());
        assert_eq!(p.steer_scaling(), SteerScaling::Wheelbase);
        assert!((p.steer_limit() - 0.436332 * 2.67).abs() < 1e-12);

        let h = HorizonConfig::from_params(&p).unwrap();
        assert_eq!(h.steps, 10);
        assert_eq!(h.steer_limit, p.steer_limit());
        assert_eq!(h.ref_cte_m, 0.0);
    }

    #[test]
    fn test_overrides() {
        let mut p = params();
        p.profile = Profile::Quiz;
        assert_eq!(p.steer_limit(), 0.436332);

        p.steer_scaling = Some(SteerScaling::Wheelbase);
        assert!((p.steer_limit() - 0.436332 * 2.67).abs() < 1e-12);

        let w = Weights {
            cte: 3.0,
            ..Profile::Quiz.weights()
        };
        p.weights = Some(w);
        assert_eq!(p.weights().cte, 3.0);
    }

    #[test]
    fn test_validate() {
        let mut p = params();
        p.horizon_steps = 2;
        assert_eq!(
            p.validate(),
            Err(ConfigError::TooSmall {
                name: "horizon_steps",
                value: 2,
                min: 3
            })
        );
        p.latency.mode = LatencyMode::Off;
        assert!(p.validate().is_ok());
        p.horizon_steps = 1;
        assert!(p.validate().is_err());

        let mut p = params();
        p.step_s = 0.0;
        assert_eq!(
            p.validate(),
            Err(ConfigError::NotPositive {
                name: "step_s",
                value: 0.0
            })
        );

        let mut p = params();
        p.lf_m = f64::NAN;
        assert!(matches!(
            p.validate(),
            Err(ConfigError::NotPositive { name: "lf_m", .. })
        ));

        let mut p = params();
        p.weights = Some(Weights {
            steer_rate: -1.0,
            ..Profile::Walkthrough.weights()
        });
        assert_eq!(
            p.validate(),
            Err(ConfigError::InvalidWeight {
                name: "steer_rate",
                value: -1.0
            })
        );

        let mut p = params();
        p.max_throttle = 1.5;
        assert!(matches!(
            p.validate(),
            Err(ConfigError::OutOfUnitRange { .. })
        ));

        let mut p = params();
        p.min_waypoints = 3;
        assert!(matches!(p.validate(), Err(ConfigError::TooSmall { .. })));

        let mut p = params();
        p.solver.max_solve_time_s = 0.0;
        assert!(matches!(p.validate(), Err(ConfigError::Solver(_))));

        // Poorly ordered weights only warn
        let mut p = params();
        p.weights = Some(Weights {
            steer_rate: 1.0,
            throttle_rate: 10.0,
            ..Profile::Walkthrough.weights()
        });
        assert!(p.validate().is_ok());
    }
}
