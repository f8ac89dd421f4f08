//! MPC control module state

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::convert::Infallible;

use log::{debug, info, warn};
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::{
    ConfigError, FallbackPolicy, HorizonConfig, LatencyMode, MpcError, Params, TrajectoryOptimizer,
};
use crate::frame::CoordinateTransformer;
use crate::latency::LatencyCompensator;
use crate::model::{Actuation, BicycleModel, VehicleState};
use crate::nlp::SolveStatus;
use crate::poly::RefPoly;
use comms_if::{dems::CtrlDems, tlm::Telemetry};
use util::{
    archive::{ArchiveError, Archiver},
    module::State,
    params,
    session::{self, Session},
};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// MPC control module state
pub struct MpcCtrl {
    params: Params,

    optimizer: TrajectoryOptimizer,

    /// Present if the initial state is predicted across the latency.
    compensator: Option<LatencyCompensator>,

    /// The demands sent on the previous cycle.
    last_dems: CtrlDems,

    /// Number of cycles processed.
    num_cycles: u64,

    arch_cycle: Option<Archiver>,
}

/// The status report of one cycle.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// Status of the solve, `None` if the cycle failed before solving.
    pub solve_status: Option<SolveStatus>,

    pub objective: Option<f64>,

    pub iterations: usize,

    /// Units: seconds
    pub solve_time_s: f64,

    /// Cross track error of the state the program was solved from.
    ///
    /// Units: meters
    pub cte_m: f64,

    /// Heading error of the state the program was solved from.
    ///
    /// Units: radians
    pub epsi_rad: f64,

    /// Why the fallback demands were sent, `None` if the solution was used.
    pub fallback_cause: Option<MpcError>,
}

/// Flat per-cycle archive record.
#[derive(Serialize)]
struct CycleRecord {
    time_s: f64,
    cycle: u64,
    solve_status: String,
    objective: Option<f64>,
    iterations: usize,
    solve_time_s: f64,
    cte_m: f64,
    epsi_rad: f64,
    steering_norm: f64,
    throttle: f64,
    fallback_cause: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur during initialisation of the module.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Cannot load the parameters: {0}")]
    ParamLoadError(#[from] params::LoadError),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Cannot create the cycle archive: {0}")]
    ArchiveError(#[from] ArchiveError),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl State for MpcCtrl {
    type InitData = &'static str;
    type InitError = InitError;

    type InputData = Telemetry;
    type OutputData = CtrlDems;
    type StatusReport = StatusReport;
    type ProcError = Infallible;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(init_data: Self::InitData, session: &Session) -> Result<Self, Self::InitError> {
        let params: Params = params::load(init_data)?;

        let mut mpc_ctrl = Self::new(params)?;
        mpc_ctrl.arch_cycle = Some(Archiver::from_path(session, "mpc_ctrl/cycle.csv")?);

        Ok(mpc_ctrl)
    }

    /// Perform one control cycle.
    ///
    /// This never fails: if the telemetry can't be used or the solve doesn't converge the
    /// fallback demands are returned and the cause is given in the status report.
    fn proc(
        &mut self,
        tlm: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let mut report = StatusReport::default();

        let dems = match self.control(tlm, &mut report) {
            Ok(dems) => dems,
            Err(e) => {
                if let MpcError::NotConverged {
                    status,
                    iterations,
                    solve_time_s,
                } = &e
                {
                    report.solve_status = Some(*status);
                    report.iterations = *iterations;
                    report.solve_time_s = *solve_time_s;
                }
                warn!(
                    "MPC cycle {} failed, sending {:?} demands: {}",
                    self.num_cycles, self.params.fallback, e
                );
                report.fallback_cause = Some(e);
                self.fallback_dems()
            }
        };

        // Whatever was sent is what acts over the next latency window
        self.optimizer.set_applied(self.dems_actuation(&dems));
        self.last_dems = dems.clone();

        self.archive(&dems, &report);
        self.num_cycles += 1;

        Ok((dems, report))
    }
}

impl MpcCtrl {
    /// Create the module from already loaded parameters, without archiving.
    pub fn new(params: Params) -> Result<Self, ConfigError> {
        let horizon = HorizonConfig::from_params(&params)?;

        let optimizer = TrajectoryOptimizer::with_sqp(
            horizon,
            params.solver.clone(),
            params.latency.mode == LatencyMode::PinFirstActuation,
        )?;

        let compensator = match params.latency.mode {
            LatencyMode::PredictState => Some(LatencyCompensator::new(
                BicycleModel::new(params.lf_m),
                params.latency.latency_s,
            )),
            _ => None,
        };

        info!(
            "MpcCtrl initialised: {:?} profile, N = {}, dt = {} s, latency mode {:?}",
            params.profile, horizon.steps, horizon.dt_s, params.latency.mode
        );

        Ok(Self {
            params,
            optimizer,
            compensator,
            last_dems: CtrlDems::safe_default(),
            num_cycles: 0,
            arch_cycle: None,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Steering demand multiplier between the model's convention (positive left) and the sent
    /// demand.
    fn steer_sign(&self) -> f64 {
        if self.params.invert_steering {
            -1.0
        } else {
            1.0
        }
    }

    /// Normalise a model steering angle into a demand in [-1, 1].
    pub fn normalise_steering(&self, delta: f64) -> f64 {
        (self.steer_sign() * delta / self.params.steer_limit())
            .max(-1.0)
            .min(1.0)
    }

    /// The model actuation corresponding to demands.
    fn dems_actuation(&self, dems: &CtrlDems) -> Actuation {
        Actuation {
            delta: self.steer_sign() * dems.steering_norm * self.params.steer_limit(),
            a: dems.throttle,
        }
    }

    fn fallback_dems(&self) -> CtrlDems {
        match self.params.fallback {
            FallbackPolicy::HoldPrevious => CtrlDems {
                steering_norm: self.last_dems.steering_norm,
                throttle: self.last_dems.throttle,
                mpc_path_m: Vec::new(),
                ref_path_m: Vec::new(),
            },
            FallbackPolicy::SafeDefault => CtrlDems::safe_default(),
        }
    }

    /// The cycle proper, any error leads to the fallback.
    fn control(
        &mut self,
        tlm: &Telemetry,
        report: &mut StatusReport,
    ) -> Result<CtrlDems, MpcError> {
        tlm.validate(self.params.min_waypoints)?;

        // Move the waypoints into the vehicle frame and fit the reference
        let tf = CoordinateTransformer::new(tlm.x_m, tlm.y_m, tlm.psi_rad);
        let world: Vec<Vector2<f64>> = tlm.waypoints().map(|(x, y)| Vector2::new(x, y)).collect();
        let poly = RefPoly::fit(&tf.transform(&world))?;

        debug!("Reference polynomial: {:?}", poly.coeffs());

        // In the vehicle frame the vehicle is at the origin facing along X
        let mut state = VehicleState {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: tlm.speed_ms,
            cte: poly.eval(0.0),
            epsi: -poly.tangent_heading(0.0),
        };

        if let Some(comp) = self.compensator.as_ref() {
            let applied = Actuation {
                delta: self.steer_sign() * tlm.steering_norm * self.params.steer_limit(),
                a: tlm.throttle,
            };
            state = comp.predict(&state, &applied, &poly);
        }

        report.cte_m = state.cte;
        report.epsi_rad = state.epsi;

        let traj = self.optimizer.solve(&state, &poly)?;

        report.solve_status = Some(traj.status);
        report.objective = Some(traj.objective);
        report.iterations = traj.iterations;
        report.solve_time_s = traj.solve_time_s;

        let dems = CtrlDems {
            steering_norm: self.normalise_steering(traj.actuation.delta),
            throttle: traj
                .actuation
                .a
                .max(-self.params.max_throttle)
                .min(self.params.max_throttle),
            mpc_path_m: traj.path_m.iter().map(|p| [p.x, p.y]).collect(),
            ref_path_m: poly
                .sample(self.params.ref_path_inc_m, self.params.ref_path_num_points)
                .iter()
                .map(|p| [p.x, p.y])
                .collect(),
        };

        if !dems.is_finite() {
            return Err(MpcError::NonFiniteSolution);
        }

        debug!(
            "MPC demands: steering {:.4}, throttle {:.4}, objective {:.4}",
            dems.steering_norm, dems.throttle, traj.objective
        );

        Ok(dems)
    }

    fn archive(&mut self, dems: &CtrlDems, report: &StatusReport) {
        let arch = match self.arch_cycle.as_mut() {
            Some(a) => a,
            None => return,
        };

        let record = CycleRecord {
            time_s: session::get_elapsed_seconds(),
            cycle: self.num_cycles,
            solve_status: report
                .solve_status
                .map(|s| format!("{:?}", s))
                .unwrap_or_default(),
            objective: report.objective,
            iterations: report.iterations,
            solve_time_s: report.solve_time_s,
            cte_m: report.cte_m,
            epsi_rad: report.epsi_rad,
            steering_norm: dems.steering_norm,
            throttle: dems.throttle,
            fallback_cause: report
                .fallback_cause
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        };

        if let Err(e) = arch.serialise(&record) {
            warn!("Could not archive MpcCtrl cycle: {}", e);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
