//! # MPC Executable
//!
//! Runs the MPC path follower in closed loop against the simulated vehicle. Each cycle the
//! telemetry is taken from the simulator, the controller computes the demands and the simulator
//! drives on with them, honouring the actuator latency.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    thread,
    time::{Duration, Instant},
};

use color_eyre::{eyre::WrapErr, Result};
use log::{debug, info, warn};
use serde::Serialize;
use structopt::StructOpt;

use mpc_lib::{
    mpc_ctrl::MpcCtrl,
    sim::{Sim, SimParams, Track, VehiclePose},
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Controller parameter file, relative to the params directory.
const MPC_CTRL_PARAMS: &str = "mpc_ctrl.toml";

/// Harness parameter file, relative to the params directory.
const MPC_EXEC_PARAMS: &str = "mpc_exec.toml";

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mpc_exec",
    about = "Drive the simulated vehicle around its track with the MPC path follower"
)]
struct Opts {
    /// Number of cycles to run, overrides the harness parameters.
    #[structopt(short = "n", long = "cycles")]
    num_cycles: Option<u64>,

    /// Sleep for the actuator latency after each solve.
    #[structopt(long)]
    sleep_latency: bool,

    /// Run cycles back to back rather than at the cycle period.
    #[structopt(long)]
    fast: bool,

    /// Log debug messages, including the solver's.
    #[structopt(short, long)]
    verbose: bool,
}

/// Summary of a run, saved into the session directory.
#[derive(Debug, Default, Serialize)]
struct RunSummary {
    num_cycles: u64,
    num_fallbacks: u64,

    mean_solve_time_s: f64,
    max_solve_time_s: f64,

    mean_track_error_m: f64,
    max_track_error_m: f64,

    /// Sim time at the end of the run.
    sim_time_s: f64,

    final_pose: Option<VehiclePose>,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mpc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    let (min_level, solver_level) = match opts.verbose {
        true => (LevelFilter::Debug, LevelFilter::Debug),
        false => (LevelFilter::Info, LevelFilter::Warn),
    };
    logger_init(min_level, solver_level, &session).wrap_err("Failed to initialise logging")?;

    info!("MPC Path Follower\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opts);

    // ---- LOAD PARAMETERS ----

    let sim_params: SimParams = util::params::load(MPC_EXEC_PARAMS)
        .wrap_err("Could not load the simulation harness params")?;

    let num_cycles = opts.num_cycles.unwrap_or(sim_params.num_cycles);
    let cycle_period = Duration::from_secs_f64(sim_params.cycle_period_s);
    let latency = Duration::from_secs_f64(sim_params.actuator_latency_s);

    // ---- MODULE INIT ----

    let mut mpc_ctrl =
        MpcCtrl::init(MPC_CTRL_PARAMS, &session).wrap_err("Failed to initialise MpcCtrl")?;
    info!("MpcCtrl init complete");

    check_consistency(&mpc_ctrl, &sim_params);
    session.save("mpc_ctrl_params.json", mpc_ctrl.params().clone());

    let track = Track::from_source(&sim_params.track).wrap_err("Failed to build the track")?;
    let mut sim = Sim::new(sim_params, track).wrap_err("Failed to initialise the simulation")?;
    info!("Sim init complete, track of {} points", sim.track().len());

    // ---- MAIN LOOP ----

    info!("Begining main loop, {} cycles\n", num_cycles);

    let mut summary = RunSummary::default();

    for cycle in 0..num_cycles {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- CONTROL ----

        let tlm = sim.telemetry();

        let (dems, report) = match mpc_ctrl.proc(&tlm) {
            Ok(o) => o,
            Err(e) => match e {},
        };

        if opts.sleep_latency {
            thread::sleep(latency);
        }

        // ---- SIMULATION ----

        sim.send(&dems);
        sim.advance();

        let track_error_m = sim.track_error_m();

        debug!(
            "Cycle {}: steering {:.4}, throttle {:.4}, track error {:.3} m, speed {:.2} m/s",
            cycle,
            dems.steering_norm,
            dems.throttle,
            track_error_m,
            sim.pose().speed_ms
        );

        // ---- STATISTICS ----

        summary.num_cycles += 1;
        if report.fallback_cause.is_some() {
            summary.num_fallbacks += 1;
        }
        summary.mean_solve_time_s += report.solve_time_s;
        summary.max_solve_time_s = summary.max_solve_time_s.max(report.solve_time_s);
        summary.mean_track_error_m += track_error_m;
        summary.max_track_error_m = summary.max_track_error_m.max(track_error_m);

        // ---- CYCLE MANAGEMENT ----

        if opts.fast {
            continue;
        }

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
        }
    }

    // ---- SUMMARY ----

    if summary.num_cycles > 0 {
        summary.mean_solve_time_s /= summary.num_cycles as f64;
        summary.mean_track_error_m /= summary.num_cycles as f64;
    }
    summary.sim_time_s = sim.time_s();
    summary.final_pose = Some(*sim.pose());

    info!(
        "Run complete: {} cycles, {} fallbacks, mean track error {:.3} m (max {:.3} m), mean solve \
        time {:.4} s (max {:.4} s)",
        summary.num_cycles,
        summary.num_fallbacks,
        summary.mean_track_error_m,
        summary.max_track_error_m,
        summary.mean_solve_time_s,
        summary.max_solve_time_s
    );

    session.save("summary.json", summary);
    session.exit();

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Warn if the simulated vehicle doesn't match the controller's model of it.
fn check_consistency(mpc_ctrl: &MpcCtrl, sim_params: &SimParams) {
    let params = mpc_ctrl.params();

    if (params.lf_m - sim_params.lf_m).abs() > 1e-9 {
        warn!(
            "Controller Lf ({} m) differs from the simulated vehicle's ({} m)",
            params.lf_m, sim_params.lf_m
        );
    }

    if (params.steer_limit() - sim_params.steer_limit_rad).abs() > 1e-9 {
        warn!(
            "Controller steering limit ({} rad) differs from the simulated vehicle's ({} rad)",
            params.steer_limit(),
            sim_params.steer_limit_rad
        );
    }

    if params.invert_steering != sim_params.invert_steering {
        warn!("Controller and simulated vehicle disagree on the steering sign");
    }

    if (params.latency.latency_s - sim_params.actuator_latency_s).abs() > 1e-9 {
        warn!(
            "Controller latency ({} s) differs from the simulated actuator latency ({} s)",
            params.latency.latency_s, sim_params.actuator_latency_s
        );
    }
}
